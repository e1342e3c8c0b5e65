//! Per-kind adapters
//!
//! A [`ResourceKind`] tells the generic client everything it needs to know
//! about one kind of object: where it lives in the API, how to recognize
//! objects that really belong to it, and how to preprocess objects before
//! they are written.

use kube::core::{ApiResource, GroupVersionKind};

use crate::error::Result;
use crate::functional::{Mutator, MutatorList, Object, Predicate};

/// API coordinates and user-facing name of a kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    /// API group (empty for the core group)
    pub group: String,

    /// API version within the group
    pub version: String,

    /// Kind name, also used as the user-facing name
    pub kind: String,

    /// Plural resource name used in URLs
    pub plural: String,

    /// Whether objects of this kind live in a namespace
    pub namespaced: bool,
}

impl ResourceInfo {
    /// Describe a namespaced kind
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        plural: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            plural: plural.into(),
            namespaced: true,
        }
    }

    /// Describe a statically typed kind (e.g. a k8s-openapi type)
    pub fn of<R: kube::Resource<DynamicType = ()>>(namespaced: bool) -> Self {
        Self {
            group: R::group(&()).into_owned(),
            version: R::version(&()).into_owned(),
            kind: R::kind(&()).into_owned(),
            plural: R::plural(&()).into_owned(),
            namespaced,
        }
    }

    /// Mark the kind as cluster-scoped
    pub fn cluster_scoped(mut self) -> Self {
        self.namespaced = false;
        self
    }

    /// User-facing name of the kind
    pub fn friendly_name(&self) -> &str {
        &self.kind
    }

    /// `group/version`, or just `version` for the core group
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn group_version_kind(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }

    /// kube API resource used for dynamic requests
    pub fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }
}

/// Capabilities a kind adapter supplies to the generic client
pub trait ResourceKind: Send + Sync + 'static {
    /// Object type stored for this kind
    type Object: Object;

    /// API coordinates of the kind
    fn info(&self) -> &ResourceInfo;

    /// Whether an object fetched from the store belongs to this kind.
    ///
    /// Used to tell apart objects that share a shape but serve another purpose.
    fn is_member(&self, _obj: &Self::Object) -> bool {
        true
    }

    /// Edit and validate an object before it is created or updated
    fn preprocess(&self, _obj: &mut Self::Object) -> Result<()> {
        Ok(())
    }
}

/// Generic adapter built from a membership predicate and preprocessing mutators
pub struct Kind<R> {
    info: ResourceInfo,
    membership: Option<Predicate<R>>,
    mutators: MutatorList<R>,
}

impl<R> Clone for Kind<R> {
    fn clone(&self) -> Self {
        Self {
            info: self.info.clone(),
            membership: self.membership.clone(),
            mutators: self.mutators.clone(),
        }
    }
}

impl<R> std::fmt::Debug for Kind<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kind")
            .field("info", &self.info)
            .field("membership", &self.membership.is_some())
            .field("mutators", &self.mutators)
            .finish()
    }
}

impl<R: Object> Kind<R> {
    /// Adapter with no membership check and no preprocessing
    pub fn new(info: ResourceInfo) -> Self {
        Self {
            info,
            membership: None,
            mutators: MutatorList::new(),
        }
    }

    /// Require objects to pass `predicate` to be treated as members
    pub fn with_membership(mut self, predicate: Predicate<R>) -> Self {
        self.membership = Some(match self.membership.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Run `mutator` on every object before create/update
    pub fn with_mutator(mut self, mutator: Mutator<R>) -> Self {
        self.mutators.push(mutator);
        self
    }
}

impl<R: Object> ResourceKind for Kind<R> {
    type Object = R;

    fn info(&self) -> &ResourceInfo {
        &self.info
    }

    fn is_member(&self, obj: &R) -> bool {
        self.membership.as_ref().is_none_or(|p| p.test(obj))
    }

    fn preprocess(&self, obj: &mut R) -> Result<()> {
        self.mutators.apply(obj)
    }
}

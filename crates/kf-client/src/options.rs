//! Options for list and delete operations

use std::collections::BTreeMap;

use kube::api::{DeleteParams, ListParams, PropagationPolicy};

use crate::functional::Predicate;

/// Options for listing objects
///
/// Label and field selectors are sent to the store; filters run client-side
/// afterwards, because some kinds ignore parts of the server-side selectors.
pub struct ListOptions<R> {
    /// Labels that must match exactly
    pub label_selector: BTreeMap<String, String>,

    /// Fields that must match exactly (e.g. `metadata.name`)
    pub field_selector: BTreeMap<String, String>,

    /// Extra client-side predicates, all of which must pass
    pub filters: Vec<Predicate<R>>,
}

impl<R> Default for ListOptions<R> {
    fn default() -> Self {
        Self {
            label_selector: BTreeMap::new(),
            field_selector: BTreeMap::new(),
            filters: Vec::new(),
        }
    }
}

impl<R> Clone for ListOptions<R> {
    fn clone(&self) -> Self {
        Self {
            label_selector: self.label_selector.clone(),
            field_selector: self.field_selector.clone(),
            filters: self.filters.clone(),
        }
    }
}

impl<R> std::fmt::Debug for ListOptions<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListOptions")
            .field("label_selector", &self.label_selector)
            .field("field_selector", &self.field_selector)
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl<R: 'static> ListOptions<R> {
    /// List everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a label to equal `value`
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.label_selector.insert(key.into(), value.into());
        self
    }

    /// Require a field to equal `value`
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.field_selector.insert(key.into(), value.into());
        self
    }

    /// Only match the object with this exact name
    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.with_field("metadata.name", name)
    }

    /// Add a client-side filter
    pub fn with_filter(mut self, filter: Predicate<R>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Combined client-side filter
    pub fn filter(&self) -> Predicate<R> {
        Predicate::all(self.filters.clone())
    }

    /// Translate the selectors into kube list parameters
    pub fn to_list_params(&self) -> ListParams {
        ListParams {
            label_selector: format_selector(&self.label_selector),
            field_selector: format_selector(&self.field_selector),
            ..Default::default()
        }
    }
}

/// Format an equality selector, `None` when empty
fn format_selector(selector: &BTreeMap<String, String>) -> Option<String> {
    if selector.is_empty() {
        return None;
    }

    Some(
        selector
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Options for deleting an object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Delete dependents before the owner
    pub foreground: bool,

    /// Skip the grace period
    pub delete_immediately: bool,
}

impl DeleteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use foreground propagation
    pub fn foreground(mut self) -> Self {
        self.foreground = true;
        self
    }

    /// Delete with a zero grace period
    pub fn immediately(mut self) -> Self {
        self.delete_immediately = true;
        self
    }

    /// Translate into kube delete parameters
    pub fn to_delete_params(&self) -> DeleteParams {
        DeleteParams {
            propagation_policy: self.foreground.then_some(PropagationPolicy::Foreground),
            grace_period_seconds: self.delete_immediately.then_some(0),
            ..Default::default()
        }
    }
}

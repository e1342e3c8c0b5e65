//! Ready-made adapters for the kinds Kf manipulates
//!
//! Kf's own kinds have schemas this crate does not model, so they are handled
//! as [`DynamicObject`]s. Built-in kinds use their k8s-openapi types.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::api::DynamicObject;

use crate::functional::{Predicate, label_equals_predicate, label_set_mutator};
use crate::kind::{Kind, ResourceInfo};

/// API group of Kf's custom resources
pub const KF_GROUP: &str = "kf.dev";

/// API version of Kf's custom resources
pub const KF_VERSION: &str = "v1alpha1";

/// Label identifying objects managed by Kf
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`] on Kf-managed objects
pub const MANAGED_BY_KF: &str = "kf";

/// Accept dynamic objects whose declared kind matches (or is not set)
fn kind_matches(kind: &'static str) -> Predicate<DynamicObject> {
    Predicate::new(move |obj: &DynamicObject| {
        obj.types.as_ref().is_none_or(|types| types.kind == kind)
    })
}

fn kf_kind(kind: &'static str, plural: &str) -> Kind<DynamicObject> {
    Kind::new(ResourceInfo::new(KF_GROUP, KF_VERSION, kind, plural))
        .with_membership(kind_matches(kind))
}

/// Applications
pub fn apps() -> Kind<DynamicObject> {
    kf_kind("App", "apps")
}

/// Spaces (cluster-scoped)
pub fn spaces() -> Kind<DynamicObject> {
    let info = kind_info_cluster_scoped(KF_GROUP, KF_VERSION, "Space", "spaces");
    Kind::new(info).with_membership(kind_matches("Space"))
}

/// Builds
pub fn builds() -> Kind<DynamicObject> {
    kf_kind("Build", "builds")
}

/// Sources
pub fn sources() -> Kind<DynamicObject> {
    kf_kind("Source", "sources")
}

/// Routes
pub fn routes() -> Kind<DynamicObject> {
    kf_kind("Route", "routes")
}

/// Route claims
pub fn route_claims() -> Kind<DynamicObject> {
    kf_kind("RouteClaim", "routeclaims")
}

/// Service catalog service instances
pub fn service_instances() -> Kind<DynamicObject> {
    Kind::new(ResourceInfo::new(
        "servicecatalog.k8s.io",
        "v1beta1",
        "ServiceInstance",
        "serviceinstances",
    ))
    .with_membership(kind_matches("ServiceInstance"))
}

/// Service catalog cluster-wide brokers
pub fn cluster_service_brokers() -> Kind<DynamicObject> {
    let info = kind_info_cluster_scoped(
        "servicecatalog.k8s.io",
        "v1beta1",
        "ClusterServiceBroker",
        "clusterservicebrokers",
    );
    Kind::new(info).with_membership(kind_matches("ClusterServiceBroker"))
}

/// Every Secret in a namespace
pub fn secrets() -> Kind<Secret> {
    Kind::new(ResourceInfo::of::<Secret>(true))
}

/// Secrets created and owned by Kf.
///
/// Writes stamp the managed-by label; reads reject secrets without it.
pub fn managed_secrets() -> Kind<Secret> {
    secrets()
        .with_membership(label_equals_predicate(MANAGED_BY_LABEL, MANAGED_BY_KF))
        .with_mutator(label_set_mutator(BTreeMap::from([(
            MANAGED_BY_LABEL.to_string(),
            MANAGED_BY_KF.to_string(),
        )])))
}

fn kind_info_cluster_scoped(group: &str, version: &str, kind: &str, plural: &str) -> ResourceInfo {
    ResourceInfo::new(group, version, kind, plural).cluster_scoped()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ResourceKind;
    use kube::ResourceExt;
    use kube::core::TypeMeta;

    fn dynamic(kind: Option<&str>, name: &str) -> DynamicObject {
        let mut obj = DynamicObject::new(name, &apps().info().api_resource());
        obj.types = kind.map(|kind| TypeMeta {
            api_version: "kf.dev/v1alpha1".to_string(),
            kind: kind.to_string(),
        });
        obj
    }

    #[test]
    fn test_kf_kinds_are_namespaced_except_spaces() {
        assert!(apps().info().namespaced);
        assert!(builds().info().namespaced);
        assert!(route_claims().info().namespaced);
        assert!(!spaces().info().namespaced);
        assert!(!cluster_service_brokers().info().namespaced);
    }

    #[test]
    fn test_dynamic_membership_checks_kind() {
        let apps = apps();
        assert!(apps.is_member(&dynamic(Some("App"), "web")));
        assert!(apps.is_member(&dynamic(None, "web")));
        assert!(!apps.is_member(&dynamic(Some("Build"), "web")));
    }

    #[test]
    fn test_managed_secrets() {
        let kind = managed_secrets();
        let mut secret = Secret::default();
        assert!(!kind.is_member(&secret));

        kind.preprocess(&mut secret).unwrap();
        assert_eq!(
            secret.labels().get(MANAGED_BY_LABEL).map(String::as_str),
            Some(MANAGED_BY_KF)
        );
        assert!(kind.is_member(&secret));
        assert!(secrets().is_member(&Secret::default()));
    }

    #[test]
    fn test_service_instance_coordinates() {
        let info = service_instances().info().clone();
        assert_eq!(info.api_version(), "servicecatalog.k8s.io/v1beta1");
        assert_eq!(info.plural, "serviceinstances");
    }
}

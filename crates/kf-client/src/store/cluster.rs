//! Store backed by a Kubernetes API server
//!
//! Requests go through `Api<DynamicObject>` so one implementation serves
//! typed k8s-openapi objects and schemaless custom resources alike. Objects
//! are converted through JSON on the way in and out.

use std::marker::PhantomData;

use async_trait::async_trait;
use kube::{
    Client, ResourceExt,
    api::{Api, DeleteParams, DynamicObject, ListParams, PostParams},
    core::{ApiResource, TypeMeta},
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::Store;
use crate::error::Result;
use crate::functional::Object;
use crate::kind::{ResourceInfo, ResourceKind};

/// Store that reads and writes objects of one kind on a cluster
pub struct KubeStore<R> {
    /// Kubernetes client
    client: Client,
    /// API coordinates of the kind
    resource: ApiResource,
    /// Namespaced vs cluster-scoped
    namespaced: bool,
    _object: PhantomData<fn() -> R>,
}

impl<R> Clone for KubeStore<R> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            resource: self.resource.clone(),
            namespaced: self.namespaced,
            _object: PhantomData,
        }
    }
}

impl<R: Object> KubeStore<R> {
    /// Create a store for the kind described by `info`
    pub fn new(client: Client, info: &ResourceInfo) -> Self {
        Self {
            client,
            resource: info.api_resource(),
            namespaced: info.namespaced,
            _object: PhantomData,
        }
    }

    /// Create a store for the kind handled by an adapter
    pub fn for_kind<K: ResourceKind<Object = R>>(client: Client, kind: &K) -> Self {
        Self::new(client, kind.info())
    }

    /// Get the underlying Kubernetes client
    pub fn kube_client(&self) -> &Client {
        &self.client
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        match request_namespace(self.namespaced, namespace) {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &self.resource),
            None => Api::all_with(self.client.clone(), &self.resource),
        }
    }
}

/// Namespace to address, if any; an empty namespace spans all of them
fn request_namespace(namespaced: bool, namespace: &str) -> Option<&str> {
    (namespaced && !namespace.is_empty()).then_some(namespace)
}

#[async_trait]
impl<R: Object> Store<R> for KubeStore<R> {
    async fn get(&self, namespace: &str, name: &str) -> Result<R> {
        let obj = self.api(namespace).get(name).await?;
        from_dynamic(obj)
    }

    async fn create(&self, namespace: &str, obj: &R) -> Result<R> {
        let dynamic = to_dynamic(obj, &self.resource)?;
        let created = self
            .api(namespace)
            .create(&PostParams::default(), &dynamic)
            .await?;
        from_dynamic(created)
    }

    async fn update(&self, namespace: &str, obj: &R) -> Result<R> {
        let dynamic = to_dynamic(obj, &self.resource)?;
        let name = dynamic.name_any();
        let updated = self
            .api(namespace)
            .replace(&name, &PostParams::default(), &dynamic)
            .await?;
        from_dynamic(updated)
    }

    async fn delete(&self, namespace: &str, name: &str, params: &DeleteParams) -> Result<()> {
        self.api(namespace).delete(name, params).await?;
        Ok(())
    }

    async fn list(&self, namespace: &str, params: &ListParams) -> Result<Vec<R>> {
        let list = self.api(namespace).list(params).await?;
        list.items.into_iter().map(from_dynamic).collect()
    }
}

/// Convert a typed object into a dynamic one, filling in type information
fn to_dynamic<R: Serialize>(obj: &R, resource: &ApiResource) -> Result<DynamicObject> {
    let mut dynamic: DynamicObject = serde_json::from_value(serde_json::to_value(obj)?)?;
    dynamic.types.get_or_insert_with(|| TypeMeta {
        api_version: resource.api_version.clone(),
        kind: resource.kind.clone(),
    });
    Ok(dynamic)
}

/// Convert a dynamic object back into the caller's type
fn from_dynamic<R: DeserializeOwned>(obj: DynamicObject) -> Result<R> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

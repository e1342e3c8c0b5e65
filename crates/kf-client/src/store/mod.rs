//! Stores hold the objects a client manipulates
//!
//! Two implementations ship with the crate:
//! - **KubeStore**: talks to a Kubernetes API server through dynamic requests
//! - **MockStore**: in-memory store with version tokens, for tests
//!
//! Every store hands out an opaque version token (`metadata.resourceVersion`)
//! with each object and rejects updates carrying a stale token.

mod cluster;
mod mock;

pub use cluster::KubeStore;
pub use mock::{MockStore, Operation, OperationCounts, UpdateHook};

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{DeleteParams, ListParams};

use crate::error::Result;
use crate::functional::Object;

/// Keyed object store for a single kind
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait Store<R: Object>: Send + Sync {
    /// Fetch an object; fails with a not-found error if absent
    async fn get(&self, namespace: &str, name: &str) -> Result<R>;

    /// Create an object; fails with an already-exists error if the name is taken
    async fn create(&self, namespace: &str, obj: &R) -> Result<R>;

    /// Replace an object; fails with a conflict error if its version token is stale
    async fn update(&self, namespace: &str, obj: &R) -> Result<R>;

    /// Delete an object
    async fn delete(&self, namespace: &str, name: &str, params: &DeleteParams) -> Result<()>;

    /// List objects matching the server-side selectors
    async fn list(&self, namespace: &str, params: &ListParams) -> Result<Vec<R>>;
}

#[async_trait]
impl<R: Object, S: Store<R> + ?Sized> Store<R> for Arc<S> {
    async fn get(&self, namespace: &str, name: &str) -> Result<R> {
        (**self).get(namespace, name).await
    }

    async fn create(&self, namespace: &str, obj: &R) -> Result<R> {
        (**self).create(namespace, obj).await
    }

    async fn update(&self, namespace: &str, obj: &R) -> Result<R> {
        (**self).update(namespace, obj).await
    }

    async fn delete(&self, namespace: &str, name: &str, params: &DeleteParams) -> Result<()> {
        (**self).delete(namespace, name, params).await
    }

    async fn list(&self, namespace: &str, params: &ListParams) -> Result<Vec<R>> {
        (**self).list(namespace, params).await
    }
}

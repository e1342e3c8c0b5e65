//! Generic resource client
//!
//! [`CoreClient`] gives every kind the same CRUD, read/modify/write, upsert
//! and wait semantics. It holds no cache and no locks: concurrent writers are
//! reconciled through the store's version tokens, and conflicting writes are
//! retried according to the configured [`RetryPolicy`](crate::RetryPolicy).

use std::time::Duration;

use kube::{Resource, ResourceExt};
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{ClientConfig, UpsertLookup};
use crate::error::{ClientError, Result};
use crate::functional::{Mutator, Predicate};
use crate::kind::ResourceKind;
use crate::options::{DeleteOptions, ListOptions};
use crate::store::Store;
use crate::wait::{Check, Fetched, WaitContext, condition_deleted, condition_true, wrap_predicate};

/// Status condition reported by most Kf kinds once they are usable
pub const CONDITION_READY: &str = "Ready";

/// Client for one kind of object, backed by a store
#[derive(Clone)]
pub struct CoreClient<K, S> {
    kind: K,
    store: S,
    config: ClientConfig,
}

impl<K, S> CoreClient<K, S>
where
    K: ResourceKind,
    S: Store<K::Object>,
{
    /// Create a new client with the default configuration
    pub fn new(kind: K, store: S) -> Self {
        Self {
            kind,
            store,
            config: ClientConfig::default(),
        }
    }

    /// Replace the configuration, rejecting invalid retry policies
    pub fn with_config(mut self, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn kind_name(&self) -> &str {
        self.kind.info().friendly_name()
    }

    /// Cluster-scoped kinds ignore the namespace
    fn scope<'a>(&self, namespace: &'a str) -> &'a str {
        if self.kind.info().namespaced {
            namespace
        } else {
            ""
        }
    }

    // ========== CRUD ==========

    /// Preprocess and create an object
    pub async fn create(&self, namespace: &str, obj: &K::Object) -> Result<K::Object> {
        let mut obj = obj.clone();
        self.kind.preprocess(&mut obj)?;

        self.store
            .create(self.scope(namespace), &obj)
            .await
            .map_err(|e| ClientError::operation("create", self.kind_name(), obj.name_any(), e))
    }

    /// Fetch an object, rejecting objects that fail the kind's membership check
    pub async fn get(&self, namespace: &str, name: &str) -> Result<K::Object> {
        let obj = self
            .store
            .get(self.scope(namespace), name)
            .await
            .map_err(|e| ClientError::operation("get", self.kind_name(), name, e))?;

        if !self.kind.is_member(&obj) {
            return Err(ClientError::NotMember {
                kind: self.kind_name().to_string(),
                name: name.to_string(),
            });
        }

        Ok(obj)
    }

    /// Preprocess and replace an object.
    ///
    /// The object's version token must match the stored one.
    pub async fn update(&self, namespace: &str, obj: &K::Object) -> Result<K::Object> {
        let mut obj = obj.clone();
        self.kind.preprocess(&mut obj)?;

        self.store
            .update(self.scope(namespace), &obj)
            .await
            .map_err(|e| ClientError::operation("update", self.kind_name(), obj.name_any(), e))
    }

    /// Delete an object without checking membership
    pub async fn delete(&self, namespace: &str, name: &str, opts: DeleteOptions) -> Result<()> {
        self.store
            .delete(self.scope(namespace), name, &opts.to_delete_params())
            .await
            .map_err(|e| ClientError::operation("delete", self.kind_name(), name, e))
    }

    /// List objects passing the store-side selectors, the membership check
    /// and every client-side filter, in store order
    pub async fn list(
        &self,
        namespace: &str,
        opts: &ListOptions<K::Object>,
    ) -> Result<Vec<K::Object>> {
        let items = self
            .store
            .list(self.scope(namespace), &opts.to_list_params())
            .await
            .map_err(|e| ClientError::List {
                kind: self.kind_name().to_string(),
                source: Box::new(e),
            })?;

        let filter = opts.filter();
        Ok(items
            .into_iter()
            .filter(|obj| self.kind.is_member(obj) && filter.test(obj))
            .collect())
    }

    // ========== Read/modify/write ==========

    /// Fetch, mutate and update an object, starting over on conflicts.
    ///
    /// Each attempt applies the mutator to a fresh copy, never to the snapshot
    /// that lost the race. Mutator and fetch errors end the loop immediately.
    pub async fn transform(
        &self,
        namespace: &str,
        name: &str,
        mutator: &Mutator<K::Object>,
    ) -> Result<K::Object> {
        let mut attempts = 0;
        loop {
            attempts += 1;

            let mut obj = self.get(namespace, name).await?;
            mutator.apply(&mut obj)?;

            match self.update(namespace, &obj).await {
                Ok(updated) => return Ok(updated),
                Err(err) if err.is_conflict() => self.before_retry(name, attempts).await?,
                Err(err) => return Err(err),
            }
        }
    }

    /// Create `new`, or merge it into the stored object and update that.
    ///
    /// `merge` receives the desired and the stored object. When the merged
    /// object has no version token the stored one is used, so the update
    /// stays conditional. Conflicts re-fetch and re-merge.
    pub async fn upsert<F>(
        &self,
        namespace: &str,
        new: &K::Object,
        merge: F,
    ) -> Result<K::Object>
    where
        F: Fn(&K::Object, &K::Object) -> K::Object + Send + Sync,
    {
        let name = new.name_any();
        let mut attempts = 0;
        loop {
            attempts += 1;

            let Some(existing) = self.lookup(namespace, &name).await? else {
                return self.create(namespace, new).await;
            };

            let mut merged = merge(new, &existing);
            if merged.meta().resource_version.is_none() {
                merged.meta_mut().resource_version = existing.meta().resource_version.clone();
            }

            match self.update(namespace, &merged).await {
                Ok(updated) => return Ok(updated),
                Err(err) if err.is_conflict() => self.before_retry(&name, attempts).await?,
                Err(err) => return Err(err),
            }
        }
    }

    /// Find the stored object for an upsert
    async fn lookup(&self, namespace: &str, name: &str) -> Result<Option<K::Object>> {
        match self.config.upsert_lookup {
            UpsertLookup::Get => match self.get(namespace, name).await {
                Ok(obj) => Ok(Some(obj)),
                Err(err) if err.is_not_found() => Ok(None),
                Err(err) => Err(err),
            },
            UpsertLookup::List => {
                // Some kinds ignore field selectors
                let wanted = name.to_string();
                let opts = ListOptions::new()
                    .with_name(name)
                    .with_filter(Predicate::new(move |obj: &K::Object| {
                        obj.name_any() == wanted
                    }));
                Ok(self.list(namespace, &opts).await?.into_iter().next())
            }
        }
    }

    /// Back off after a conflict, or give up once the retry budget is spent
    async fn before_retry(&self, name: &str, attempts: u32) -> Result<()> {
        let retry = &self.config.retry;
        if !retry.allows_retry(attempts) {
            tracing::warn!(
                "Giving up on {} {:?} after {} conflicting attempts",
                self.kind_name(),
                name,
                attempts
            );
            return Err(ClientError::RetriesExhausted {
                kind: self.kind_name().to_string(),
                name: name.to_string(),
                attempts,
            });
        }

        let delay = retry.backoff(attempts);
        tracing::debug!(
            "Conflict writing {} {:?} (attempt {}), retrying in {:?}",
            self.kind_name(),
            name,
            attempts,
            delay
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    // ========== Waits ==========

    /// Poll an object until `condition` stops the wait.
    ///
    /// The first fetch happens immediately, later ones every `interval`.
    /// Returns the last fetched object when the condition is done, or `None`
    /// if that fetch failed. Fails with a timeout error once `ctx` is done;
    /// cancellation wins over a tick that is ready at the same time.
    pub async fn wait_for_e<F>(
        &self,
        ctx: &WaitContext,
        namespace: &str,
        name: &str,
        interval: Duration,
        condition: F,
    ) -> Result<Option<K::Object>>
    where
        F: Fn(&WaitContext, Fetched<'_, K::Object>) -> Check + Send + Sync,
    {
        if interval.is_zero() {
            return Err(ClientError::InvalidConfig(
                "wait interval must be greater than zero".to_string(),
            ));
        }

        // Dropped with this call on every return path
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let fetched = self.get(namespace, name).await;
            tracing::trace!(
                "Polled {} {:?}: {}",
                self.kind_name(),
                name,
                if fetched.is_ok() { "found" } else { "fetch failed" }
            );

            match condition(ctx, fetched.as_ref()) {
                Check::Pending => {}
                Check::Done => return Ok(fetched.ok()),
                Check::FetchFailed => return fetched.map(Some),
                Check::Failed(err) => return Err(err),
            }

            tokio::select! {
                biased;
                _ = ctx.done() => {
                    tracing::debug!("Stopped waiting for {} {:?}", self.kind_name(), name);
                    return Err(ClientError::WaitTimeout {
                        kind: self.kind_name().to_string(),
                    });
                }
                _ = ticker.tick() => {}
            }
        }
    }

    /// Poll until `predicate` passes; any fetch error ends the wait
    pub async fn wait_for(
        &self,
        ctx: &WaitContext,
        namespace: &str,
        name: &str,
        interval: Duration,
        predicate: Predicate<K::Object>,
    ) -> Result<K::Object> {
        self.wait_for_e(ctx, namespace, name, interval, wrap_predicate(predicate))
            .await?
            .ok_or_else(|| self.missing(name))
    }

    /// Poll until the object is gone; fetch errors other than not-found are returned
    pub async fn wait_for_deletion(
        &self,
        ctx: &WaitContext,
        namespace: &str,
        name: &str,
        interval: Duration,
    ) -> Result<()> {
        self.wait_for_e(ctx, namespace, name, interval, condition_deleted::<K::Object>)
            .await
            .map(|_| ())
    }

    /// Poll until status condition `condition_type` is `True`.
    ///
    /// A `False` condition fails the wait; progress goes to the context's reporter.
    pub async fn wait_for_condition_true(
        &self,
        ctx: &WaitContext,
        namespace: &str,
        name: &str,
        interval: Duration,
        condition_type: &str,
    ) -> Result<K::Object> {
        let condition = condition_true::<K::Object>(condition_type);
        self.wait_for_e(ctx, namespace, name, interval, condition)
            .await?
            .ok_or_else(|| self.missing(name))
    }

    /// Poll until the `Ready` condition is `True`
    pub async fn wait_for_ready(
        &self,
        ctx: &WaitContext,
        namespace: &str,
        name: &str,
        interval: Duration,
    ) -> Result<K::Object> {
        self.wait_for_condition_true(ctx, namespace, name, interval, CONDITION_READY)
            .await
    }

    fn missing(&self, name: &str) -> ClientError {
        ClientError::NotFound {
            kind: self.kind_name().to_string(),
            name: name.to_string(),
        }
    }
}

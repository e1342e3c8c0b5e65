//! Mock store for testing
//!
//! Keeps objects in memory and behaves like an API server where it matters to
//! the client engine: version tokens, conflicts on stale writes, selectors.
//! Tests can also inject failures and simulate concurrent writers.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use kube::ResourceExt;
use kube::api::{DeleteParams, ListParams};

use super::Store;
use crate::error::{ClientError, Result};
use crate::functional::Object;
use crate::kind::ResourceKind;

/// Store operations, used to target injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Create,
    Update,
    Delete,
    List,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub lists: usize,
}

/// Callback run at the start of every update, with the 1-based call number.
///
/// Runs before the version check, so it can simulate another writer.
pub type UpdateHook<R> = Arc<dyn Fn(&MockStore<R>, usize) + Send + Sync>;

struct MockState<R> {
    /// namespace -> name -> object
    objects: BTreeMap<String, BTreeMap<String, R>>,
    next_version: u64,
    injected: HashMap<Operation, VecDeque<ClientError>>,
    ignore_field_selectors: bool,
    on_update: Option<UpdateHook<R>>,
    last_delete: Option<DeleteParams>,
}

/// In-memory store for testing
pub struct MockStore<R> {
    kind: String,
    state: Arc<RwLock<MockState<R>>>,
    operations: Arc<RwLock<OperationCounts>>,
}

impl<R> Clone for MockStore<R> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            state: Arc::clone(&self.state),
            operations: Arc::clone(&self.operations),
        }
    }
}

impl<R: Object> MockStore<R> {
    /// Create an empty store; `kind` is used in error messages
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            state: Arc::new(RwLock::new(MockState {
                objects: BTreeMap::new(),
                next_version: 1,
                injected: HashMap::new(),
                ignore_field_selectors: false,
                on_update: None,
                last_delete: None,
            })),
            operations: Arc::new(RwLock::new(OperationCounts::default())),
        }
    }

    /// Create an empty store named after an adapter's kind
    pub fn for_kind<K: ResourceKind<Object = R>>(kind: &K) -> Self {
        Self::new(kind.info().friendly_name())
    }

    /// Create with pre-populated objects in one namespace
    pub fn with_objects(kind: impl Into<String>, namespace: &str, objects: Vec<R>) -> Self {
        let store = Self::new(kind);
        for obj in objects {
            store.insert(namespace, obj);
        }
        store
    }

    fn state(&self) -> RwLockReadGuard<'_, MockState<R>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, MockState<R>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn count(&self, op: Operation) {
        let mut ops = self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match op {
            Operation::Get => ops.gets += 1,
            Operation::Create => ops.creates += 1,
            Operation::Update => ops.updates += 1,
            Operation::Delete => ops.deletes += 1,
            Operation::List => ops.lists += 1,
        }
    }

    /// Count the call and hand back a queued failure, if any
    async fn begin(&self, op: Operation) -> Result<()> {
        self.count(op);
        tokio::task::yield_now().await;

        let injected = self
            .state_mut()
            .injected
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        match injected {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn not_found(&self, name: &str) -> ClientError {
        ClientError::NotFound {
            kind: self.kind.clone(),
            name: name.to_string(),
        }
    }

    /// Store an object directly, bypassing version checks and counters.
    ///
    /// Assigns a fresh version token and returns the stored copy.
    pub fn insert(&self, namespace: &str, mut obj: R) -> R {
        let mut state = self.state_mut();
        stamp(&mut obj, namespace, &mut state.next_version);
        state
            .objects
            .entry(namespace.to_string())
            .or_default()
            .insert(obj.name_any(), obj.clone());
        obj
    }

    /// Edit a stored object as another writer would, bumping its version
    pub fn modify(&self, namespace: &str, name: &str, f: impl FnOnce(&mut R)) -> Option<R> {
        let mut state = self.state_mut();
        let mut next_version = state.next_version;
        let updated = state
            .objects
            .get_mut(namespace)
            .and_then(|objects| objects.get_mut(name))
            .map(|obj| {
                f(obj);
                stamp(obj, namespace, &mut next_version);
                obj.clone()
            });
        state.next_version = next_version;
        updated
    }

    /// Read a stored object without counting an operation
    pub fn stored(&self, namespace: &str, name: &str) -> Option<R> {
        self.state()
            .objects
            .get(namespace)
            .and_then(|objects| objects.get(name))
            .cloned()
    }

    /// All stored objects, ordered by namespace then name
    pub fn all_objects(&self) -> Vec<R> {
        self.state()
            .objects
            .values()
            .flat_map(|objects| objects.values())
            .cloned()
            .collect()
    }

    /// Count stored objects
    pub fn object_count(&self) -> usize {
        self.state().objects.values().map(BTreeMap::len).sum()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        *self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner) = OperationCounts::default();
    }

    /// Fail the next call of `op` with `err`; queued errors are used in order
    pub fn inject_error(&self, op: Operation, err: ClientError) {
        self.state_mut()
            .injected
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Fail the next `count` updates with conflict errors
    pub fn inject_conflicts(&self, name: &str, count: usize) {
        for _ in 0..count {
            self.inject_error(
                Operation::Update,
                ClientError::Conflict {
                    kind: self.kind.clone(),
                    name: name.to_string(),
                },
            );
        }
    }

    /// Ignore field selectors on list, like some API kinds do
    pub fn ignore_field_selectors(&self) {
        self.state_mut().ignore_field_selectors = true;
    }

    /// Run `hook` at the start of every update
    pub fn on_update(&self, hook: impl Fn(&MockStore<R>, usize) + Send + Sync + 'static) {
        self.state_mut().on_update = Some(Arc::new(hook));
    }

    /// Parameters of the most recent delete call
    pub fn last_delete_params(&self) -> Option<DeleteParams> {
        self.state().last_delete.clone()
    }
}

/// Set namespace and a fresh version token on an object
fn stamp<R: Object>(obj: &mut R, namespace: &str, next_version: &mut u64) {
    let meta = obj.meta_mut();
    if !namespace.is_empty() {
        meta.namespace = Some(namespace.to_string());
    }
    meta.resource_version = Some(next_version.to_string());
    *next_version += 1;
}

#[async_trait]
impl<R: Object> Store<R> for MockStore<R> {
    async fn get(&self, namespace: &str, name: &str) -> Result<R> {
        self.begin(Operation::Get).await?;
        self.stored(namespace, name)
            .ok_or_else(|| self.not_found(name))
    }

    async fn create(&self, namespace: &str, obj: &R) -> Result<R> {
        self.begin(Operation::Create).await?;

        let name = obj.name_any();
        let mut state = self.state_mut();
        let state = &mut *state;
        let objects = state.objects.entry(namespace.to_string()).or_default();
        if objects.contains_key(&name) {
            return Err(ClientError::AlreadyExists {
                kind: self.kind.clone(),
                name,
            });
        }

        let mut created = obj.clone();
        stamp(&mut created, namespace, &mut state.next_version);
        objects.insert(name, created.clone());
        Ok(created)
    }

    async fn update(&self, namespace: &str, obj: &R) -> Result<R> {
        self.begin(Operation::Update).await?;

        let hook = self.state().on_update.clone();
        if let Some(hook) = hook {
            let call = self.operation_counts().updates;
            hook(self, call);
        }

        let name = obj.name_any();
        let mut state = self.state_mut();
        let state = &mut *state;
        let stored = state
            .objects
            .get_mut(namespace)
            .and_then(|objects| objects.get_mut(&name))
            .ok_or_else(|| ClientError::NotFound {
                kind: self.kind.clone(),
                name: name.clone(),
            })?;

        // No token means an unconditional write
        if let Some(version) = obj.resource_version() {
            if stored.resource_version().as_deref() != Some(version.as_str()) {
                return Err(ClientError::Conflict {
                    kind: self.kind.clone(),
                    name,
                });
            }
        }

        let mut updated = obj.clone();
        stamp(&mut updated, namespace, &mut state.next_version);
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, namespace: &str, name: &str, params: &DeleteParams) -> Result<()> {
        self.begin(Operation::Delete).await?;

        let mut state = self.state_mut();
        state.last_delete = Some(params.clone());
        state
            .objects
            .get_mut(namespace)
            .and_then(|objects| objects.remove(name))
            .map(|_| ())
            .ok_or_else(|| self.not_found(name))
    }

    async fn list(&self, namespace: &str, params: &ListParams) -> Result<Vec<R>> {
        self.begin(Operation::List).await?;

        let state = self.state();
        let labels = parse_selector(params.label_selector.as_deref())?;
        let fields = if state.ignore_field_selectors {
            Vec::new()
        } else {
            parse_selector(params.field_selector.as_deref())?
        };
        check_field_labels(&fields)?;

        let mut matched = Vec::new();
        for (ns, objects) in &state.objects {
            if !namespace.is_empty() && ns != namespace {
                continue;
            }
            for obj in objects.values() {
                if !labels.iter().all(|r| r.matches(obj.labels().get(&r.key))) {
                    continue;
                }
                if !fields_match(obj, &fields) {
                    continue;
                }
                matched.push(obj.clone());
            }
        }

        Ok(matched)
    }
}

/// A single selector requirement
#[derive(Debug, Clone, PartialEq, Eq)]
struct Requirement {
    key: String,
    op: SelectorOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SelectorOp {
    Equals(String),
    NotEquals(String),
    Exists,
    NotExists,
}

impl Requirement {
    fn matches(&self, value: Option<&String>) -> bool {
        match (&self.op, value) {
            (SelectorOp::Equals(want), Some(v)) => v == want,
            (SelectorOp::Equals(_), None) => false,
            (SelectorOp::NotEquals(want), v) => v != Some(want),
            (SelectorOp::Exists, v) => v.is_some(),
            (SelectorOp::NotExists, v) => v.is_none(),
        }
    }
}

/// Parse `k=v`, `k==v`, `k!=v`, `k` and `!k` terms separated by commas
fn parse_selector(selector: Option<&str>) -> Result<Vec<Requirement>> {
    let Some(selector) = selector else {
        return Ok(Vec::new());
    };

    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| {
            let (key, op) = if let Some((k, v)) = term.split_once("!=") {
                (k, SelectorOp::NotEquals(v.trim().to_string()))
            } else if let Some((k, v)) = term.split_once("==") {
                (k, SelectorOp::Equals(v.trim().to_string()))
            } else if let Some((k, v)) = term.split_once('=') {
                (k, SelectorOp::Equals(v.trim().to_string()))
            } else if let Some(k) = term.strip_prefix('!') {
                (k, SelectorOp::NotExists)
            } else {
                (term, SelectorOp::Exists)
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(ClientError::Validation(format!(
                    "invalid selector term {:?}",
                    term
                )));
            }

            Ok(Requirement {
                key: key.to_string(),
                op,
            })
        })
        .collect()
}

const FIELD_LABELS: &[&str] = &["metadata.name", "metadata.namespace"];

/// Reject the whole selector up front, even if no object would be visited
fn check_field_labels(requirements: &[Requirement]) -> Result<()> {
    match requirements
        .iter()
        .find(|r| !FIELD_LABELS.contains(&r.key.as_str()))
    {
        Some(unsupported) => Err(ClientError::Validation(format!(
            "field label not supported: {}",
            unsupported.key
        ))),
        None => Ok(()),
    }
}

fn fields_match<R: Object>(obj: &R, requirements: &[Requirement]) -> bool {
    requirements.iter().all(|requirement| {
        let value = match requirement.key.as_str() {
            "metadata.name" => Some(obj.name_any()),
            _ => obj.namespace(),
        };
        requirement.matches(value.as_ref())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::core::ObjectMeta;

    fn config_map(name: &str, labels: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn list_params(labels: Option<&str>, fields: Option<&str>) -> ListParams {
        ListParams {
            label_selector: labels.map(String::from),
            field_selector: fields.map(String::from),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_mock_create_and_get() {
        let store = MockStore::new("ConfigMap");

        let created = store.create("default", &config_map("a", &[])).await.unwrap();
        assert_eq!(created.metadata.namespace.as_deref(), Some("default"));
        assert!(created.metadata.resource_version.is_some());

        let fetched = store.get("default", "a").await.unwrap();
        assert_eq!(fetched, created);

        let counts = store.operation_counts();
        assert_eq!(counts.creates, 1);
        assert_eq!(counts.gets, 1);
    }

    #[tokio::test]
    async fn test_mock_create_duplicate_fails() {
        let store = MockStore::new("ConfigMap");
        store.create("default", &config_map("a", &[])).await.unwrap();

        let err = store.create("default", &config_map("a", &[])).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_mock_get_not_found() {
        let store: MockStore<ConfigMap> = MockStore::new("ConfigMap");
        let err = store.get("default", "missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), r#"ConfigMap "missing" not found"#);
    }

    #[tokio::test]
    async fn test_mock_update_bumps_version() {
        let store = MockStore::new("ConfigMap");
        let created = store.create("default", &config_map("a", &[])).await.unwrap();

        let updated = store.update("default", &created).await.unwrap();
        assert_ne!(updated.metadata.resource_version, created.metadata.resource_version);
    }

    #[tokio::test]
    async fn test_mock_stale_update_conflicts() {
        let store = MockStore::new("ConfigMap");
        let created = store.create("default", &config_map("a", &[])).await.unwrap();
        store.update("default", &created).await.unwrap();

        let err = store.update("default", &created).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_mock_update_without_version_is_unconditional() {
        let store = MockStore::new("ConfigMap");
        store.insert("default", config_map("a", &[]));
        store.modify("default", "a", |_| {});

        let updated = store
            .update("default", &config_map("a", &[("x", "y")]))
            .await
            .unwrap();
        assert_eq!(updated.labels().get("x").map(String::as_str), Some("y"));
    }

    #[tokio::test]
    async fn test_mock_update_missing_object() {
        let store = MockStore::new("ConfigMap");
        let err = store
            .update("default", &config_map("a", &[]))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_mock_delete() {
        let store = MockStore::with_objects("ConfigMap", "default", vec![config_map("a", &[])]);

        store
            .delete("default", "a", &DeleteParams::default())
            .await
            .unwrap();
        assert_eq!(store.object_count(), 0);

        let err = store
            .delete("default", "a", &DeleteParams::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(store.last_delete_params().is_some());
    }

    #[tokio::test]
    async fn test_mock_list_by_namespace_and_labels() {
        let store = MockStore::new("ConfigMap");
        store.insert("a", config_map("one", &[("tier", "web")]));
        store.insert("a", config_map("two", &[("tier", "db")]));
        store.insert("b", config_map("three", &[("tier", "web")]));

        let in_a = store.list("a", &list_params(None, None)).await.unwrap();
        assert_eq!(in_a.len(), 2);

        let everywhere = store
            .list("", &list_params(Some("tier=web"), None))
            .await
            .unwrap();
        let names: Vec<_> = everywhere.iter().map(|o| o.name_any()).collect();
        assert_eq!(names, vec!["one", "three"]);

        let not_web = store
            .list("a", &list_params(Some("tier!=web"), None))
            .await
            .unwrap();
        assert_eq!(not_web.len(), 1);
        assert_eq!(not_web[0].name_any(), "two");
    }

    #[tokio::test]
    async fn test_mock_list_field_selector() {
        let store = MockStore::new("ConfigMap");
        store.insert("a", config_map("one", &[]));
        store.insert("a", config_map("two", &[]));

        let params = list_params(None, Some("metadata.name=two"));
        assert_eq!(store.list("a", &params).await.unwrap().len(), 1);

        store.ignore_field_selectors();
        assert_eq!(store.list("a", &params).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_list_unsupported_field() {
        let store: MockStore<ConfigMap> = MockStore::new("ConfigMap");
        let err = store
            .list("a", &list_params(None, Some("spec.host=x")))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[tokio::test]
    async fn test_mock_list_unsupported_field_with_objects() {
        let store = MockStore::new("ConfigMap");
        store.insert("a", config_map("one", &[]));
        store.insert("b", config_map("two", &[]));

        for namespace in ["a", ""] {
            let err = store
                .list(namespace, &list_params(None, Some("metadata.name=one,spec.host=x")))
                .await
                .unwrap_err();
            assert!(
                matches!(&err, ClientError::Validation(msg) if msg.contains("spec.host")),
                "unexpected error: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_injected_errors_are_consumed_in_order() {
        let store = MockStore::with_objects("ConfigMap", "default", vec![config_map("a", &[])]);
        store.inject_error(Operation::Get, ClientError::Validation("first".to_string()));

        let err = store.get("default", "a").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(msg) if msg == "first"));
        assert!(store.get("default", "a").await.is_ok());
        assert_eq!(store.operation_counts().gets, 2);
    }

    #[tokio::test]
    async fn test_update_hook_simulates_concurrent_writer() {
        let store = MockStore::with_objects("ConfigMap", "default", vec![config_map("a", &[])]);
        store.on_update(|store, call| {
            if call == 1 {
                store.modify("default", "a", |cm| {
                    cm.labels_mut().insert("writer".to_string(), "other".to_string());
                });
            }
        });

        let snapshot = store.get("default", "a").await.unwrap();
        let err = store.update("default", &snapshot).await.unwrap_err();
        assert!(err.is_conflict());

        let fresh = store.get("default", "a").await.unwrap();
        assert!(store.update("default", &fresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_counts() {
        let store: MockStore<ConfigMap> = MockStore::new("ConfigMap");
        let _ = store.get("default", "a").await;
        store.reset_counts();
        assert_eq!(store.operation_counts(), OperationCounts::default());
    }

    #[test]
    fn test_parse_selector() {
        let parsed = parse_selector(Some("a=1, b!=2,c,!d,e==5")).unwrap();
        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed[0].op, SelectorOp::Equals("1".to_string()));
        assert_eq!(parsed[1].op, SelectorOp::NotEquals("2".to_string()));
        assert_eq!(parsed[2].op, SelectorOp::Exists);
        assert_eq!(parsed[3].op, SelectorOp::NotExists);
        assert_eq!(parsed[4].op, SelectorOp::Equals("5".to_string()));

        assert!(parse_selector(Some("=x")).is_err());
    }
}

//! ---
//! mig_section: "02-resource-access"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Resource store abstraction and backends."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
//! In-memory [`ResourceStore`] used for offline runs, dry runs, and tests.
//!
//! Objects are keyed by `(api, collection)` and then by `(namespace, name)`,
//! both in insertion order, so listings are deterministic. Successful writes
//! are appended to a journal that callers can inspect afterwards.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use strum::{Display, EnumString};
use tracing::trace;

use crate::snapshot::{SnapshotCollection, SnapshotDocument};
use crate::{ResourcePath, ResourceStore, StoreError, StoreResult};

type CollectionKey = (String, String);
type ObjectKey = (Option<String>, String);

/// Kind of store operation, used by the write journal and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum StoreOpKind {
    /// Collection listing.
    List,
    /// Single-object read.
    Get,
    /// Object creation.
    Create,
    /// Object replacement.
    Update,
    /// Object removal.
    Delete,
}

/// A successful write recorded by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOp {
    /// Operation kind.
    pub kind: StoreOpKind,
    /// Collection path the operation addressed.
    pub path: String,
    /// Object name.
    pub name: String,
}

#[derive(Debug)]
struct InjectedFailure {
    kind: StoreOpKind,
    name: Option<String>,
    message: String,
}

#[derive(Debug, Default)]
struct Inner {
    collections: IndexMap<CollectionKey, IndexMap<ObjectKey, Value>>,
    journal: Vec<StoreOp>,
    failures: Vec<InjectedFailure>,
}

/// Process-local store backed by ordered maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated from a snapshot document.
    pub fn from_snapshot(document: &SnapshotDocument) -> StoreResult<Self> {
        let store = Self::new();
        for collection in &document.collections {
            for item in &collection.items {
                store.insert(&collection.path, item.clone())?;
            }
        }
        Ok(store)
    }

    /// Seed an object without journaling it. When `path` carries no namespace,
    /// the object's own `metadata.namespace` decides where it lands.
    pub fn insert(&self, path: &ResourcePath, mut body: Value) -> StoreResult<()> {
        let name = object_name(path, &body)?;
        let namespace = path
            .namespace()
            .map(str::to_owned)
            .or_else(|| object_namespace(&body));
        if let Some(namespace) = &namespace {
            stamp_namespace(&mut body, namespace);
        }
        let mut inner = self.inner.lock();
        inner
            .collections
            .entry(collection_key(path))
            .or_default()
            .insert((namespace, name), body);
        Ok(())
    }

    /// Make the next `kind` operation (optionally only on object `name`) fail
    /// with an unexpected error.
    pub fn fail_next(&self, kind: StoreOpKind, name: Option<&str>, message: impl Into<String>) {
        self.inner.lock().failures.push(InjectedFailure {
            kind,
            name: name.map(str::to_owned),
            message: message.into(),
        });
    }

    /// Every successful write so far, oldest first.
    pub fn journal(&self) -> Vec<StoreOp> {
        self.inner.lock().journal.clone()
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.inner.lock().journal.len()
    }

    /// Forget recorded writes, keeping the data.
    pub fn clear_journal(&self) {
        self.inner.lock().journal.clear();
    }

    /// Number of stored objects across all collections.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .collections
            .values()
            .map(IndexMap::len)
            .sum()
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Export the current contents grouped by cluster-wide collection path.
    pub fn export(&self) -> SnapshotDocument {
        let inner = self.inner.lock();
        let collections = inner
            .collections
            .iter()
            .map(|((api, collection), objects)| SnapshotCollection {
                path: ResourcePath::cluster(api.clone(), collection.clone()),
                items: objects.values().cloned().collect(),
            })
            .collect();
        SnapshotDocument { collections }
    }

    fn check_failure(inner: &mut Inner, kind: StoreOpKind, name: Option<&str>) -> StoreResult<()> {
        let position = inner.failures.iter().position(|failure| {
            failure.kind == kind
                && match (&failure.name, name) {
                    (None, _) => true,
                    (Some(expected), Some(actual)) => expected == actual,
                    (Some(_), None) => false,
                }
        });
        match position {
            Some(index) => {
                let failure = inner.failures.remove(index);
                Err(StoreError::Unexpected(anyhow::anyhow!(failure.message)))
            }
            None => Ok(()),
        }
    }

    fn record(inner: &mut Inner, kind: StoreOpKind, path: &ResourcePath, name: &str) {
        trace!(op = %kind, path = %path, name, "store write");
        inner.journal.push(StoreOp {
            kind,
            path: path.to_string(),
            name: name.to_owned(),
        });
    }
}

impl ResourceStore for MemoryStore {
    fn list(&self, path: &ResourcePath) -> StoreResult<Vec<Value>> {
        let mut inner = self.inner.lock();
        Self::check_failure(&mut inner, StoreOpKind::List, None)?;
        let Some(objects) = inner.collections.get(&collection_key(path)) else {
            return Ok(Vec::new());
        };
        Ok(objects
            .iter()
            .filter(|((namespace, _), _)| match path.namespace() {
                Some(wanted) => namespace.as_deref() == Some(wanted),
                None => true,
            })
            .map(|(_, value)| value.clone())
            .collect())
    }

    fn get(&self, path: &ResourcePath, name: &str) -> StoreResult<Value> {
        let mut inner = self.inner.lock();
        Self::check_failure(&mut inner, StoreOpKind::Get, Some(name))?;
        inner
            .collections
            .get(&collection_key(path))
            .and_then(|objects| objects.get(&object_key(path, name)))
            .cloned()
            .ok_or_else(|| StoreError::not_found(path, name))
    }

    fn create(&self, path: &ResourcePath, mut body: Value) -> StoreResult<()> {
        let name = object_name(path, &body)?;
        if let Some(namespace) = path.namespace() {
            stamp_namespace(&mut body, namespace);
        }
        let mut inner = self.inner.lock();
        Self::check_failure(&mut inner, StoreOpKind::Create, Some(&name))?;
        let objects = inner.collections.entry(collection_key(path)).or_default();
        let key = object_key(path, &name);
        if objects.contains_key(&key) {
            return Err(StoreError::already_exists(path, name));
        }
        objects.insert(key, body);
        Self::record(&mut inner, StoreOpKind::Create, path, &name);
        Ok(())
    }

    fn update(&self, path: &ResourcePath, name: &str, body: Value) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        Self::check_failure(&mut inner, StoreOpKind::Update, Some(name))?;
        let slot = inner
            .collections
            .get_mut(&collection_key(path))
            .and_then(|objects| objects.get_mut(&object_key(path, name)))
            .ok_or_else(|| StoreError::not_found(path, name))?;
        *slot = body;
        Self::record(&mut inner, StoreOpKind::Update, path, name);
        Ok(())
    }

    fn delete(&self, path: &ResourcePath, name: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        Self::check_failure(&mut inner, StoreOpKind::Delete, Some(name))?;
        inner
            .collections
            .get_mut(&collection_key(path))
            .and_then(|objects| objects.shift_remove(&object_key(path, name)))
            .ok_or_else(|| StoreError::not_found(path, name))?;
        Self::record(&mut inner, StoreOpKind::Delete, path, name);
        Ok(())
    }
}

fn collection_key(path: &ResourcePath) -> CollectionKey {
    (path.api().to_owned(), path.collection().to_owned())
}

fn object_key(path: &ResourcePath, name: &str) -> ObjectKey {
    (path.namespace().map(str::to_owned), name.to_owned())
}

fn object_name(path: &ResourcePath, body: &Value) -> StoreResult<String> {
    body.pointer("/metadata/name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| {
            StoreError::Unexpected(anyhow::anyhow!(
                "object written to {path} has no metadata.name"
            ))
        })
}

fn stamp_namespace(body: &mut Value, namespace: &str) {
    if let Some(meta) = body.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.entry("namespace")
            .or_insert_with(|| Value::String(namespace.to_owned()));
    }
}

fn object_namespace(body: &Value) -> Option<String> {
    body.pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .filter(|ns| !ns.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roles(ns: Option<&str>) -> ResourcePath {
        ResourcePath::cluster("/apis/rbac.example.io/v1", "roles").in_namespace(ns)
    }

    #[test]
    fn cluster_listing_spans_namespaces() {
        let store = MemoryStore::new();
        store
            .create(&roles(Some("a")), json!({"metadata": {"name": "r1"}}))
            .unwrap();
        store
            .create(&roles(Some("b")), json!({"metadata": {"name": "r1"}}))
            .unwrap();

        assert_eq!(store.list(&roles(None)).unwrap().len(), 2);
        let only_a = store.list(&roles(Some("a"))).unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0]["metadata"]["namespace"], json!("a"));
    }

    #[test]
    fn create_and_delete_report_conflicts() {
        let store = MemoryStore::new();
        let path = roles(Some("a"));
        store.create(&path, json!({"metadata": {"name": "r1"}})).unwrap();
        let dup = store
            .create(&path, json!({"metadata": {"name": "r1"}}))
            .unwrap_err();
        assert!(dup.is_already_exists());

        store.delete(&path, "r1").unwrap();
        assert!(store.delete(&path, "r1").unwrap_err().is_not_found());
        assert!(store.get(&path, "r1").unwrap_err().is_not_found());
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn insert_is_not_journaled() {
        let store = MemoryStore::new();
        store
            .insert(&roles(None), json!({"metadata": {"name": "r1", "namespace": "dev"}}))
            .unwrap();
        assert_eq!(store.write_count(), 0);
        assert!(store.get(&roles(Some("dev")), "r1").is_ok());
    }

    #[test]
    fn injected_failure_fires_once() {
        let store = MemoryStore::new();
        let path = roles(Some("a"));
        store.fail_next(StoreOpKind::Create, Some("r1"), "apiserver unavailable");
        let err = store
            .create(&path, json!({"metadata": {"name": "r1"}}))
            .unwrap_err();
        assert!(matches!(err, StoreError::Unexpected(_)));
        store.create(&path, json!({"metadata": {"name": "r1"}})).unwrap();
    }

    #[test]
    fn create_without_name_is_rejected() {
        let store = MemoryStore::new();
        let err = store.create(&roles(None), json!({"metadata": {}})).unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }
}

//! ---
//! mig_section: "02-resource-access"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Resource store abstraction and backends."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Narrow resource-access interface consumed by the migration engine.
//!
//! Every component of the engine talks to resources through [`ResourceStore`]
//! only. Bodies travel as raw JSON values; [`TypedStore`] layers serde-typed
//! helpers on top for callers that know the resource shape.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub mod memory;
pub mod model;
pub mod path;
pub mod snapshot;

pub use memory::{MemoryStore, StoreOp, StoreOpKind};
pub use model::{Extra, ObjectMeta, PolicyRule, Role, RoleBinding, RoleRef, Subject};
pub use path::ResourcePath;
pub use snapshot::{load_snapshot, save_snapshot, SnapshotCollection, SnapshotDocument};

/// Result alias used throughout the store crate.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by a [`ResourceStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The addressed object does not exist.
    #[error("{path}/{name} not found")]
    NotFound {
        /// Collection path that was addressed.
        path: String,
        /// Object name.
        name: String,
    },
    /// An object with the same name already exists in the collection.
    #[error("{path}/{name} already exists")]
    AlreadyExists {
        /// Collection path that was addressed.
        path: String,
        /// Object name.
        name: String,
    },
    /// A body could not be converted to or from its typed form.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    /// Any other transport or server failure.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl StoreError {
    /// Build a [`StoreError::NotFound`] for an object under `path`.
    pub fn not_found(path: &ResourcePath, name: impl Into<String>) -> Self {
        StoreError::NotFound {
            path: path.to_string(),
            name: name.into(),
        }
    }

    /// Build a [`StoreError::AlreadyExists`] for an object under `path`.
    pub fn already_exists(path: &ResourcePath, name: impl Into<String>) -> Self {
        StoreError::AlreadyExists {
            path: path.to_string(),
            name: name.into(),
        }
    }

    /// Whether the error reports a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Whether the error reports a name collision on create.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

/// Synchronous access to resource collections addressed by path and name.
pub trait ResourceStore {
    /// List every object under `path`. A path without a namespace lists the
    /// collection across all namespaces.
    fn list(&self, path: &ResourcePath) -> StoreResult<Vec<Value>>;

    /// Fetch a single object.
    fn get(&self, path: &ResourcePath, name: &str) -> StoreResult<Value>;

    /// Create an object; the name is taken from `metadata.name` of the body.
    fn create(&self, path: &ResourcePath, body: Value) -> StoreResult<()>;

    /// Replace an existing object.
    fn update(&self, path: &ResourcePath, name: &str, body: Value) -> StoreResult<()>;

    /// Remove an object.
    fn delete(&self, path: &ResourcePath, name: &str) -> StoreResult<()>;
}

impl<S: ResourceStore + ?Sized> ResourceStore for &S {
    fn list(&self, path: &ResourcePath) -> StoreResult<Vec<Value>> {
        (**self).list(path)
    }

    fn get(&self, path: &ResourcePath, name: &str) -> StoreResult<Value> {
        (**self).get(path, name)
    }

    fn create(&self, path: &ResourcePath, body: Value) -> StoreResult<()> {
        (**self).create(path, body)
    }

    fn update(&self, path: &ResourcePath, name: &str, body: Value) -> StoreResult<()> {
        (**self).update(path, name, body)
    }

    fn delete(&self, path: &ResourcePath, name: &str) -> StoreResult<()> {
        (**self).delete(path, name)
    }
}

/// Serde-typed convenience layer over any [`ResourceStore`].
pub trait TypedStore: ResourceStore {
    /// List and decode every object under `path`.
    fn list_as<T: DeserializeOwned>(&self, path: &ResourcePath) -> StoreResult<Vec<T>> {
        self.list(path)?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(StoreError::from))
            .collect()
    }

    /// Fetch and decode a single object.
    fn get_as<T: DeserializeOwned>(&self, path: &ResourcePath, name: &str) -> StoreResult<T> {
        let value = self.get(path, name)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Encode and create an object.
    fn create_from<T: Serialize>(&self, path: &ResourcePath, body: &T) -> StoreResult<()> {
        self.create(path, serde_json::to_value(body)?)
    }

    /// Encode and replace an object.
    fn update_from<T: Serialize>(
        &self,
        path: &ResourcePath,
        name: &str,
        body: &T,
    ) -> StoreResult<()> {
        self.update(path, name, serde_json::to_value(body)?)
    }
}

impl<S: ResourceStore + ?Sized> TypedStore for S {}

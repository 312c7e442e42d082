//! ---
//! mig_section: "02-resource-access"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Resource store abstraction and backends."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::ResourcePath;

/// Serialized dump of resource collections, loadable into a [`crate::MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    /// Collections in file order.
    #[serde(default)]
    pub collections: Vec<SnapshotCollection>,
}

/// Objects stored under one collection path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotCollection {
    /// Collection path; namespaced objects may use the cluster-wide path and
    /// carry their namespace in `metadata.namespace`.
    pub path: ResourcePath,
    /// Raw object bodies.
    #[serde(default)]
    pub items: Vec<Value>,
}

impl SnapshotDocument {
    /// Total number of objects across collections.
    pub fn object_count(&self) -> usize {
        self.collections.iter().map(|c| c.items.len()).sum()
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Load a snapshot from disk. `.yaml`/`.yml` files are parsed as YAML,
/// everything else as JSON.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<SnapshotDocument> {
    let path = path.as_ref();
    debug!(snapshot = %path.display(), "loading resource snapshot");
    let raw = fs::read_to_string(path)
        .with_context(|| format!("unable to read snapshot {}", path.display()))?;
    let document = if is_yaml(path) {
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse YAML snapshot {}", path.display()))?
    } else {
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse JSON snapshot {}", path.display()))?
    };
    Ok(document)
}

/// Persist a snapshot, choosing the format from the file extension.
pub fn save_snapshot(document: &SnapshotDocument, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let serialized = if is_yaml(path) {
        serde_yaml::to_string(document).with_context(|| "failed to serialise snapshot to YAML")?
    } else {
        serde_json::to_string_pretty(document)
            .with_context(|| "failed to serialise snapshot to JSON")?
    };
    fs::write(path, serialized)
        .with_context(|| format!("unable to write snapshot to {}", path.display()))?;
    debug!(snapshot = %path.display(), objects = document.object_count(), "snapshot written");
    Ok(())
}

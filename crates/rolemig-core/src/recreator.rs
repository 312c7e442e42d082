//! ---
//! mig_section: "04-role-reconciliation"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Delete-then-create role replacement."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
//! Replacing a role is two store calls: delete the old object, then create
//! the rebuilt one. The role is absent between the calls; a crash in that
//! window leaves it absent until the run is repeated. A missing object on
//! delete and a name collision on create both count as success, so a
//! repeated run converges.

use indexmap::IndexMap;
use rolemig_common::MetadataKeys;
use rolemig_store::{ObjectMeta, PolicyRule, ResourcePath, ResourceStore, Role, TypedStore};
use tracing::{debug, info};

use crate::codec::encode_aggregation;
use crate::scope::ScopeSettings;
use crate::{MigrationError, Result};

/// Rebuilds roles from trimmed references and swaps them in.
pub struct RoleRecreator<'a> {
    store: &'a dyn ResourceStore,
    keys: &'a MetadataKeys,
}

impl<'a> RoleRecreator<'a> {
    pub fn new(store: &'a dyn ResourceStore, keys: &'a MetadataKeys) -> Self {
        Self { store, keys }
    }

    /// Build the replacement for `old`: same identity, scope labels only,
    /// aggregation and creator annotations, and the resolved rules.
    pub fn build(
        &self,
        settings: &ScopeSettings,
        old: &Role,
        refs: &[String],
        rules: Vec<PolicyRule>,
    ) -> Result<Role> {
        let encoded = encode_aggregation(refs).map_err(|source| MigrationError::Aggregation {
            role: old.metadata.name.clone(),
            source,
        })?;

        let labels: IndexMap<String, String> = settings
            .retained_labels
            .iter()
            .filter_map(|key| {
                old.metadata
                    .labels
                    .get(key)
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect();

        let mut annotations = IndexMap::new();
        annotations.insert(self.keys.aggregation_annotation.clone(), encoded);
        annotations.insert(
            self.keys.creator_annotation.clone(),
            old.metadata
                .annotations
                .get(&self.keys.creator_annotation)
                .cloned()
                .unwrap_or_default(),
        );

        Ok(Role {
            api_version: settings.api_version.clone(),
            kind: settings.kind.role_kind().to_owned(),
            metadata: ObjectMeta {
                name: old.metadata.name.clone(),
                namespace: old.metadata.namespace.clone(),
                labels,
                annotations,
                ..ObjectMeta::default()
            },
            rules,
        })
    }

    /// Replace the object named like `role` under `path` with `role`.
    pub fn replace(&self, path: &ResourcePath, role: &Role) -> Result<()> {
        let name = role.metadata.name.as_str();
        match self.store.delete(path, name) {
            Ok(()) => debug!(role = name, path = %path, "deleted role"),
            Err(err) if err.is_not_found() => {
                debug!(role = name, path = %path, "role already absent before recreate")
            }
            Err(err) => return Err(err.into()),
        }
        match self.store.create_from(path, role) {
            Ok(()) => {}
            Err(err) if err.is_already_exists() => {
                debug!(role = name, path = %path, "role already recreated")
            }
            Err(err) => return Err(err.into()),
        }
        info!(
            role = name,
            path = %path,
            aggregation = role
                .metadata
                .annotations
                .get(&self.keys.aggregation_annotation)
                .map(String::as_str)
                .unwrap_or(""),
            "recreated role"
        );
        Ok(())
    }

    /// Build the replacement and swap it in.
    pub fn recreate(
        &self,
        settings: &ScopeSettings,
        path: &ResourcePath,
        old: &Role,
        refs: &[String],
        rules: Vec<PolicyRule>,
    ) -> Result<Role> {
        let role = self.build(settings, old, refs, rules)?;
        self.replace(path, &role)?;
        Ok(role)
    }
}

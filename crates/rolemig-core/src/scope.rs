//! ---
//! mig_section: "04-role-reconciliation"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Per-scope role migration."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
//! One [`ScopeMigrator`] per scope walks every role of that scope, trims
//! deprecated template references from custom roles, and swaps in rebuilt
//! roles. Roles are visited in listing order; the first fatal error stops
//! the walk and leaves already recreated roles in place.

use std::collections::HashSet;

use rolemig_common::{BuiltinMatch, MetadataKeys, MigrationConfig, ScopeKind};
use rolemig_logging::{mig_debug, mig_info, LogContext, Phase};
use rolemig_store::{ResourcePath, ResourceStore, Role, TypedStore};

use crate::codec::decode_aggregation;
use crate::filter::filter_deprecated;
use crate::predicate::is_custom_role;
use crate::recreator::RoleRecreator;
use crate::report::{RoleOutcome, RoleRecord, ScopeReport, SkipReason};
use crate::resolver::RuleResolver;
use crate::{MigrationError, Result};

/// Static tables and object shape for one scope.
#[derive(Debug, Clone)]
pub struct ScopeSettings {
    pub kind: ScopeKind,
    /// Collection path; for namespaced scope this carries no namespace.
    pub roles_path: ResourcePath,
    pub api_version: String,
    pub builtin_roles: Vec<String>,
    pub deprecated_templates: HashSet<String>,
    pub builtin_match: BuiltinMatch,
    /// Label keys copied onto rebuilt roles.
    pub retained_labels: Vec<String>,
}

impl ScopeSettings {
    pub fn from_config(config: &MigrationConfig, kind: ScopeKind) -> Self {
        let scope = config.scope(kind);
        let retained_labels = match kind {
            ScopeKind::Workspace => vec![config.keys.workspace_label.clone()],
            ScopeKind::Global | ScopeKind::Namespaced => Vec::new(),
        };
        Self {
            kind,
            roles_path: config.api.roles(kind, None),
            api_version: config.api.api_version(kind),
            builtin_roles: scope.builtin_roles.clone(),
            deprecated_templates: scope.deprecated_templates.iter().cloned().collect(),
            builtin_match: scope.builtin_match,
            retained_labels,
        }
    }

    /// Path that templates and the recreated role of `role` live under.
    pub fn path_for(&self, role: &Role) -> ResourcePath {
        match self.kind {
            ScopeKind::Namespaced => self
                .roles_path
                .in_namespace(role.metadata.namespace.as_deref()),
            ScopeKind::Global | ScopeKind::Workspace => self.roles_path.clone(),
        }
    }
}

/// Runs the trim-resolve-recreate pipeline over one scope.
pub struct ScopeMigrator<'a> {
    store: &'a dyn ResourceStore,
    settings: ScopeSettings,
    keys: &'a MetadataKeys,
}

impl<'a> ScopeMigrator<'a> {
    pub fn new(store: &'a dyn ResourceStore, settings: ScopeSettings, keys: &'a MetadataKeys) -> Self {
        Self {
            store,
            settings,
            keys,
        }
    }

    pub fn settings(&self) -> &ScopeSettings {
        &self.settings
    }

    pub fn run(&self) -> Result<ScopeReport> {
        let scope_name = self.settings.kind.to_string();
        let roles: Vec<Role> = self.store.list_as(&self.settings.roles_path)?;
        mig_info!(
            context = LogContext::new().with_scope(&scope_name),
            "migrating {} role(s) under {}",
            roles.len(),
            self.settings.roles_path
        );

        let mut report = ScopeReport::new(self.settings.kind);
        for role in &roles {
            let outcome = self.migrate_role(&scope_name, role)?;
            report.records.push(RoleRecord {
                name: role.metadata.name.clone(),
                namespace: role.metadata.namespace.clone(),
                outcome,
            });
        }
        Ok(report)
    }

    fn migrate_role(&self, scope_name: &str, role: &Role) -> Result<RoleOutcome> {
        let name = role.metadata.name.as_str();
        let ctx = LogContext::new()
            .with_scope(scope_name)
            .with_role(name)
            .with_namespace(role.metadata.namespace.as_deref())
            .with_phase(Phase::Inspect);

        if !is_custom_role(
            &role.metadata,
            &self.settings.builtin_roles,
            self.settings.builtin_match,
            self.keys,
        ) {
            mig_debug!(context = ctx, "not a custom role");
            return Ok(RoleOutcome::Skipped {
                reason: SkipReason::NotCustom,
            });
        }

        let raw = role
            .metadata
            .annotation(&self.keys.aggregation_annotation)
            .unwrap_or_default();
        let refs = decode_aggregation(raw).map_err(|source| MigrationError::Aggregation {
            role: name.to_owned(),
            source,
        })?;
        let (changed, kept) = filter_deprecated(&self.settings.deprecated_templates, &refs);
        if !changed {
            mig_debug!(context = ctx, "no deprecated template references");
            return Ok(RoleOutcome::Skipped {
                reason: SkipReason::Unchanged,
            });
        }

        let path = self.settings.path_for(role);
        let resolution = RuleResolver::new(self.store).resolve(&path, &kept)?;
        mig_debug!(
            context = ctx.clone().with_phase(Phase::Resolve),
            "resolved {} rule(s) from {} template(s)",
            resolution.rules.len(),
            kept.len() - resolution.missing.len()
        );

        RoleRecreator::new(self.store, self.keys).recreate(
            &self.settings,
            &path,
            role,
            &kept,
            resolution.rules,
        )?;
        mig_info!(
            context = ctx.with_phase(Phase::Recreate),
            "dropped {} deprecated reference(s)",
            refs.len() - kept.len()
        );

        Ok(RoleOutcome::Recreated {
            removed: refs.len() - kept.len(),
            kept,
            missing_templates: resolution.missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolemig_store::MemoryStore;
    use serde_json::json;

    fn global_store(config: &MigrationConfig) -> (MemoryStore, ResourcePath) {
        let path = config.api.roles(ScopeKind::Global, None);
        let store = MemoryStore::new();
        let keys = &config.keys;
        for (name, verbs) in [("t1", "get"), ("t2", "list")] {
            store
                .insert(
                    &path,
                    json!({
                        "metadata": {"name": name, "labels": {keys.role_template_label.as_str(): "true"}},
                        "rules": [{"verbs": [verbs], "resources": ["pods"]}]
                    }),
                )
                .unwrap();
        }
        (store, path)
    }

    fn custom(path: &ResourcePath, store: &MemoryStore, keys: &MetadataKeys, name: &str, refs: &str) {
        store
            .insert(
                path,
                json!({
                    "metadata": {
                        "name": name,
                        "annotations": {
                            keys.aggregation_annotation.as_str(): refs,
                            keys.creator_annotation.as_str(): "alice"
                        }
                    },
                    "rules": []
                }),
            )
            .unwrap();
    }

    #[test]
    fn trims_deprecated_reference_and_rebuilds_rules() {
        let config = MigrationConfig::default();
        let (store, path) = global_store(&config);
        custom(
            &path,
            &store,
            &config.keys,
            "r1",
            r#"["t1","role-template-manage-users","t2"]"#,
        );

        let settings = ScopeSettings::from_config(&config, ScopeKind::Global);
        let report = ScopeMigrator::new(&store, settings, &config.keys)
            .run()
            .unwrap();

        assert_eq!(report.recreated(), 1);
        assert_eq!(report.skipped(SkipReason::NotCustom), 2);
        let role: Role = store.get_as(&path, "r1").unwrap();
        assert_eq!(
            role.metadata.annotation(&config.keys.aggregation_annotation),
            Some(r#"["t1","t2"]"#)
        );
        assert_eq!(role.rules.len(), 2);
        assert_eq!(role.kind, "GlobalRole");
    }

    #[test]
    fn unchanged_role_is_not_written() {
        let config = MigrationConfig::default();
        let (store, path) = global_store(&config);
        custom(&path, &store, &config.keys, "r2", r#"["t1"]"#);

        let settings = ScopeSettings::from_config(&config, ScopeKind::Global);
        let report = ScopeMigrator::new(&store, settings, &config.keys)
            .run()
            .unwrap();
        assert_eq!(report.skipped(SkipReason::Unchanged), 1);
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn malformed_annotation_aborts() {
        let config = MigrationConfig::default();
        let (store, path) = global_store(&config);
        custom(&path, &store, &config.keys, "broken", "not json");

        let settings = ScopeSettings::from_config(&config, ScopeKind::Global);
        let err = ScopeMigrator::new(&store, settings, &config.keys)
            .run()
            .unwrap_err();
        assert!(matches!(err, MigrationError::Aggregation { ref role, .. } if role == "broken"));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn namespaced_roles_resolve_in_their_own_namespace() {
        let config = MigrationConfig::default();
        let settings = ScopeSettings::from_config(&config, ScopeKind::Namespaced);
        let dev = config.api.roles(ScopeKind::Namespaced, Some("dev"));
        let store = MemoryStore::new();
        store
            .insert(
                &dev,
                json!({"metadata": {"name": "view-pods"}, "rules": [{"verbs": ["get"], "resources": ["pods"]}]}),
            )
            .unwrap();
        custom(
            &dev,
            &store,
            &config.keys,
            "ops",
            r#"["view-pods","role-template-manage-members"]"#,
        );

        let role: Role = store.get_as(&dev, "ops").unwrap();
        assert_eq!(settings.path_for(&role), dev);

        let report = ScopeMigrator::new(&store, settings, &config.keys)
            .run()
            .unwrap();
        let record = report.record("ops", Some("dev")).unwrap();
        assert_eq!(
            record.outcome,
            RoleOutcome::Recreated {
                removed: 1,
                kept: vec!["view-pods".into()],
                missing_templates: vec![],
            }
        );
        let rebuilt: Role = store.get_as(&dev, "ops").unwrap();
        assert_eq!(rebuilt.metadata.namespace.as_deref(), Some("dev"));
        assert_eq!(rebuilt.rules.len(), 1);
    }
}

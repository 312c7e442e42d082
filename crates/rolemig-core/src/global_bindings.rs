//! ---
//! mig_section: "04-role-reconciliation"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Legacy cluster role-binding conversion."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
//! Each user used to hold a cluster role binding named after them. Those
//! become global role bindings named `{user}-{role}`. Builtin cluster roles
//! map to their global replacement by table; custom cluster roles with a
//! creator are rebuilt as global roles aggregating the templates their rules
//! cover. Legacy bindings are removed last, and a failed removal only warns.

use indexmap::IndexMap;
use rolemig_common::{MigrationConfig, ScopeKind};
use rolemig_logging::{log_migration_event, mig_warn, LogContext, MigrationOutcome, Phase};
use rolemig_store::{ObjectMeta, ResourceStore, Role, RoleBinding, RoleRef, Subject, TypedStore};
use tracing::{debug, info};

use crate::bindings::rules_cover;
use crate::codec::encode_aggregation;
use crate::report::GlobalBindingsReport;
use crate::retry::RetryPolicy;
use crate::{MigrationError, Result};

/// Converts single-user cluster role bindings into global role bindings.
pub struct GlobalRoleBindingMigrator<'a> {
    store: &'a dyn ResourceStore,
    config: &'a MigrationConfig,
    retry: RetryPolicy,
}

#[derive(Default)]
struct Plan {
    roles: Vec<Role>,
    bindings: Vec<RoleBinding>,
    legacy: Vec<String>,
}

impl<'a> GlobalRoleBindingMigrator<'a> {
    pub fn new(store: &'a dyn ResourceStore, config: &'a MigrationConfig) -> Self {
        Self {
            store,
            config,
            retry: RetryPolicy::from_config(&config.retry),
        }
    }

    /// Override the retry policy (tests use a zero delay).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn run(&self) -> Result<GlobalBindingsReport> {
        let mut report = GlobalBindingsReport::default();
        let legacy: Vec<RoleBinding> = self
            .store
            .list_as(&self.config.api.cluster_role_bindings())?;
        info!(count = legacy.len(), "inspecting cluster role bindings");

        let mut plan = Plan::default();
        for binding in &legacy {
            self.plan_binding(binding, &mut plan, &mut report)?;
        }

        let roles = self.config.api.roles(ScopeKind::Global, None);
        for role in &plan.roles {
            match self.store.create_from(&roles, role) {
                Ok(()) => {
                    info!(role = %role.metadata.name, rules = role.rules.len(), "created global role")
                }
                Err(err) if err.is_already_exists() => {
                    debug!(role = %role.metadata.name, "global role already exists")
                }
                Err(err) => return Err(err.into()),
            }
            report.created_roles.push(role.metadata.name.clone());
        }

        let bindings = self.config.api.global_role_bindings();
        for binding in &plan.bindings {
            match self.store.create_from(&bindings, binding) {
                Ok(()) => {}
                Err(err) if err.is_already_exists() => {
                    debug!(binding = %binding.metadata.name, "global role binding already exists")
                }
                Err(err) => return Err(err.into()),
            }
            report.converted += 1;
        }

        let cluster_bindings = self.config.api.cluster_role_bindings();
        for name in &plan.legacy {
            let ctx = LogContext::new()
                .with_scope("global")
                .with_role(name)
                .with_phase(Phase::Bindings);
            match self.store.delete(&cluster_bindings, name) {
                Ok(()) => {
                    log_migration_event(
                        Some(&ctx),
                        "cluster-binding.deleted",
                        "legacy cluster role binding deleted",
                        MigrationOutcome::Applied,
                    );
                    report.deleted_legacy.push(name.clone());
                }
                Err(err) => {
                    mig_warn!(
                        context = ctx,
                        "delete legacy cluster role binding failed: {}",
                        err
                    );
                }
            }
        }
        Ok(report)
    }

    fn plan_binding(
        &self,
        binding: &RoleBinding,
        plan: &mut Plan,
        report: &mut GlobalBindingsReport,
    ) -> Result<()> {
        let name = binding.metadata.name.as_str();
        let user = match binding.subjects.as_slice() {
            [subject] if subject.is_user() && subject.name == name => subject.name.as_str(),
            _ => {
                debug!(binding = name, "not a per-user cluster role binding");
                report.skipped += 1;
                return Ok(());
            }
        };

        let role_ref = binding.role_ref.name.as_str();
        let global_ref = match self.config.global_bindings.role_mapping.get(role_ref) {
            Some(mapped) => mapped.clone(),
            None => {
                let ctx = LogContext::new()
                    .with_scope("global")
                    .with_role(name)
                    .with_phase(Phase::Bindings);
                let Some(role) = self.rebuild_role(role_ref, &ctx)? else {
                    report.skipped += 1;
                    return Ok(());
                };
                let global_ref = role.metadata.name.clone();
                plan.roles.push(role);
                global_ref
            }
        };

        plan.legacy.push(name.to_owned());
        plan.bindings.push(self.global_binding(user, &global_ref));
        Ok(())
    }

    /// Fetch the custom cluster role and rebuild it as a global role. `None`
    /// means the binding is left alone.
    fn rebuild_role(&self, name: &str, ctx: &LogContext) -> Result<Option<Role>> {
        let old: Role = match self.store.get_as(&self.config.api.cluster_roles(), name) {
            Ok(role) => role,
            Err(err) if err.is_not_found() => {
                mig_warn!(context = ctx, "invalid cluster role binding, role '{}' is missing", name);
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        if old.metadata.annotation(&self.config.keys.creator_annotation).is_none() {
            debug!(role = name, "cluster role has no creator, leaving it alone");
            return Ok(None);
        }

        let what = format!("global role templates for {name}");
        let role = self.retry.run(&what, |_| self.aggregate(&old))?;
        Ok(Some(role))
    }

    fn aggregate(&self, old: &Role) -> Result<Role> {
        let keys = &self.config.keys;
        let templates = self.config.api.roles(ScopeKind::Global, None);
        let mut refs = Vec::new();
        let mut rules = Vec::new();
        for (template, required) in &self.config.global_bindings.template_rules {
            if !rules_cover(&old.rules, required) {
                continue;
            }
            let found: Role = self.store.get_as(&templates, template)?;
            rules.extend(found.rules);
            refs.push(template.clone());
        }

        let encoded = encode_aggregation(&refs).map_err(|source| MigrationError::Aggregation {
            role: old.metadata.name.clone(),
            source,
        })?;
        let mut annotations = IndexMap::new();
        annotations.insert(keys.aggregation_annotation.clone(), encoded);
        annotations.insert(
            keys.creator_annotation.clone(),
            old.metadata
                .annotations
                .get(&keys.creator_annotation)
                .cloned()
                .unwrap_or_default(),
        );
        Ok(Role {
            api_version: self.config.api.api_version(ScopeKind::Global),
            kind: ScopeKind::Global.role_kind().to_owned(),
            metadata: ObjectMeta {
                name: old.metadata.name.clone(),
                annotations,
                ..ObjectMeta::default()
            },
            rules,
        })
    }

    fn global_binding(&self, user: &str, role: &str) -> RoleBinding {
        let api = &self.config.api;
        let mut metadata = ObjectMeta::named(format!("{user}-{role}"));
        metadata
            .labels
            .insert(self.config.keys.user_ref_label.clone(), user.to_owned());
        RoleBinding {
            api_version: api.api_version(ScopeKind::Global),
            kind: "GlobalRoleBinding".to_owned(),
            metadata,
            subjects: vec![Subject::user(user, api.rbac_group())],
            role_ref: RoleRef {
                api_group: api.iam_group(),
                kind: ScopeKind::Global.role_kind().to_owned(),
                name: role.to_owned(),
                ..RoleRef::default()
            },
            ..RoleBinding::default()
        }
    }
}

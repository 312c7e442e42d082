//! ---
//! mig_section: "04-role-reconciliation"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Legacy namespaced role-binding conversion."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
//! Legacy namespaced bindings grant a role to a list of subjects. The new
//! model wants one binding per user, labelled with the user it refers to,
//! and custom roles expressed as an aggregation of role templates.
//!
//! The migrator first plans every change (obsolete bindings are deleted while
//! scanning), then updates the rebuilt roles, then writes the per-user
//! bindings with delete-then-create.

use indexmap::IndexMap;
use rolemig_common::{MigrationConfig, ScopeKind};
use rolemig_logging::{mig_info, mig_warn, LogContext, Phase};
use rolemig_store::{
    ObjectMeta, PolicyRule, ResourceStore, Role, RoleBinding, RoleRef, Subject, TypedStore,
};
use tracing::{debug, info};

use crate::codec::encode_aggregation;
use crate::report::BindingsReport;
use crate::retry::RetryPolicy;
use crate::{MigrationError, Result};

fn allows(rule: &PolicyRule, verb: &str, group: &str, resource: &str, names: &[String]) -> bool {
    let has = |items: &[String], wanted: &str| items.iter().any(|i| i == "*" || i == wanted);
    // A rule narrowed to named objects only covers requests for those names.
    let named = rule.resource_names.is_empty()
        || (!names.is_empty() && names.iter().all(|n| rule.resource_names.contains(n)));
    has(&rule.verbs, verb)
        && has(&rule.api_groups, group)
        && has(&rule.resources, resource)
        && named
}

/// Whether `granted` allows every verb, group, and resource combination
/// named by `required`. `*` in a granted rule matches anything; a granted
/// rule with `resourceNames` never covers an unrestricted requirement.
pub fn rules_cover(granted: &[PolicyRule], required: &[PolicyRule]) -> bool {
    required.iter().all(|req| {
        req.verbs.iter().all(|verb| {
            req.api_groups.iter().all(|group| {
                req.resources.iter().all(|resource| {
                    granted
                        .iter()
                        .any(|g| allows(g, verb, group, resource, &req.resource_names))
                })
            })
        })
    })
}

pub(crate) fn qualified(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(namespace) => format!("{namespace}/{name}"),
        None => name.to_owned(),
    }
}

/// Converts legacy role bindings to per-user bindings.
pub struct RoleBindingMigrator<'a> {
    store: &'a dyn ResourceStore,
    config: &'a MigrationConfig,
    retry: RetryPolicy,
}

#[derive(Default)]
struct Plan {
    roles: IndexMap<(Option<String>, String), Role>,
    bindings: Vec<RoleBinding>,
}

impl<'a> RoleBindingMigrator<'a> {
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

    pub fn run(&self) -> Result<BindingsReport> {
        let mut report = BindingsReport::default();
        let legacy: Vec<RoleBinding> = self.store.list_as(&self.config.api.role_bindings(None))?;
        mig_info!(
            context = LogContext::new()
                .with_scope("namespaced")
                .with_phase(Phase::Bindings),
            "inspecting {} role binding(s)",
            legacy.len()
        );

        let mut plan = Plan::default();
        for binding in &legacy {
            self.plan_binding(binding, &mut plan, &mut report)?;
        }

        for ((namespace, name), role) in &plan.roles {
            let namespace = namespace.as_deref();
            let path = self.config.api.roles(ScopeKind::Namespaced, namespace);
            info!(namespace = ?namespace, role = %name, rules = role.rules.len(), "updating migrated role");
            self.store.update_from(&path, name, role)?;
            report.rebuilt_roles.push(qualified(namespace, name));
        }

        for binding in &plan.bindings {
            self.write_binding(binding)?;
            report.converted += 1;
        }
        Ok(report)
    }

    fn plan_binding(
        &self,
        binding: &RoleBinding,
        plan: &mut Plan,
        report: &mut BindingsReport,
    ) -> Result<()> {
        let keys = &self.config.keys;
        let settings = &self.config.bindings;
        let namespace = binding.metadata.namespace.as_deref();
        let name = binding.metadata.name.as_str();
        let path = self.config.api.role_bindings(namespace);
        let ctx = LogContext::new()
            .with_scope("namespaced")
            .with_role(name)
            .with_namespace(namespace)
            .with_phase(Phase::Bindings);

        if binding.metadata.label(&keys.user_ref_label).is_some() {
            debug!(binding = name, namespace = ?namespace, "binding already migrated");
            report.skipped += 1;
            return Ok(());
        }

        if settings.obsolete_bindings.iter().any(|b| b == name) {
            match self.store.delete(&path, name) {
                Ok(()) => {
                    mig_info!(context = ctx, "deleted obsolete role binding");
                    report.deleted_obsolete += 1;
                }
                Err(err) if err.is_not_found() => {
                    debug!(binding = name, path = %path, "obsolete role binding already gone");
                }
                Err(err) => return Err(err.into()),
            }
            return Ok(());
        }

        let role_ref = binding.role_ref.name.as_str();
        if !settings.builtin_roles.iter().any(|r| r == role_ref) {
            let key = (namespace.map(str::to_owned), role_ref.to_owned());
            if !plan.roles.contains_key(&key) {
                let Some(role) = self.rebuild_role(namespace, role_ref, &ctx)? else {
                    report.skipped += 1;
                    return Ok(());
                };
                plan.roles.insert(key, role);
            }
        }

        let rbac_group = self.config.api.rbac_group();
        for subject in binding.subjects.iter().filter(|s| s.is_user()) {
            let mut metadata = ObjectMeta::named(format!("{}-{}", subject.name, role_ref));
            metadata.namespace = namespace.map(str::to_owned);
            metadata
                .labels
                .insert(keys.user_ref_label.clone(), subject.name.clone());
            plan.bindings.push(RoleBinding {
                api_version: self.config.api.api_version(ScopeKind::Namespaced),
                kind: "RoleBinding".to_owned(),
                metadata,
                subjects: vec![Subject::user(subject.name.clone(), rbac_group.clone())],
                role_ref: RoleRef {
                    api_group: rbac_group.clone(),
                    kind: "Role".to_owned(),
                    name: role_ref.to_owned(),
                    ..RoleRef::default()
                },
                ..RoleBinding::default()
            });
        }
        Ok(())
    }

    /// Fetch the legacy role and rebuild it from matching templates. `None`
    /// means the binding is left alone.
    fn rebuild_role(
        &self,
        namespace: Option<&str>,
        name: &str,
        ctx: &LogContext,
    ) -> Result<Option<Role>> {
        let roles = self.config.api.roles(ScopeKind::Namespaced, namespace);
        let old: Role = match self.store.get_as(&roles, name) {
            Ok(role) => role,
            Err(err) if err.is_not_found() => {
                mig_warn!(context = ctx, "binding references missing role '{}', skipping", name);
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        if old.metadata.annotation(&self.config.keys.creator_annotation).is_none() {
            debug!(namespace = ?namespace, role = name, "role has no creator, leaving it alone");
            return Ok(None);
        }

        let what = format!("role templates for {}", qualified(namespace, name));
        let role = self.retry.run(&what, |_| self.aggregate(&old))?;
        Ok(Some(role))
    }

    fn aggregate(&self, old: &Role) -> Result<Role> {
        let keys = &self.config.keys;
        let templates = self
            .config
            .api
            .roles(ScopeKind::Namespaced, old.metadata.namespace.as_deref());
        let mut refs = Vec::new();
        let mut rules = Vec::new();
        for (template, required) in &self.config.bindings.template_rules {
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
        for key in [&keys.creator_annotation, &keys.description_annotation] {
            annotations.insert(
                key.clone(),
                old.metadata.annotations.get(key).cloned().unwrap_or_default(),
            );
        }
        Ok(Role {
            api_version: self.config.api.api_version(ScopeKind::Namespaced),
            kind: ScopeKind::Namespaced.role_kind().to_owned(),
            metadata: ObjectMeta {
                name: old.metadata.name.clone(),
                namespace: old.metadata.namespace.clone(),
                annotations,
                resource_version: old.metadata.resource_version.clone(),
                ..ObjectMeta::default()
            },
            rules,
        })
    }

    fn write_binding(&self, binding: &RoleBinding) -> Result<()> {
        let path = self
            .config
            .api
            .role_bindings(binding.metadata.namespace.as_deref());
        let name = binding.metadata.name.as_str();
        match self.store.delete(&path, name) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }
        match self.store.create_from(&path, binding) {
            Ok(()) => {}
            Err(err) if err.is_already_exists() => {}
            Err(err) => return Err(err.into()),
        }
        info!(binding = name, path = %path, role = %binding.role_ref.name, "wrote per-user role binding");
        Ok(())
    }
}

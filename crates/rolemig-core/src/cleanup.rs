//! ---
//! mig_section: "04-role-reconciliation"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Obsolete global builtin removal."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
use rolemig_common::{ApiPaths, CleanupConfig, ScopeKind};
use rolemig_logging::{log_migration_event, LogContext, MigrationOutcome, Phase};
use rolemig_store::{ResourceStore, RoleBinding, TypedStore};
use tracing::info;

use crate::report::CleanupReport;
use crate::{MigrationError, Result};

/// Moves global bindings off obsolete builtin roles, then deletes those roles.
pub struct BuiltinCleanup<'a> {
    store: &'a dyn ResourceStore,
    api: &'a ApiPaths,
    config: &'a CleanupConfig,
}

impl<'a> BuiltinCleanup<'a> {
    pub fn new(store: &'a dyn ResourceStore, api: &'a ApiPaths, config: &'a CleanupConfig) -> Self {
        Self { store, api, config }
    }

    pub fn run(&self) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        self.repoint_bindings(&mut report)?;
        self.ensure_no_dangling()?;
        self.delete_roles(&mut report)?;
        Ok(report)
    }

    fn is_obsolete(&self, name: &str) -> bool {
        self.config.obsolete_global_roles.iter().any(|r| r == name)
    }

    fn repoint_bindings(&self, report: &mut CleanupReport) -> Result<()> {
        let path = self.api.global_role_bindings();
        let bindings: Vec<RoleBinding> = self.store.list_as(&path)?;
        for mut binding in bindings {
            if !self.is_obsolete(&binding.role_ref.name) {
                continue;
            }
            let name = binding.metadata.name.clone();
            info!(
                binding = %name,
                from = %binding.role_ref.name,
                to = %self.config.fallback_role,
                "repointing global role binding"
            );
            binding.role_ref.name = self.config.fallback_role.clone();
            self.store.update_from(&path, &name, &binding)?;
            report.repointed.push(name);
        }
        Ok(())
    }

    fn ensure_no_dangling(&self) -> Result<()> {
        let bindings: Vec<RoleBinding> = self.store.list_as(&self.api.global_role_bindings())?;
        for role in &self.config.obsolete_global_roles {
            let dangling: Vec<String> = bindings
                .iter()
                .filter(|b| &b.role_ref.name == role)
                .map(|b| b.metadata.name.clone())
                .collect();
            if !dangling.is_empty() {
                return Err(MigrationError::DanglingBindings {
                    role: role.clone(),
                    bindings: dangling,
                });
            }
        }
        Ok(())
    }

    fn delete_roles(&self, report: &mut CleanupReport) -> Result<()> {
        let path = self.api.roles(ScopeKind::Global, None);
        for role in &self.config.obsolete_global_roles {
            let ctx = LogContext::new()
                .with_scope("global")
                .with_role(role)
                .with_phase(Phase::Cleanup);
            match self.store.delete(&path, role) {
                Ok(()) => {
                    log_migration_event(
                        Some(&ctx),
                        "builtin.deleted",
                        "obsolete global role deleted",
                        MigrationOutcome::Applied,
                    );
                    report.deleted.push(role.clone());
                }
                Err(err) if err.is_not_found() => {
                    log_migration_event(
                        Some(&ctx),
                        "builtin.absent",
                        "obsolete global role does not exist, skipping",
                        MigrationOutcome::Skipped,
                    );
                    report.already_absent.push(role.clone());
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

//! ---
//! mig_section: "04-role-reconciliation"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Upgrade task sequencing."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
use rolemig_common::{MigrationConfig, ScopeKind};
use rolemig_logging::{log_migration_event, LogContext, MigrationOutcome};
use rolemig_store::ResourceStore;
use strum::IntoEnumIterator;
use tracing::info;

use crate::bindings::RoleBindingMigrator;
use crate::cleanup::BuiltinCleanup;
use crate::global_bindings::GlobalRoleBindingMigrator;
use crate::report::MigrationReport;
use crate::scope::{ScopeMigrator, ScopeSettings};
use crate::Result;

/// A step of the upgrade that records what it did into the run report.
pub trait UpgradeTask {
    fn name(&self) -> &'static str;

    fn run(&self, report: &mut MigrationReport) -> Result<()>;
}

/// Builtin cleanup followed by the global, workspace, and namespaced scopes.
pub struct RoleMigrateTask<'a> {
    store: &'a dyn ResourceStore,
    config: &'a MigrationConfig,
}

impl<'a> RoleMigrateTask<'a> {
    pub fn new(store: &'a dyn ResourceStore, config: &'a MigrationConfig) -> Self {
        Self { store, config }
    }
}

impl UpgradeTask for RoleMigrateTask<'_> {
    fn name(&self) -> &'static str {
        "role-migrate"
    }

    fn run(&self, report: &mut MigrationReport) -> Result<()> {
        let cleanup = BuiltinCleanup::new(self.store, &self.config.api, &self.config.cleanup).run()?;
        report.cleanup = Some(cleanup);

        for kind in ScopeKind::iter() {
            let settings = ScopeSettings::from_config(self.config, kind);
            let scope = ScopeMigrator::new(self.store, settings, &self.config.keys).run()?;
            info!(
                scope = %kind,
                recreated = scope.recreated(),
                visited = scope.records.len(),
                "scope migrated"
            );
            report.scopes.push(scope);
        }
        Ok(())
    }
}

/// Legacy cluster role binding conversion as an upgrade step.
pub struct GlobalRoleBindingMigrateTask<'a> {
    store: &'a dyn ResourceStore,
    config: &'a MigrationConfig,
}

impl<'a> GlobalRoleBindingMigrateTask<'a> {
    pub fn new(store: &'a dyn ResourceStore, config: &'a MigrationConfig) -> Self {
        Self { store, config }
    }
}

impl UpgradeTask for GlobalRoleBindingMigrateTask<'_> {
    fn name(&self) -> &'static str {
        "globalrolebinding-migrate"
    }

    fn run(&self, report: &mut MigrationReport) -> Result<()> {
        let converted = GlobalRoleBindingMigrator::new(self.store, self.config).run()?;
        report.global_bindings = Some(converted);
        Ok(())
    }
}

/// Legacy namespaced binding conversion as an upgrade step.
pub struct RoleBindingMigrateTask<'a> {
    store: &'a dyn ResourceStore,
    config: &'a MigrationConfig,
}

impl<'a> RoleBindingMigrateTask<'a> {
    pub fn new(store: &'a dyn ResourceStore, config: &'a MigrationConfig) -> Self {
        Self { store, config }
    }
}

impl UpgradeTask for RoleBindingMigrateTask<'_> {
    fn name(&self) -> &'static str {
        "rolebinding-migrate"
    }

    fn run(&self, report: &mut MigrationReport) -> Result<()> {
        report.bindings = Some(RoleBindingMigrator::new(self.store, self.config).run()?);
        Ok(())
    }
}

/// Switches for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Convert legacy cluster and namespaced bindings before migrating roles,
    /// in addition to `bindings.enabled` in the configuration.
    pub with_bindings: bool,
    /// Recorded in the report; the caller decides not to persist the result.
    pub dry_run: bool,
}

/// Run every enabled task against `store` in order. The first failure aborts
/// the run; writes made before it stay in place.
pub fn migrate(
    store: &dyn ResourceStore,
    config: &MigrationConfig,
    options: RunOptions,
) -> Result<MigrationReport> {
    let mut tasks: Vec<Box<dyn UpgradeTask + '_>> = Vec::new();
    if options.with_bindings || config.bindings.enabled {
        tasks.push(Box::new(GlobalRoleBindingMigrateTask::new(store, config)));
        tasks.push(Box::new(RoleBindingMigrateTask::new(store, config)));
    }
    tasks.push(Box::new(RoleMigrateTask::new(store, config)));

    let mut report = MigrationReport::start(options.dry_run);
    for task in &tasks {
        let ctx = LogContext::new().with_role(task.name());
        if let Err(err) = task.run(&mut report) {
            log_migration_event(
                Some(&ctx),
                "task.failed",
                &err.to_string(),
                MigrationOutcome::Fault,
            );
            return Err(err);
        }
        log_migration_event(
            Some(&ctx),
            "task.completed",
            "upgrade task completed",
            MigrationOutcome::Applied,
        );
    }
    report.finish();
    Ok(report)
}

//! ---
//! mig_section: "04-role-reconciliation"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Role aggregation reconciliation engine."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
//! Role aggregation reconciliation engine.
//!
//! Custom roles reference role templates through an aggregation annotation.
//! The engine trims deprecated references, re-resolves the permission rules
//! of the surviving templates, and replaces each affected role in place. It
//! runs once per upgrade against a [`rolemig_store::ResourceStore`].

pub mod bindings;
pub mod cleanup;
pub mod codec;
pub mod filter;
pub mod global_bindings;
pub mod predicate;
pub mod recreator;
pub mod report;
pub mod resolver;
pub mod retry;
pub mod scope;
pub mod task;

use rolemig_store::StoreError;

pub use bindings::{rules_cover, RoleBindingMigrator};
pub use cleanup::BuiltinCleanup;
pub use codec::{decode_aggregation, encode_aggregation, CodecError};
pub use filter::filter_deprecated;
pub use global_bindings::GlobalRoleBindingMigrator;
pub use predicate::is_custom_role;
pub use recreator::RoleRecreator;
pub use report::{
    BindingsReport, CleanupReport, GlobalBindingsReport, MigrationReport, RoleOutcome,
    RoleRecord, ScopeReport, SkipReason,
};
pub use resolver::{Resolution, RuleResolver};
pub use retry::RetryPolicy;
pub use scope::{ScopeMigrator, ScopeSettings};
pub use task::{
    migrate, GlobalRoleBindingMigrateTask, RoleBindingMigrateTask, RoleMigrateTask, RunOptions,
    UpgradeTask,
};

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Fatal errors that abort a migration run.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// A store call failed in a way that is not tolerated at that point.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A role's aggregation annotation could not be read or rewritten.
    #[error("aggregation annotation of role '{role}': {source}")]
    Aggregation {
        /// Role whose annotation was rejected.
        role: String,
        /// Underlying codec failure.
        #[source]
        source: CodecError,
    },
    /// Bindings still point at a builtin role that is about to be deleted.
    #[error("bindings {bindings:?} still reference obsolete role '{role}'")]
    DanglingBindings {
        /// Obsolete role name.
        role: String,
        /// Bindings that were not repointed.
        bindings: Vec<String>,
    },
    /// A dependency never appeared within the retry budget.
    #[error("{what} still missing after {attempts} attempts")]
    RetryExhausted {
        /// Description of what was awaited.
        what: String,
        /// Attempts made.
        attempts: u32,
    },
}

impl MigrationError {
    /// Whether the underlying cause is a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MigrationError::Store(err) if err.is_not_found())
    }
}

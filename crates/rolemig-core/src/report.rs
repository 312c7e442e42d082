//! ---
//! mig_section: "04-role-reconciliation"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Migration run report."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use rolemig_common::ScopeKind;
use serde::Serialize;
use strum::Display;

/// Why a role was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SkipReason {
    /// Template, builtin, or no aggregation annotation.
    NotCustom,
    /// No deprecated reference to remove.
    Unchanged,
}

/// Terminal state of one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RoleOutcome {
    Skipped {
        reason: SkipReason,
    },
    Recreated {
        /// Number of deprecated references dropped.
        removed: usize,
        /// Surviving references, in order.
        kept: Vec<String>,
        /// Surviving references whose template was absent.
        missing_templates: Vec<String>,
    },
}

/// One visited role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub outcome: RoleOutcome,
}

/// Result of one scope migrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeReport {
    pub scope: ScopeKind,
    pub records: Vec<RoleRecord>,
}

impl ScopeReport {
    pub fn new(scope: ScopeKind) -> Self {
        Self {
            scope,
            records: Vec::new(),
        }
    }

    pub fn recreated(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, RoleOutcome::Recreated { .. }))
            .count()
    }

    pub fn skipped(&self, reason: SkipReason) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome == RoleOutcome::Skipped { reason })
            .count()
    }

    /// Look up the record of a role by name and namespace.
    pub fn record(&self, name: &str, namespace: Option<&str>) -> Option<&RoleRecord> {
        self.records
            .iter()
            .find(|r| r.name == name && r.namespace.as_deref() == namespace)
    }
}

/// Builtin cleanup counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Global bindings moved to the fallback role.
    pub repointed: Vec<String>,
    /// Obsolete roles removed.
    pub deleted: Vec<String>,
    /// Obsolete roles that were already gone.
    pub already_absent: Vec<String>,
}

/// Legacy binding conversion counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BindingsReport {
    pub deleted_obsolete: usize,
    pub converted: usize,
    /// `namespace/name` of rebuilt roles.
    pub rebuilt_roles: Vec<String>,
    pub skipped: usize,
}

/// Legacy cluster role binding conversion counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GlobalBindingsReport {
    pub converted: usize,
    /// Global roles rebuilt from custom cluster roles.
    pub created_roles: Vec<String>,
    /// Cluster role bindings removed after conversion.
    pub deleted_legacy: Vec<String>,
    pub skipped: usize,
}

/// Everything a run did, in order.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_bindings: Option<GlobalBindingsReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bindings: Option<BindingsReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupReport>,
    pub scopes: Vec<ScopeReport>,
}

impl MigrationReport {
    pub fn start(dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            global_bindings: None,
            bindings: None,
            cleanup: None,
            scopes: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn scope(&self, kind: ScopeKind) -> Option<&ScopeReport> {
        self.scopes.iter().find(|s| s.scope == kind)
    }

    /// Roles recreated across all scopes.
    pub fn recreated(&self) -> usize {
        self.scopes.iter().map(ScopeReport::recreated).sum()
    }

    /// One-line summary for the CLI.
    pub fn summary(&self) -> String {
        let per_scope = self
            .scopes
            .iter()
            .map(|s| format!("{}={}", s.scope, s.recreated()))
            .collect::<Vec<_>>()
            .join(" ");
        let cleanup = self.cleanup.as_ref().map_or(0, |c| c.repointed.len());
        format!(
            "recreated {} role(s) [{}], repointed {} binding(s)",
            self.recreated(),
            per_scope,
            cleanup
        )
    }
}

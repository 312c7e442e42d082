//! ---
//! mig_section: "03-logging"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Structured logging helpers for migration runs."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
#![warn(missing_docs)]

use strum::{Display, IntoStaticStr};
use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Initialize a baseline tracing subscriber for tools and tests.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Phase of the per-role pipeline a log event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Phase {
    /// Deleting obsolete builtins and repointing bindings.
    Cleanup,
    /// Deciding whether a role is custom and needs trimming.
    Inspect,
    /// Fetching template rules.
    Resolve,
    /// Delete-then-create of a role.
    Recreate,
    /// Legacy binding conversion.
    Bindings,
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Scope being migrated (`global`, `workspace`, `namespaced`).
    pub scope: Option<&'a str>,
    /// Role or binding name.
    pub role: Option<&'a str>,
    /// Namespace of the object, when namespaced.
    pub namespace: Option<&'a str>,
    /// Pipeline phase.
    pub phase: Option<Phase>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a scope name.
    pub fn with_scope(mut self, scope: &'a str) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Attach a role name.
    pub fn with_role(mut self, role: &'a str) -> Self {
        self.role = Some(role);
        self
    }

    /// Attach a namespace; `None` leaves the field empty.
    pub fn with_namespace(mut self, namespace: Option<&'a str>) -> Self {
        self.namespace = namespace;
        self
    }

    /// Attach a pipeline phase.
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Phase rendered as a field value.
    pub fn phase_str(&self) -> &'static str {
        self.phase.map(<&'static str>::from).unwrap_or("")
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The step completed and wrote changes.
    Applied,
    /// The step had nothing to do.
    Skipped,
    /// The step failed and the run aborts.
    Fault,
}

impl MigrationOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            MigrationOutcome::Applied => "applied",
            MigrationOutcome::Skipped => "skipped",
            MigrationOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized migration event with an outcome.
pub fn log_migration_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: MigrationOutcome,
) {
    let default_ctx = LogContext::default();
    let ctx = context.unwrap_or(&default_ctx);
    let fields = (
        ctx.scope.unwrap_or(""),
        ctx.role.unwrap_or(""),
        ctx.namespace.unwrap_or(""),
        ctx.phase_str(),
    );
    // `tracing::event!` needs a constant level, so dispatch explicitly.
    match outcome {
        MigrationOutcome::Fault => tracing::error!(
            event,
            outcome = outcome.as_str(),
            scope = fields.0,
            role = fields.1,
            namespace = fields.2,
            phase = fields.3,
            message = %message
        ),
        MigrationOutcome::Skipped => tracing::debug!(
            event,
            outcome = outcome.as_str(),
            scope = fields.0,
            role = fields.1,
            namespace = fields.2,
            phase = fields.3,
            message = %message
        ),
        MigrationOutcome::Applied => tracing::info!(
            event,
            outcome = outcome.as_str(),
            scope = fields.0,
            role = fields.1,
            namespace = fields.2,
            phase = fields.3,
            message = %message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_emit_without_panic() {
        init();
        let ctx = LogContext::new()
            .with_scope("global")
            .with_role("auditor")
            .with_phase(Phase::Inspect);
        mig_info!(context = ctx.clone(), "role inspected");
        mig_debug!("debug message");
        mig_warn!(context = ctx.clone(), "template {} missing", "view-users");
        mig_error!(context = ctx, "error code: {}", 42);
    }

    #[test]
    fn phase_renders_kebab_case() {
        assert_eq!(Phase::Recreate.to_string(), "recreate");
        assert_eq!(
            LogContext::new().with_phase(Phase::Bindings).phase_str(),
            "bindings"
        );
        assert_eq!(
            LogContext::new().with_phase(Phase::Cleanup).phase_str(),
            "cleanup"
        );
        assert_eq!(LogContext::new().phase_str(), "");
    }

    #[test]
    fn migration_event_helper_emits() {
        init();
        let ctx = LogContext::new()
            .with_scope("namespaced")
            .with_namespace(Some("dev"));
        log_migration_event(
            Some(&ctx),
            "role.recreated",
            "role recreated",
            MigrationOutcome::Applied,
        );
        log_migration_event(None, "role.skipped", "nothing to do", MigrationOutcome::Skipped);
        log_migration_event(None, "run.aborted", "store failure", MigrationOutcome::Fault);
    }
}

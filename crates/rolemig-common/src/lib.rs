//! ---
//! mig_section: "01-core-functionality"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Shared configuration and logging primitives."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
//! Shared primitives for the rolemig workspace: the migration tables loaded
//! from TOML and the tracing bootstrap used by the binaries.

pub mod config;
pub mod logging;

pub use config::{
    ApiPaths, BindingsConfig, BuiltinMatch, CleanupConfig, GlobalBindingsConfig, LoadedConfig,
    LoggingConfig, MetadataKeys, MigrationConfig, RetryConfig, ScopeConfig, ScopeKind,
    ScopeTables,
};
pub use logging::{init_tracing, LogFormat};

/// Version string of the workspace, embedded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

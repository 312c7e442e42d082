//! ---
//! mig_section: "05-admin-interface"
//! mig_subsection: "binary"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Administrative CLI for one-shot role migrations."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use rolemig_common::init_tracing;
use rolemig_core::{migrate, MigrationReport, RunOptions};
use rolemig_logging::{log_migration_event, MigrationOutcome};
use rolemig_store::{load_snapshot, save_snapshot, MemoryStore};
use tracing::info;

use crate::load_config;

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Snapshot file holding the resource collections (JSON, or YAML by extension).
    #[arg(long, value_name = "FILE")]
    snapshot: PathBuf,

    /// Where to write the migrated snapshot (defaults to rewriting --snapshot).
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Migration configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Convert legacy cluster and namespaced role bindings before migrating roles.
    #[arg(long = "with-bindings", action = clap::ArgAction::SetTrue)]
    with_bindings: bool,

    /// Run against the snapshot without writing any file except the report.
    #[arg(long = "dry-run", action = clap::ArgAction::SetTrue)]
    dry_run: bool,

    /// Write the run report as JSON.
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

pub fn run(args: MigrateArgs) -> Result<()> {
    let loaded = load_config(args.config.as_ref())?;
    init_tracing("rolemigctl", &loaded.config.logging)?;
    if let Some(source) = &loaded.source {
        info!(config = %source.display(), "configuration loaded");
    }

    let document = load_snapshot(&args.snapshot)?;
    let store = MemoryStore::from_snapshot(&document)
        .with_context(|| format!("snapshot {} is not loadable", args.snapshot.display()))?;
    info!(
        snapshot = %args.snapshot.display(),
        objects = store.len(),
        "snapshot loaded"
    );

    let options = RunOptions {
        with_bindings: args.with_bindings,
        dry_run: args.dry_run,
    };
    let report = migrate(&store, &loaded.config, options).context("migration aborted")?;

    if args.dry_run {
        log_migration_event(
            None,
            "snapshot.unchanged",
            "dry run, snapshot not written",
            MigrationOutcome::Skipped,
        );
    } else {
        let target = args.output.as_ref().unwrap_or(&args.snapshot);
        save_snapshot(&store.export(), target)?;
        log_migration_event(
            None,
            "snapshot.written",
            &format!("{} write(s) persisted to {}", store.write_count(), target.display()),
            MigrationOutcome::Applied,
        );
    }

    if let Some(path) = &args.report {
        write_report(path, &report)?;
    }
    println!("{}", report.summary());
    Ok(())
}

fn write_report(path: &Path, report: &MigrationReport) -> Result<()> {
    let rendered = serde_json::to_string_pretty(report).context("failed to render report")?;
    fs::write(path, rendered)
        .with_context(|| format!("unable to write report {}", path.display()))
}

//! ---
//! mig_section: "05-admin-interface"
//! mig_subsection: "binary"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Administrative CLI for one-shot role migrations."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use rolemig_common::{LoadedConfig, MigrationConfig};

mod config_cmd;
mod migrate;

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "Role aggregation migration utility",
    long_about = None
)]
struct Cli {
    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print version information and exit"
    )]
    version: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Migrate roles in a snapshot file")]
    Migrate(migrate::MigrateArgs),
    #[command(subcommand, about = "Inspect the effective migration configuration")]
    Config(config_cmd::ConfigCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("rolemigctl {}", rolemig_common::version());
        return Ok(());
    }
    match cli.command {
        Some(Commands::Migrate(args)) => migrate::run(args)?,
        Some(Commands::Config(cmd)) => config_cmd::run(cmd)?,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
        }
    }
    Ok(())
}

/// Resolve configuration: an explicit file wins, then `ROLEMIG_CONFIG`, then
/// the conventional locations, then built-in defaults.
pub(crate) fn load_config(explicit: Option<&PathBuf>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        return Ok(LoadedConfig {
            config: MigrationConfig::from_path(path)?,
            source: Some(path.clone()),
        });
    }
    MigrationConfig::load_with_source(&[
        PathBuf::from("configs/rolemig.toml"),
        PathBuf::from("/etc/rolemig/rolemig.toml"),
    ])
}

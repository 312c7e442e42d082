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
use clap::{Args, Subcommand};
use rolemig_logging as logging;

use crate::load_config;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML.
    Show(ConfigOptions),
    /// Load and validate the configuration.
    Validate(ConfigOptions),
}

#[derive(Debug, Args)]
pub struct ConfigOptions {
    /// Configuration file to read instead of the default locations.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    logging::init();
    match command {
        ConfigCommand::Show(options) => {
            let loaded = load_config(options.config.as_ref())?;
            print!("{}", loaded.config.to_toml_string()?);
        }
        ConfigCommand::Validate(options) => {
            let loaded = load_config(options.config.as_ref())?;
            loaded.config.validate()?;
            match &loaded.source {
                Some(path) => println!("configuration valid: {}", path.display()),
                None => println!("configuration valid: built-in defaults"),
            }
        }
    }
    Ok(())
}

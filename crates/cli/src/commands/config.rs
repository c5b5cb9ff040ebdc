//! Config Commands

use std::path::PathBuf;

use anyhow::{bail, Result};
use careflow_e2e::RunConfig;
use clap::Subcommand;

use super::{ConfigSource, REDACTED};
use crate::output::{print_success, print_value, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a default configuration file
    Init {
        /// Destination (defaults to the global --config path)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration after overrides
    Show,
}

pub fn execute(cmd: ConfigCommands, source: &ConfigSource, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Init { path, force } => {
            let path = path.unwrap_or_else(|| source.path.clone());
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            RunConfig::default().save(&path)?;
            print_success(&format!("Wrote {}", path.display()));
        }

        ConfigCommands::Show => {
            let mut config = source.load()?;
            if !config.admin.password.is_empty() {
                config.admin.password = REDACTED.to_string();
            }
            print_value(&config, format)?;
        }
    }
    Ok(())
}

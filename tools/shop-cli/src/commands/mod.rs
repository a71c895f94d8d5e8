//! CLI command implementations.

pub mod audit;
pub mod config;
pub mod serve;
pub mod sweep;

use clap::{Args, Subcommand};

/// Arguments for the serve command.
#[derive(Args)]
pub struct ServeArgs {
    /// redb store file (overrides `store.path`).
    #[arg(short, long)]
    pub db: Option<String>,
}

/// Arguments for the sweep command.
#[derive(Args)]
pub struct SweepArgs {
    /// redb store file to sweep (overrides `store.path`).
    #[arg(short, long)]
    pub db: Option<String>,

    /// Report what would be released without writing anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the audit command.
#[derive(Args)]
pub struct AuditArgs {
    /// redb store file to audit (overrides `store.path`).
    #[arg(short, long)]
    pub db: Option<String>,

    /// Only list variants with held units or violations.
    #[arg(long)]
    pub held_only: bool,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,
    /// Initialize a new config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate the config file.
    Validate,
}

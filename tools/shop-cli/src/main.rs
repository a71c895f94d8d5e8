//! Shop CLI - operator tool for the TurboCommerce reservation core.
//!
//! Commands:
//! - `shop serve` - Run the reservation sweeper until Ctrl-C
//! - `shop sweep` - Release expired reservations once
//! - `shop audit` - Check the stock ledger against the carts
//! - `shop config` - Manage configuration

mod commands;
mod context;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{AuditArgs, ConfigArgs, ServeArgs, SweepArgs};

/// Shop CLI - Operate the stock reservation and checkout core
#[derive(Parser)]
#[command(name = "shop")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reservation sweeper against the store
    Serve(ServeArgs),

    /// Release expired reservations once
    Sweep(SweepArgs),

    /// Check reservation counters against cart lines
    Audit(AuditArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let output = output::Output::new(cli.verbose, cli.json);
    let ctx = context::Context::load(cli.config.as_deref(), output)?;

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::run(args, &ctx).await,
        Commands::Sweep(args) => commands::sweep::run(args, &ctx).await,
        Commands::Audit(args) => commands::audit::run(args, &ctx).await,
        Commands::Config(args) => commands::config::run(args, &ctx).await,
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

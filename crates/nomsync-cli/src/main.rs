//! nomsync CLI - Command-line interface for nomsync
//!
//! Provides commands for:
//! - Reconciling a submission batch against the planner
//! - Rebuilding the local candidate cache
//! - Viewing cache status
//! - Managing configuration and the planner endpoint

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    completions::CompletionsCommand, config::ConfigCommand, reload::ReloadCommand,
    status::StatusCommand, sync::SyncCommand, AppContext,
};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(
    name = "nomsync",
    version,
    about = "Keep a nomination planner in step with the review platform"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Reconcile a submission batch file with the planner
    Sync(SyncCommand),
    /// Rebuild the candidate cache from the planner
    Reload(ReloadCommand),
    /// Show cache and endpoint status
    Status(StatusCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

/// Filter directive: `-v` flags win over the configured level
fn log_filter(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let ctx = AppContext::load(cli.config.as_deref());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose, &ctx.config.logging.level)));

    // Diagnostics go to stderr so --json output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = OutputFormat::from_flags(cli.json, cli.quiet);

    let result = match &cli.command {
        Commands::Sync(cmd) => cmd.execute(&ctx, format).await,
        Commands::Reload(cmd) => cmd.execute(&ctx, format).await,
        Commands::Status(cmd) => cmd.execute(&ctx, format).await,
        Commands::Config(cmd) => cmd.execute(&ctx, format).await,
        Commands::Completions(cmd) => cmd.execute(),
    };

    if let Err(e) = result {
        get_formatter(format).error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

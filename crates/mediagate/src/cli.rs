//! Exposes the command line application.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use mediagate_service::caching;
use mediagate_service::config::Config;

use crate::logging;
use crate::server;

/// Mediagate commands.
#[derive(Subcommand)]
enum Command {
    /// Run the web server.
    Run,

    /// Remove expired files from the media cache.
    Cleanup {
        /// Only report what would be removed.
        #[arg(long)]
        dry_run: bool,
    },
}

/// Command line interface parser.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long = "config", short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config.as_deref()).context("failed loading config")?;

    logging::init_logging(&config);

    match cli.command {
        Command::Run => server::run(config).context("failed to start the server")?,
        Command::Cleanup { dry_run } => {
            caching::cleanup(&config, dry_run).context("failed to clean up the cache")?
        }
    }

    Ok(())
}

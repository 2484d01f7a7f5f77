//! Magic 8-Ball CLI entry point

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use eightball_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig, error::Result};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config_path = cli.config.as_ref().map(PathBuf::from);
    let overrides = cli.command.overrides();
    let config = match AppConfig::load_with_overrides(config_path.as_deref(), &overrides) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = CommandDispatcher::execute(cli.command, config, config_path.as_deref()).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    info!("8-Ball CLI exited successfully");
    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

use anyhow::Result;
use clap::Parser;
use reelhaul::{
    app::config::Config,
    cli::{self, Cli},
};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first to get verbose flag
    let cli = Cli::parse();

    // Set config directory override before anything resolves a path
    if let Some(ref config_dir) = cli.config {
        reelhaul::util::paths::set_config_dir_override(Some(config_dir.clone()));
    }

    // Get logs directory (creates if needed)
    let logs_dir = reelhaul::util::paths::get_logs_dir().unwrap_or_else(|_| PathBuf::from("."));
    std::fs::create_dir_all(&logs_dir).ok();

    // Set up daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "app.jsonl");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let log_level = if cli.verbose {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };

    // JSON format for structured logs
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(tracing_subscriber::filter::LevelFilter::from_level(log_level)),
        )
        .init();

    tracing::info!("Starting reelhaul {}", env!("CARGO_PKG_VERSION"));
    if let Some(ref config_dir) = cli.config {
        tracing::info!("Using config directory override: {:?}", config_dir);
    }
    tracing::trace!("CLI arguments: {:?}", cli);

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(cli::error::INVALID_INPUT);
        }
    };
    tracing::debug!(
        "Configuration: parallelism={}, retry_count={}, library_root={:?}",
        config.download.parallelism,
        config.download.retry_count,
        config.general.library_root
    );

    let exit_code = cli::handler::handle_command(cli.command, config).await;

    // Flush logs before exiting
    drop(_guard);
    std::process::exit(exit_code);
}

//! drover daemon entry point.
//!
//! Usage:
//!     drover --config /path/to/drover.toml

use clap::Parser;
use drover::config::{default_config_path, Settings};
use drover::runtime::Daemon;
use drover_logging::LogConfig;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "drover", about = "Capture-record harvester and retention daemon")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, env = "DROVER_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose console logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = drover_logging::init_logging(LogConfig {
        app_name: "drover",
        verbose: args.verbose,
    })?;

    let config_path = args.config.unwrap_or_else(default_config_path);
    info!("loading configuration from {}", config_path.display());
    let settings = Settings::load(&config_path)?;
    info!("  source: {}", settings.source.display());
    info!("  output: {}", settings.output.display());
    info!(
        "  interval: {}s, hold: {} days, workers: {}",
        settings.interval_secs, settings.hold_days, settings.max_workers
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    Daemon::new(settings).run(shutdown_rx).await;
    Ok(())
}

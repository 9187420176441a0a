//! Scanner entry point: connects to the in-cluster API, then runs the
//! startup sweep and real-time watches forever. Rust analogue of
//! `original_source/security-scanner/main.py`.

mod client;
mod exclusions;
mod rules;
mod scanner;
mod watch;
mod ws_client;

use kure_core::config::{init_tracing, ScannerConfig, EXIT_STARTUP_ERROR};
use tracing::info;

use crate::scanner::ScannerEngine;

#[tokio::main]
async fn main() {
    init_tracing("kure_scanner=info");

    if let Err(e) = run().await {
        tracing::error!(error = ?e, "scanner_startup_failed");
        std::process::exit(EXIT_STARTUP_ERROR);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ScannerConfig::from_env();
    info!(backend_url = %config.backend_url, "scanner_starting");

    let client = kube::Client::try_default().await?;
    let engine = ScannerEngine::new(client, config.backend_url);

    engine.start_scanning().await?;

    info!("scanner_stopped");
    Ok(())
}

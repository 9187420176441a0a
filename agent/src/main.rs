//! Agent entry point: polls the cluster for failed pods and, if enabled,
//! periodically reports cluster-wide resource metrics. Rust analogue of
//! `original_source/agent/main.py`.

mod backend_client;
mod data_collector;
mod metrics_collector;
mod pod_monitor;

use std::sync::Arc;
use std::time::Duration;

use kure_core::config::{init_tracing, AgentConfig, EXIT_STARTUP_ERROR};
use tracing::{error, info, warn};

use crate::backend_client::BackendClient;
use crate::pod_monitor::PodMonitor;

const METRICS_REPORT_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    init_tracing("kure_agent=info");

    if let Err(e) = run().await {
        error!(error = ?e, "agent_startup_failed");
        std::process::exit(EXIT_STARTUP_ERROR);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = AgentConfig::from_env();
    info!(backend_url = %config.backend_url, check_interval_secs = config.check_interval_secs, "agent_starting");

    let client = kube::Client::try_default().await?;
    let backend = Arc::new(BackendClient::new(&config.backend_url));

    let monitor = PodMonitor::new(client.clone(), backend.clone(), Duration::from_secs(config.check_interval_secs));

    let monitor_task = monitor.start_monitoring();

    if config.cluster_metrics_enabled {
        let metrics_client = client.clone();
        let metrics_backend = backend.clone();
        let metrics_task = async move {
            let mut ticker = tokio::time::interval(METRICS_REPORT_INTERVAL);
            loop {
                ticker.tick().await;
                match metrics_collector::collect_cluster_metrics(&metrics_client).await {
                    Ok(metrics) => {
                        metrics_backend.report_cluster_metrics(&metrics).await;
                    }
                    Err(e) => warn!(error = %e, "cluster_metrics_collection_failed"),
                }
            }
        };

        tokio::select! {
            _ = monitor_task => {},
            _ = metrics_task => {},
            _ = tokio::signal::ctrl_c() => {},
        }
    } else {
        tokio::select! {
            _ = monitor_task => {},
            _ = tokio::signal::ctrl_c() => {},
        }
    }

    info!("agent_stopped");
    Ok(())
}

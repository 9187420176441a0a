//! HTTP client to the backend, ported from
//! `original_source/agent/clients/backend_client.py`. Like the scanner's
//! client, every method swallows its own errors and logs instead of
//! propagating — a single failed report must not stop the monitoring loop.

use std::time::Duration;

use kure_core::models::{ClusterMetrics, PodFailureCreate};
use reqwest::Client as HttpClient;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct BackendClient {
    backend_url: String,
    http: HttpClient,
}

impl BackendClient {
    pub fn new(backend_url: &str) -> Self {
        BackendClient {
            backend_url: backend_url.trim_end_matches('/').to_string(),
            http: HttpClient::new(),
        }
    }

    pub async fn report_failed_pod(&self, pod: &PodFailureCreate) -> bool {
        let identifier = format!("{}/{}", pod.namespace, pod.pod_name);
        let url = format!("{}/api/pods/failed", self.backend_url);

        match self
            .http
            .post(&url)
            .json(pod)
            .timeout(Duration::from_secs(30))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                info!(pod = %identifier, "failed_pod_reported");
                true
            }
            Ok(resp) => {
                error!(pod = %identifier, status = %resp.status(), "failed_pod_report_rejected");
                false
            }
            Err(e) => {
                error!(pod = %identifier, error = %e, "failed_pod_report_failed");
                false
            }
        }
    }

    pub async fn dismiss_deleted_pod(&self, namespace: &str, pod_name: &str) -> bool {
        let identifier = format!("{namespace}/{pod_name}");
        let url = format!("{}/api/pods/dismiss-deleted", self.backend_url);

        match self
            .http
            .post(&url)
            .json(&serde_json::json!({ "namespace": namespace, "pod_name": pod_name }))
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                info!(pod = %identifier, "dismissed_deleted_pod");
                true
            }
            Ok(resp) => {
                warn!(pod = %identifier, status = %resp.status(), "dismiss_deleted_pod_rejected");
                false
            }
            Err(e) => {
                warn!(pod = %identifier, error = %e, "dismiss_deleted_pod_failed");
                false
            }
        }
    }

    pub async fn report_cluster_metrics(&self, metrics: &ClusterMetrics) -> bool {
        let url = format!("{}/api/metrics/cluster", self.backend_url);
        match self
            .http
            .post(&url)
            .json(metrics)
            .timeout(Duration::from_secs(15))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                info!("cluster_metrics_reported");
                true
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "cluster_metrics_report_rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "cluster_metrics_report_failed");
                false
            }
        }
    }
}

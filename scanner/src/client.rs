//! HTTP client to the backend, ported from
//! `original_source/security-scanner/services/backend_client.py`. Every
//! method swallows its own errors and logs instead of propagating, since a
//! single failed report must never crash the scan loop — a backend 5xx
//! simply drops the finding until the next watch event.

use std::time::Duration;

use kure_core::models::{ExcludedNamespace, ExcludedRule, SecurityFindingCreate, TrustedRegistry};
use reqwest::Client as HttpClient;
use tracing::{debug, info, warn};

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

    pub async fn report_security_finding(&self, finding: &SecurityFindingCreate) -> bool {
        let identifier = format!("{}/{}/{}", finding.resource_type, finding.namespace, finding.resource_name);
        let url = format!("{}/api/security/findings", self.backend_url);

        match self
            .http
            .post(&url)
            .json(finding)
            .timeout(Duration::from_secs(30))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                info!(resource = %identifier, "finding_reported");
                true
            }
            Ok(resp) => {
                warn!(resource = %identifier, status = %resp.status(), "finding_report_rejected");
                false
            }
            Err(e) => {
                warn!(resource = %identifier, error = %e, "finding_report_failed");
                false
            }
        }
    }

    pub async fn clear_security_findings(&self) -> bool {
        let url = format!("{}/api/security/scan/clear", self.backend_url);
        match self.http.post(&url).timeout(Duration::from_secs(10)).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("cleared_previous_security_findings");
                true
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "clear_findings_rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "clear_findings_failed");
                false
            }
        }
    }

    pub async fn delete_findings_by_resource(&self, resource_type: &str, namespace: &str, resource_name: &str) -> bool {
        let identifier = format!("{resource_type}/{namespace}/{resource_name}");
        let url = format!("{}/api/security/findings/resource/{resource_type}/{namespace}/{resource_name}", self.backend_url);

        match self.http.delete(&url).timeout(Duration::from_secs(10)).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(resource = %identifier, "deleted_findings_for_resource");
                true
            }
            Ok(resp) => {
                warn!(resource = %identifier, status = %resp.status(), "delete_findings_rejected");
                false
            }
            Err(e) => {
                warn!(resource = %identifier, error = %e, "delete_findings_failed");
                false
            }
        }
    }

    pub async fn report_scan_duration(&self, duration_seconds: f64) -> bool {
        let url = format!("{}/api/metrics/security-scan-duration", self.backend_url);
        match self
            .http
            .post(&url)
            .json(&serde_json::json!({ "seconds": duration_seconds }))
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                info!(seconds = duration_seconds, "reported_scan_duration");
                true
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "report_scan_duration_rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "report_scan_duration_failed");
                false
            }
        }
    }

    /// Brackets a trusted-registry rescan with `started`/`completed` so the
    /// UI can show progress while every pod is re-checked.
    pub async fn report_rescan_status(&self, status: &str) -> bool {
        let url = format!("{}/api/security/rescan-status", self.backend_url);
        match self
            .http
            .post(&url)
            .json(&serde_json::json!({ "status": status }))
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                info!(status, "reported_rescan_status");
                true
            }
            Ok(resp) => {
                warn!(status = %resp.status(), rescan_status = status, "report_rescan_status_rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, rescan_status = status, "report_rescan_status_failed");
                false
            }
        }
    }

    pub async fn get_excluded_namespaces(&self) -> anyhow::Result<Vec<String>> {
        let url = format!("{}/api/admin/excluded-namespaces", self.backend_url);
        let resp = self.http.get(&url).timeout(Duration::from_secs(10)).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("backend returned HTTP {} for excluded namespaces", resp.status());
        }
        let rows: Vec<ExcludedNamespace> = resp.json().await?;
        Ok(rows.into_iter().map(|r| r.namespace).collect())
    }

    pub async fn get_excluded_rules(&self) -> anyhow::Result<Vec<ExcludedRule>> {
        let url = format!("{}/api/admin/excluded-rules", self.backend_url);
        let resp = self.http.get(&url).timeout(Duration::from_secs(10)).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("backend returned HTTP {} for excluded rules", resp.status());
        }
        Ok(resp.json().await?)
    }

    pub async fn get_trusted_registries(&self) -> anyhow::Result<Vec<String>> {
        let url = format!("{}/api/admin/trusted-registries", self.backend_url);
        let resp = self.http.get(&url).timeout(Duration::from_secs(10)).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("backend returned HTTP {} for trusted registries", resp.status());
        }
        let rows: Vec<TrustedRegistry> = resp.json().await?;
        Ok(rows.into_iter().map(|r| r.registry).collect())
    }

    /// Bounded retry used at startup: the scanner can come up before the
    /// backend finishes migrating.
    pub async fn wait_until_ready(&self) -> anyhow::Result<()> {
        const MAX_RETRIES: u32 = 30;
        const RETRY_INTERVAL: Duration = Duration::from_secs(2);

        for attempt in 1..=MAX_RETRIES {
            if self.get_excluded_namespaces().await.is_ok() && self.get_excluded_rules().await.is_ok() {
                info!(attempt, "backend_ready");
                return Ok(());
            }
            warn!(attempt, max = MAX_RETRIES, "waiting_for_backend");
            tokio::time::sleep(RETRY_INTERVAL).await;
        }

        anyhow::bail!("backend not ready after {MAX_RETRIES} attempts")
    }
}

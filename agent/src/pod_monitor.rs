//! Fixed-interval reconciliation loop, ported from
//! `original_source/agent/services/pod_monitor.py`. Unlike the security
//! scanner, which reacts to a `kube_runtime::watcher` stream, the original
//! pod monitor polls on a timer — preserved here rather than converted to
//! a watch, since the two processes are grounded on genuinely different
//! upstream designs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Event as K8sEvent, Pod};
use kube::api::{Api, ListParams};
use kube::Client;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::backend_client::BackendClient;
use crate::data_collector::collect_pod_data;

const SUPPRESSION_WINDOW: chrono::Duration = chrono::Duration::minutes(10);

const SYSTEM_NAMESPACES: &[&str] =
    &["kube-system", "kube-public", "kube-node-lease", "local-path-storage", "kure-system"];

const WAITING_FAILURE_REASONS: &[&str] = &[
    "CrashLoopBackOff",
    "ImagePullBackOff",
    "ErrImagePull",
    "InvalidImageName",
    "ErrImageNeverPull",
    "CreateContainerError",
];

pub struct PodMonitor {
    client: Client,
    backend: Arc<BackendClient>,
    check_interval: Duration,
    reported: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl PodMonitor {
    pub fn new(client: Client, backend: Arc<BackendClient>, check_interval: Duration) -> Self {
        PodMonitor { client, backend, check_interval, reported: Mutex::new(HashMap::new()) }
    }

    pub async fn start_monitoring(&self) {
        let mut ticker = tokio::time::interval(self.check_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.check_failed_pods().await {
                warn!(error = %e, "pod_check_cycle_failed");
            }
        }
    }

    async fn check_failed_pods(&self) -> anyhow::Result<()> {
        let pods_api: Api<Pod> = Api::all(self.client.clone());
        let pods = pods_api.list(&ListParams::default()).await?;

        let mut live_keys = std::collections::HashSet::new();

        for pod in &pods.items {
            let namespace = pod.metadata.namespace.clone().unwrap_or_default();
            let name = pod.metadata.name.clone().unwrap_or_default();

            if SYSTEM_NAMESPACES.contains(&namespace.as_str()) {
                continue;
            }

            let key = format!("{namespace}/{name}");
            live_keys.insert(key.clone());

            if !is_pod_failed(pod) {
                continue;
            }

            if !self.should_report(&key).await {
                continue;
            }

            self.handle_failed_pod(pod, &key).await;
        }

        self.cleanup_deleted_pods(&live_keys).await;
        Ok(())
    }

    async fn should_report(&self, key: &str) -> bool {
        let reported = self.reported.lock().await;
        match reported.get(key) {
            Some(last) => Utc::now() - *last > SUPPRESSION_WINDOW,
            None => true,
        }
    }

    async fn handle_failed_pod(&self, pod: &Pod, key: &str) {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        let pods_api: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
        let events_api: Api<K8sEvent> = Api::namespaced(self.client.clone(), &namespace);

        let data = collect_pod_data(pod, &pods_api, &events_api).await;
        info!(pod = %key, reason = %data.failure_reason, "pod_failure_detected");

        if self.backend.report_failed_pod(&data).await {
            self.reported.lock().await.insert(key.to_string(), Utc::now());
        }
    }

    async fn cleanup_deleted_pods(&self, live_keys: &std::collections::HashSet<String>) {
        let stale: Vec<String> = {
            let reported = self.reported.lock().await;
            reported.keys().filter(|k| !live_keys.contains(*k)).cloned().collect()
        };

        for key in stale {
            self.reported.lock().await.remove(&key);
            if let Some((namespace, pod_name)) = key.split_once('/') {
                self.backend.dismiss_deleted_pod(namespace, pod_name).await;
            }
        }
    }
}

fn is_pod_failed(pod: &Pod) -> bool {
    let Some(status) = &pod.status else { return false };
    let Some(phase) = &status.phase else { return true };

    match phase.as_str() {
        "Failed" => true,
        "Succeeded" => false,
        "Pending" => true,
        "Running" => is_running_pod_unhealthy(status),
        _ => true,
    }
}

fn is_running_pod_unhealthy(status: &k8s_openapi::api::core::v1::PodStatus) -> bool {
    let Some(statuses) = &status.container_statuses else { return false };

    statuses.iter().any(|cs| {
        let Some(state) = &cs.state else { return false };

        if let Some(terminated) = &state.terminated {
            let reason_ok = terminated.reason.as_deref() != Some("Completed");
            return reason_ok && terminated.exit_code != 0;
        }

        if let Some(waiting) = &state.waiting {
            if let Some(reason) = &waiting.reason {
                return WAITING_FAILURE_REASONS.contains(&reason.as_str());
            }
        }

        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateTerminated, ContainerStateWaiting, ContainerStatus as K8sContainerStatus,
        PodStatus,
    };

    fn pod_with_phase(phase: &str) -> Pod {
        Pod {
            status: Some(PodStatus { phase: Some(phase.to_string()), ..Default::default() }),
            ..Default::default()
        }
    }

    #[test]
    fn succeeded_pods_are_not_failed() {
        assert!(!is_pod_failed(&pod_with_phase("Succeeded")));
    }

    #[test]
    fn pending_pods_are_failed() {
        assert!(is_pod_failed(&pod_with_phase("Pending")));
    }

    #[test]
    fn running_pod_with_no_container_statuses_is_healthy() {
        assert!(!is_pod_failed(&pod_with_phase("Running")));
    }

    #[test]
    fn running_pod_with_crash_loop_backoff_is_failed() {
        let mut pod = pod_with_phase("Running");
        pod.status.as_mut().unwrap().container_statuses = Some(vec![K8sContainerStatus {
            state: Some(ContainerState {
                waiting: Some(ContainerStateWaiting { reason: Some("CrashLoopBackOff".to_string()), ..Default::default() }),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        assert!(is_pod_failed(&pod));
    }

    #[test]
    fn running_pod_with_completed_terminated_container_is_healthy() {
        let mut pod = pod_with_phase("Running");
        pod.status.as_mut().unwrap().container_statuses = Some(vec![K8sContainerStatus {
            state: Some(ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code: 0,
                    reason: Some("Completed".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        assert!(!is_pod_failed(&pod));
    }

    #[test]
    fn running_pod_with_nonzero_exit_terminated_container_is_failed() {
        let mut pod = pod_with_phase("Running");
        pod.status.as_mut().unwrap().container_statuses = Some(vec![K8sContainerStatus {
            state: Some(ContainerState {
                terminated: Some(ContainerStateTerminated { exit_code: 137, reason: Some("Error".to_string()), ..Default::default() }),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        assert!(is_pod_failed(&pod));
    }
}

//! Collects the data that accompanies a failed-pod report: container
//! statuses, recent events, tail of the logs, and a full manifest. Ported
//! from `original_source/agent/services/data_collector.py`.

use k8s_openapi::api::core::v1::{Event as K8sEvent, Pod};
use kube::api::{Api, ListParams, LogParams};
use kure_core::models::{ContainerStatus, PodEvent, PodFailureCreate};
use serde_json::Value;
use tracing::warn;

const RECENT_EVENT_COUNT: usize = 5;
const LOG_TAIL_LINES: i64 = 50;

/// Keys the original renders as camelCase in the manifest YAML, matching
/// Kubernetes' own wire convention rather than serde's default snake_case.
const CAMEL_CASE_KEYS: &[&str] = &[
    "api_version",
    "dns_policy",
    "restart_policy",
    "service_account_name",
    "termination_grace_period_seconds",
    "image_pull_policy",
    "container_port",
    "mount_path",
    "read_only",
    "host_port",
    "host_ip",
];

pub async fn collect_pod_data(pod: &Pod, pods_api: &Api<Pod>, events_api: &Api<K8sEvent>) -> PodFailureCreate {
    let pod_name = pod.metadata.name.clone().unwrap_or_default();
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();

    let events = get_pod_events(events_api, &pod_name).await;

    PodFailureCreate {
        pod_name: pod_name.clone(),
        namespace,
        node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        phase: pod.status.as_ref().and_then(|s| s.phase.clone()).unwrap_or_default(),
        creation_timestamp: pod
            .metadata
            .creation_timestamp
            .as_ref()
            .map(|t| t.0.to_rfc3339())
            .unwrap_or_default(),
        failure_reason: failure_reason(pod, &events),
        failure_message: Some(failure_message(pod, &events)).filter(|m| !m.is_empty()),
        container_statuses: container_statuses(pod),
        events,
        logs: get_pod_logs(pods_api, &pod_name).await,
        manifest: pod_manifest(pod),
    }
}

fn failure_reason(pod: &Pod, events: &[PodEvent]) -> String {
    let Some(status) = &pod.status else { return "Unknown".to_string() };

    if status.phase.as_deref() == Some("Pending") {
        const PENDING_REASONS: &[&str] = &[
            "FailedMount", "FailedScheduling", "Failed", "InvalidImageName",
            "ErrImagePull", "ImagePullBackOff", "CreateContainerError", "RunContainerError",
            "ErrImageNeverPull",
        ];
        for event in events {
            if event.event_type == "Warning" && PENDING_REASONS.contains(&event.reason.as_str()) {
                return event.reason.clone();
            }
        }
        return "Pending".to_string();
    }

    let Some(statuses) = &status.container_statuses else { return "Unknown".to_string() };
    for cs in statuses {
        if let Some(state) = &cs.state {
            if let Some(waiting) = &state.waiting {
                return waiting.reason.clone().unwrap_or_else(|| "Unknown".to_string());
            }
        }
    }

    "Unknown".to_string()
}

fn failure_message(pod: &Pod, events: &[PodEvent]) -> String {
    if let Some(statuses) = pod.status.as_ref().and_then(|s| s.container_statuses.as_ref()) {
        for cs in statuses {
            if let Some(waiting) = cs.state.as_ref().and_then(|s| s.waiting.as_ref()) {
                if let Some(message) = &waiting.message {
                    return message.clone();
                }
            }
        }
    }

    const PRIORITY_REASONS: &[&str] = &["FailedMount", "FailedScheduling", "Failed"];
    for event in events {
        if event.event_type == "Warning" && !event.message.is_empty() && PRIORITY_REASONS.contains(&event.reason.as_str()) {
            return event.message.clone();
        }
    }

    for event in events.iter().rev() {
        if event.event_type == "Warning" && !event.message.is_empty() {
            return event.message.clone();
        }
    }

    String::new()
}

fn container_statuses(pod: &Pod) -> Vec<ContainerStatus> {
    let Some(statuses) = pod.status.as_ref().and_then(|s| s.container_statuses.as_ref()) else {
        return Vec::new();
    };

    statuses
        .iter()
        .map(|cs| {
            let mut entry = ContainerStatus {
                name: cs.name.clone(),
                ready: cs.ready,
                restart_count: cs.restart_count,
                image: cs.image.clone(),
                state: "unknown".to_string(),
                reason: None,
                message: None,
                exit_code: None,
            };

            if let Some(state) = &cs.state {
                if let Some(waiting) = &state.waiting {
                    entry.state = "waiting".to_string();
                    entry.reason = waiting.reason.clone();
                    entry.message = waiting.message.clone();
                } else if state.running.is_some() {
                    entry.state = "running".to_string();
                } else if let Some(terminated) = &state.terminated {
                    entry.state = "terminated".to_string();
                    entry.exit_code = Some(terminated.exit_code);
                    entry.reason = terminated.reason.clone();
                }
            }

            entry
        })
        .collect()
}

async fn get_pod_events(events_api: &Api<K8sEvent>, pod_name: &str) -> Vec<PodEvent> {
    let params = ListParams::default().fields(&format!("involvedObject.name={pod_name}"));
    match events_api.list(&params).await {
        Ok(list) => list
            .items
            .iter()
            .rev()
            .take(RECENT_EVENT_COUNT)
            .rev()
            .map(|e| PodEvent {
                event_type: e.type_.clone().unwrap_or_default(),
                reason: e.reason.clone().unwrap_or_default(),
                message: e.message.clone().unwrap_or_default(),
                timestamp: e.first_timestamp.as_ref().map(|t| t.0.to_rfc3339()),
            })
            .collect(),
        Err(e) => {
            warn!(pod_name, error = %e, "pod_events_fetch_failed");
            Vec::new()
        }
    }
}

async fn get_pod_logs(pods_api: &Api<Pod>, pod_name: &str) -> String {
    let params = LogParams { tail_lines: Some(LOG_TAIL_LINES), ..Default::default() };
    match pods_api.logs(pod_name, &params).await {
        Ok(logs) => logs,
        Err(e) => {
            warn!(pod_name, error = %e, "pod_logs_fetch_failed");
            String::new()
        }
    }
}

/// Renders the pod as complete YAML, the same shape `kubectl get pod -o
/// yaml` would — keeps `status` (useful for debugging) and only strips
/// `managedFields`, rather than the aggressive pruning the security
/// scanner's manifest snapshot does.
fn pod_manifest(pod: &Pod) -> String {
    let mut value = match serde_json::to_value(pod) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "pod_manifest_serialize_failed");
            return "# Error generating pod manifest".to_string();
        }
    };

    if let Value::Object(ref mut root) = value {
        root.insert("apiVersion".to_string(), Value::String("v1".to_string()));
        root.insert("kind".to_string(), Value::String("Pod".to_string()));
        if let Some(Value::Object(metadata)) = root.get_mut("metadata") {
            metadata.remove("managedFields");
        }
    }

    clean_value(&mut value);

    match serde_yaml::to_string(&value) {
        Ok(yaml) => yaml,
        Err(e) => {
            warn!(error = %e, "pod_manifest_yaml_failed");
            "# Error generating pod manifest".to_string()
        }
    }
}

fn clean_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let keys: Vec<String> = map.keys().cloned().collect();
            for key in keys {
                let Some(mut entry) = map.remove(&key) else { continue };
                let drop_entry = matches!(&entry, Value::Null)
                    || matches!(&entry, Value::Array(a) if a.is_empty())
                    || matches!(&entry, Value::Object(o) if o.is_empty());
                if drop_entry {
                    continue;
                }
                clean_value(&mut entry);
                let out_key = if CAMEL_CASE_KEYS.contains(&key.as_str()) { to_camel_case(&key) } else { key };
                map.insert(out_key, entry);
            }
        }
        Value::Array(items) => {
            items.retain(|i| !i.is_null());
            for item in items {
                clean_value(item);
            }
        }
        _ => {}
    }
}

fn to_camel_case(snake: &str) -> String {
    let mut parts = snake.split('_');
    let Some(first) = parts.next() else { return snake.to_string() };
    let mut out = first.to_string();
    for part in parts {
        let mut chars = part.chars();
        if let Some(c) = chars.next() {
            out.push(c.to_ascii_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

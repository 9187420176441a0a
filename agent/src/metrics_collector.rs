//! Cluster-wide node/pod resource metrics, ported from
//! `original_source/agent/services/metrics_collector.py`. Uses the
//! `metrics.k8s.io` aggregated API when the metrics-server add-on is
//! present, and degrades to capacity/allocatable-only figures (no usage)
//! when it isn't.

use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, DynamicObject, GroupVersionKind, ListParams};
use kube::core::ApiResource;
use kube::Client;
use kure_core::models::{ClusterMetrics, NodeMetrics, PodInfo};
use tracing::warn;

/// Probes whether the `metrics.k8s.io/v1beta1` aggregated API is being
/// served at all, so a missing metrics-server doesn't look like a cluster
/// with zero usage.
pub async fn check_metrics_server(client: &Client) -> bool {
    let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", "NodeMetrics");
    let resource = ApiResource::from_gvk(&gvk);
    let api: Api<DynamicObject> = Api::all_with(client.clone(), &resource);
    api.list(&ListParams::default().limit(1)).await.is_ok()
}

pub async fn collect_cluster_metrics(client: &Client) -> anyhow::Result<ClusterMetrics> {
    let metrics_available = check_metrics_server(client).await;

    let nodes_api: Api<Node> = Api::all(client.clone());
    let nodes = nodes_api.list(&ListParams::default()).await?;

    let node_usage = if metrics_available { fetch_node_usage(client).await } else { Default::default() };

    let mut total_cpu_capacity_millis: i64 = 0;
    let mut total_cpu_allocatable_millis: i64 = 0;
    let mut total_cpu_usage_millis: i64 = 0;
    let mut total_memory_capacity_bytes: i64 = 0;
    let mut total_memory_allocatable_bytes: i64 = 0;
    let mut total_memory_usage_bytes: i64 = 0;

    let mut node_metrics = Vec::new();

    for node in &nodes.items {
        let name = node.metadata.name.clone().unwrap_or_default();
        let status = node.status.as_ref();
        let capacity = status.and_then(|s| s.capacity.as_ref());
        let allocatable = status.and_then(|s| s.allocatable.as_ref());

        let cpu_capacity = capacity.and_then(|c| c.get("cpu")).map(|q| q.0.clone()).unwrap_or_default();
        let cpu_allocatable = allocatable.and_then(|c| c.get("cpu")).map(|q| q.0.clone()).unwrap_or_default();
        let memory_capacity = capacity.and_then(|c| c.get("memory")).map(|q| q.0.clone()).unwrap_or_default();
        let memory_allocatable = allocatable.and_then(|c| c.get("memory")).map(|q| q.0.clone()).unwrap_or_default();

        total_cpu_capacity_millis += parse_cpu_millis(&cpu_capacity);
        total_cpu_allocatable_millis += parse_cpu_millis(&cpu_allocatable);
        total_memory_capacity_bytes += parse_memory_bytes(&memory_capacity);
        total_memory_allocatable_bytes += parse_memory_bytes(&memory_allocatable);

        let usage = node_usage.get(&name);
        let cpu_usage = usage.map(|u| u.0.clone());
        let memory_usage = usage.map(|u| u.1.clone());
        if let Some(u) = usage {
            total_cpu_usage_millis += parse_cpu_millis(&u.0);
            total_memory_usage_bytes += parse_memory_bytes(&u.1);
        }

        let pods_count = status.and_then(|s| s.capacity.as_ref()).and_then(|c| c.get("pods")).and_then(|q| q.0.parse::<i32>().ok());

        node_metrics.push(NodeMetrics {
            name,
            cpu_capacity,
            cpu_allocatable,
            cpu_usage,
            memory_capacity,
            memory_allocatable,
            memory_usage,
            conditions: status
                .and_then(|s| s.conditions.as_ref())
                .map(|conds| conds.iter().filter_map(|c| serde_json::to_value(c).ok()).collect())
                .unwrap_or_default(),
            pods_count,
        });
    }

    let pods_api: Api<Pod> = Api::all(client.clone());
    let pods = pods_api.list(&ListParams::default()).await?;
    let pod_infos: Vec<PodInfo> = pods
        .items
        .iter()
        .map(|p| PodInfo {
            name: p.metadata.name.clone().unwrap_or_default(),
            namespace: p.metadata.namespace.clone().unwrap_or_default(),
            node: p.spec.as_ref().and_then(|s| s.node_name.clone()).unwrap_or_default(),
            status: p.status.as_ref().and_then(|s| s.phase.clone()).unwrap_or_default(),
            ready: p
                .status
                .as_ref()
                .and_then(|s| s.conditions.as_ref())
                .map(|conds| conds.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
                .unwrap_or(false),
            restarts: p
                .status
                .as_ref()
                .and_then(|s| s.container_statuses.as_ref())
                .map(|cs| cs.iter().map(|c| c.restart_count).sum())
                .unwrap_or(0),
        })
        .collect();

    let cpu_usage_percent = metrics_available
        .then(|| if total_cpu_allocatable_millis > 0 { Some(total_cpu_usage_millis as f64 / total_cpu_allocatable_millis as f64 * 100.0) } else { None })
        .flatten();
    let memory_usage_percent = metrics_available
        .then(|| if total_memory_allocatable_bytes > 0 { Some(total_memory_usage_bytes as f64 / total_memory_allocatable_bytes as f64 * 100.0) } else { None })
        .flatten();

    Ok(ClusterMetrics {
        node_count: nodes.items.len() as i32,
        nodes: node_metrics,
        total_cpu_capacity: format_cpu_millis(total_cpu_capacity_millis),
        total_cpu_allocatable: format_cpu_millis(total_cpu_allocatable_millis),
        cpu_usage_percent,
        total_memory_capacity: format_memory_bytes(total_memory_capacity_bytes),
        total_memory_allocatable: format_memory_bytes(total_memory_allocatable_bytes),
        memory_usage_percent,
        total_pods: Some(pod_infos.len() as i32),
        pods: pod_infos,
        metrics_available,
        timestamp: chrono::Utc::now(),
    })
}

/// Node name -> (cpu usage string, memory usage string) from
/// `metrics.k8s.io/v1beta1` NodeMetrics objects.
async fn fetch_node_usage(client: &Client) -> std::collections::HashMap<String, (String, String)> {
    let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", "NodeMetrics");
    let resource = ApiResource::from_gvk(&gvk);
    let api: Api<DynamicObject> = Api::all_with(client.clone(), &resource);

    let mut usage = std::collections::HashMap::new();
    match api.list(&ListParams::default()).await {
        Ok(list) => {
            for obj in list.items {
                let Some(name) = obj.metadata.name.clone() else { continue };
                let cpu = obj.data.get("usage").and_then(|u| u.get("cpu")).and_then(|v| v.as_str()).unwrap_or("0").to_string();
                let memory = obj.data.get("usage").and_then(|u| u.get("memory")).and_then(|v| v.as_str()).unwrap_or("0").to_string();
                usage.insert(name, (cpu, memory));
            }
        }
        Err(e) => warn!(error = %e, "node_metrics_fetch_failed"),
    }
    usage
}

/// Parses a Kubernetes CPU quantity (`"500m"`, `"2"`, `"250000n"`) into
/// millicores. Bare numbers under 1000 are treated as whole cores, the
/// same ambiguity heuristic the original Python collector uses.
fn parse_cpu_millis(raw: &str) -> i64 {
    let raw = raw.trim();
    if let Some(m) = raw.strip_suffix('m') {
        return m.parse().unwrap_or(0);
    }
    if let Some(n) = raw.strip_suffix('n') {
        let nanos: i64 = n.parse().unwrap_or(0);
        return nanos / 1_000_000;
    }
    match raw.parse::<f64>() {
        Ok(cores) if cores < 1000.0 => (cores * 1000.0) as i64,
        Ok(millis) => millis as i64,
        Err(_) => 0,
    }
}

fn format_cpu_millis(millis: i64) -> String {
    format!("{millis}m")
}

/// Parses a Kubernetes memory quantity with binary (`Ki/Mi/Gi/Ti`) or
/// decimal (`K/M/G/T`) suffixes into bytes.
fn parse_memory_bytes(raw: &str) -> i64 {
    let raw = raw.trim();
    const BINARY: &[(&str, i64)] = &[("Ki", 1024), ("Mi", 1024i64.pow(2)), ("Gi", 1024i64.pow(3)), ("Ti", 1024i64.pow(4))];
    const DECIMAL: &[(&str, i64)] = &[("K", 1000), ("M", 1_000_000), ("G", 1_000_000_000), ("T", 1_000_000_000_000)];

    for (suffix, multiplier) in BINARY {
        if let Some(n) = raw.strip_suffix(suffix) {
            return n.parse::<f64>().map(|v| (v * *multiplier as f64) as i64).unwrap_or(0);
        }
    }
    for (suffix, multiplier) in DECIMAL {
        if let Some(n) = raw.strip_suffix(suffix) {
            return n.parse::<f64>().map(|v| (v * *multiplier as f64) as i64).unwrap_or(0);
        }
    }
    raw.parse::<i64>().unwrap_or(0)
}

fn format_memory_bytes(bytes: i64) -> String {
    format!("{bytes}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_millicore_suffix() {
        assert_eq!(parse_cpu_millis("500m"), 500);
    }

    #[test]
    fn parses_nanocore_suffix() {
        assert_eq!(parse_cpu_millis("250000000n"), 250);
    }

    #[test]
    fn parses_bare_core_count_as_cores() {
        assert_eq!(parse_cpu_millis("2"), 2000);
    }

    #[test]
    fn parses_binary_memory_suffix() {
        assert_eq!(parse_memory_bytes("1Ki"), 1024);
        assert_eq!(parse_memory_bytes("1Gi"), 1024i64.pow(3));
    }

    #[test]
    fn parses_decimal_memory_suffix() {
        assert_eq!(parse_memory_bytes("1M"), 1_000_000);
    }
}

//! Process-global Prometheus registry, the Rust analogue of
//! `original_source/backend/services/prometheus_metrics.py`. Follows the
//! teacher's `LazyLock<Registry>` + `with_label_values` pattern
//! (`src/commands/webhook.rs`, `src/commands/watch.rs`).

use std::sync::LazyLock;

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static POD_FAILURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        Opts::new("pod_failures_total", "Total pod failures ingested"),
        &["namespace", "reason"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

pub static SECURITY_FINDINGS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        Opts::new("security_findings_total", "Total security findings ingested"),
        &["severity"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

pub static SECURITY_SCAN_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let h = Histogram::with_opts(HistogramOpts::new(
        "security_scan_duration_seconds",
        "Duration of a full scanner sweep in seconds",
    ))
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(h.clone())).expect("metric not yet registered");
    h
});

pub static WS_CONNECTED_CLIENTS: LazyLock<prometheus::IntGauge> = LazyLock::new(|| {
    let g = prometheus::IntGauge::new("ws_connected_clients", "Currently connected WebSocket clients")
        .expect("metric definition is valid");
    REGISTRY.register(Box::new(g.clone())).expect("metric not yet registered");
    g
});

/// Renders the registry in Prometheus text exposition format, served at
/// `GET /metrics`, which is exempt from auth.
pub fn encode() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

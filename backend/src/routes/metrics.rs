//! `/metrics` Prometheus exposition and `/api/metrics/*` ingest, ported
//! from `original_source/backend/routes_metrics.py`.

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kure_core::error::{CoreError, CoreResult};
use kure_core::metrics::{self, SECURITY_SCAN_DURATION_SECONDS};
use kure_core::models::{ClusterMetrics, Envelope, MetricsHistoryPoint};
use serde::Deserialize;

use crate::app::AppState;

pub async fn exposition() -> Response {
    match metrics::encode() {
        Ok(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => CoreError::internal(e).into_response(),
    }
}

/// `POST /api/metrics/cluster` — the agent's periodic cluster snapshot.
/// Persists the latest row, appends each pod's point to its bounded
/// history ring, and rebroadcasts to connected UIs.
pub async fn ingest_cluster_metrics(
    State(state): State<AppState>,
    Json(body): Json<ClusterMetrics>,
) -> CoreResult<Json<serde_json::Value>> {
    state.storage.save_cluster_metrics(&body).await?;

    for pod in &body.pods {
        state
            .storage
            .append_metrics_history(
                &pod.namespace,
                &pod.name,
                MetricsHistoryPoint {
                    timestamp: body.timestamp,
                    cpu_usage_percent: body.cpu_usage_percent,
                    memory_usage_percent: body.memory_usage_percent,
                },
            )
            .await?;
    }

    state
        .hub
        .broadcast(Envelope::new("cluster_metrics", serde_json::to_value(&body)?))
        .await;

    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct ScanDurationBody {
    pub seconds: f64,
}

/// `POST /api/metrics/security-scan-duration` — the scanner reports each
/// full-sweep duration for the `kure_security_scan_duration_seconds`
/// histogram.
pub async fn record_scan_duration(Json(body): Json<ScanDurationBody>) -> Json<serde_json::Value> {
    SECURITY_SCAN_DURATION_SECONDS.observe(body.seconds);
    Json(serde_json::json!({ "ok": true }))
}

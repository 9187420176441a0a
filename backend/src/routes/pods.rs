//! `/api/pods/*` handlers, ported from `original_source/backend/routes_pods.py`.

use axum::extract::{Path, Query, State};
use axum::Json;
use kure_core::error::{CoreError, CoreResult};
use kure_core::metrics::POD_FAILURES_TOTAL;
use kure_core::models::{Envelope, PodFailureCreate, PodFailureResponse, PodFailureStatus};
use kure_core::storage::PodFailureFilter;
use serde::Deserialize;

use crate::app::AppState;
use crate::notify::NotificationEvent;
use crate::solution;

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    status: Option<String>,
    namespace: Option<String>,
    #[serde(default)]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

/// `POST /api/pods/failed` — upsert, compute solution, broadcast.
pub async fn ingest(
    State(state): State<AppState>,
    Json(body): Json<PodFailureCreate>,
) -> CoreResult<Json<PodFailureResponse>> {
    if body.pod_name.is_empty() || body.namespace.is_empty() {
        return Err(CoreError::Validation("pod_name and namespace are required".into()));
    }

    let solution = solution::rule_based_solution(
        &body.failure_reason,
        body.failure_message.as_deref(),
        &body.events,
        &body.container_statuses,
    );

    let namespace = body.namespace.clone();
    let reason = body.failure_reason.clone();

    let mut row = state.storage.save_pod_failure(body).await?;
    state.storage.update_pod_failure_solution(row.id, solution.clone()).await?;
    row.solution = solution;

    POD_FAILURES_TOTAL.with_label_values(&[&namespace, &reason]).inc();

    state
        .hub
        .broadcast(Envelope::new("pod_failure", serde_json::to_value(&row)?))
        .await;

    Ok(Json(row))
}

/// `GET /api/pods/failed` — list, filterable by status/namespace.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> CoreResult<Json<Vec<PodFailureResponse>>> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            PodFailureStatus::parse(s).ok_or_else(|| CoreError::Validation(format!("unknown status: {s}")))
        })
        .transpose()?;

    let rows = state
        .storage
        .list_pod_failures(PodFailureFilter {
            status,
            namespace: query.namespace,
            limit: query.limit,
            offset: query.offset,
        })
        .await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    #[serde(default)]
    pub resolution_note: Option<String>,
}

/// `PATCH /api/pods/failed/{id}/status` — validated status transition.
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateStatusRequest>,
) -> CoreResult<Json<PodFailureResponse>> {
    let next = PodFailureStatus::parse(&body.status)
        .ok_or_else(|| CoreError::Validation(format!("unknown status: {}", body.status)))?;

    let row = state
        .storage
        .update_pod_failure_status(id, next, body.resolution_note)
        .await?;

    state
        .hub
        .broadcast(Envelope::new("pod_status_change", serde_json::to_value(&row)?))
        .await;

    if matches!(next, PodFailureStatus::Resolved) {
        let _ = state.notifier.notify(NotificationEvent::PodResolved(row.clone())).await;
    }

    Ok(Json(row))
}

/// `DELETE /api/pods/records/{id}` — only terminal (non-active) rows may
/// be hard-deleted.
pub async fn delete_record(State(state): State<AppState>, Path(id): Path<i64>) -> CoreResult<Json<serde_json::Value>> {
    let row = state.storage.get_pod_failure(id).await?;
    if row.status.is_active() {
        return Err(CoreError::Validation(
            "cannot hard-delete an active pod failure record".into(),
        ));
    }

    state.storage.delete_pod_failure(id).await?;
    state
        .hub
        .broadcast(Envelope::new("pod_record_deleted", serde_json::json!({ "id": id })))
        .await;

    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[derive(Debug, Deserialize)]
pub struct DismissDeletedRequest {
    pub pod_name: String,
    pub namespace: String,
}

/// `POST /api/pods/dismiss-deleted` — auto-resolve on agent reconciliation.
pub async fn dismiss_deleted(
    State(state): State<AppState>,
    Json(body): Json<DismissDeletedRequest>,
) -> CoreResult<Json<serde_json::Value>> {
    match state.storage.dismiss_deleted_pod(&body.pod_name, &body.namespace).await? {
        Some(row) => {
            state
                .hub
                .broadcast(Envelope::new("pod_status_change", serde_json::to_value(&row)?))
                .await;
            let _ = state
                .notifier
                .notify(NotificationEvent::PodDismissedDeleted {
                    pod_name: body.pod_name,
                    namespace: body.namespace,
                })
                .await;
        }
        None => {
            state
                .hub
                .broadcast(Envelope::new(
                    "pod_deleted",
                    serde_json::json!({ "pod_name": body.pod_name, "namespace": body.namespace }),
                ))
                .await;
        }
    }

    Ok(Json(serde_json::json!({ "ok": true })))
}

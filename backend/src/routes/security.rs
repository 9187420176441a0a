//! `/api/security/*` and `/api/cve/*` handlers, ported from
//! `original_source/backend/routes_security.py`.

use axum::extract::{Path, Query, State};
use axum::Json;
use kure_core::error::{CoreError, CoreResult};
use kure_core::metrics::SECURITY_FINDINGS_TOTAL;
use kure_core::models::{CveFindingResponse, Envelope, SecurityFindingCreate, SecurityFindingResponse, Severity};
use kure_core::storage::SecurityFindingFilter;
use serde::Deserialize;

use crate::app::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    namespace: Option<String>,
    severity: Option<String>,
    #[serde(default)]
    include_dismissed: bool,
    #[serde(default)]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

/// `POST /api/security/findings` — dedup upsert; broadcasts only on insert.
/// A second ingest of the same resource/title identity updates the row
/// but does not rebroadcast.
pub async fn ingest(
    State(state): State<AppState>,
    Json(body): Json<SecurityFindingCreate>,
) -> CoreResult<Json<SecurityFindingResponse>> {
    if body.namespace.is_empty() || body.resource_name.is_empty() || body.title.is_empty() {
        return Err(CoreError::Validation(
            "namespace, resource_name, and title are required".into(),
        ));
    }

    let severity = body.severity;
    let (row, is_new) = state.storage.save_security_finding(body).await?;

    if is_new {
        SECURITY_FINDINGS_TOTAL.with_label_values(&[severity.as_str()]).inc();
        state
            .hub
            .broadcast(Envelope::new("security_finding", serde_json::to_value(&row)?))
            .await;
    }

    Ok(Json(row))
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> CoreResult<Json<Vec<SecurityFindingResponse>>> {
    let severity = query
        .severity
        .as_deref()
        .map(|s| Severity::parse(s).ok_or_else(|| CoreError::Validation(format!("unknown severity: {s}"))))
        .transpose()?;

    let rows = state
        .storage
        .list_security_findings(SecurityFindingFilter {
            namespace: query.namespace,
            severity,
            include_dismissed: query.include_dismissed,
            limit: query.limit,
            offset: query.offset,
        })
        .await?;
    Ok(Json(rows))
}

pub async fn dismiss(State(state): State<AppState>, Path(id): Path<i64>) -> CoreResult<Json<serde_json::Value>> {
    state.storage.dismiss_security_finding(id).await?;
    Ok(Json(serde_json::json!({ "dismissed": true })))
}

/// `DELETE /api/security/findings/resource/{kind}/{ns}/{name}` — the
/// scanner calls this before every single-resource scan, making re-scan
/// idempotent.
pub async fn delete_by_resource(
    State(state): State<AppState>,
    Path((kind, namespace, name)): Path<(String, String, String)>,
) -> CoreResult<Json<serde_json::Value>> {
    let deleted = state
        .storage
        .delete_findings_by_resource(&kind, &name, &namespace)
        .await?;

    if deleted > 0 {
        state
            .hub
            .broadcast(Envelope::new(
                "security_finding_deleted",
                serde_json::json!({ "resource_type": kind, "resource_name": name, "namespace": namespace }),
            ))
            .await;
    }

    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

/// `POST /api/security/scan/clear` — called once at scanner startup,
/// before the first full sweep.
pub async fn clear(State(state): State<AppState>) -> CoreResult<Json<serde_json::Value>> {
    let deleted = state.storage.clear_all_security_findings().await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

pub async fn ingest_cve(
    State(state): State<AppState>,
    Json(body): Json<CveFindingResponse>,
) -> CoreResult<Json<CveFindingResponse>> {
    let row = state.storage.save_cve_finding(body).await?;
    state
        .hub
        .broadcast(Envelope::new("cve_finding", serde_json::to_value(&row)?))
        .await;
    Ok(Json(row))
}

#[derive(Debug, Deserialize, Default)]
pub struct CveListQuery {
    #[serde(default)]
    include_dismissed: bool,
}

pub async fn list_cve(
    State(state): State<AppState>,
    Query(query): Query<CveListQuery>,
) -> CoreResult<Json<Vec<CveFindingResponse>>> {
    let rows = state.storage.list_cve_findings(query.include_dismissed).await?;
    Ok(Json(rows))
}

pub async fn dismiss_cve(State(state): State<AppState>, Path(id): Path<i64>) -> CoreResult<Json<serde_json::Value>> {
    state.storage.dismiss_cve_finding(id).await?;
    Ok(Json(serde_json::json!({ "dismissed": true })))
}

#[derive(Debug, Deserialize)]
pub struct RescanStatusBody {
    pub status: String,
}

/// `POST /api/security/rescan-status` — the scanner brackets a
/// trusted-registry rescan with `started`/`completed` reports so connected
/// UIs can show progress; this is forwarded verbatim, no row is stored.
pub async fn report_rescan_status(
    State(state): State<AppState>,
    Json(body): Json<RescanStatusBody>,
) -> CoreResult<Json<serde_json::Value>> {
    state
        .hub
        .broadcast(Envelope::new("security_rescan_status", serde_json::json!({ "status": body.status })))
        .await;
    Ok(Json(serde_json::json!({ "ok": true })))
}

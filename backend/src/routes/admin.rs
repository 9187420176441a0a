//! `/api/admin/*` handlers: exclusion CRUD with cascading delete +
//! broadcast, retention settings, API keys, LLM config, notifications.
//! Ported from `original_source/backend/routes_admin.py` and
//! `routes_exclusions.py`.

use axum::extract::{Path, State};
use axum::Json;
use kure_core::crypto;
use kure_core::error::{CoreError, CoreResult};
use kure_core::models::{
    ApiKeyRecord, Envelope, ExcludedNamespace, ExcludedPod, ExcludedRule, LlmConfig,
    NotificationSetting, TrustedRegistry,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::retention::validate_retention_minutes;

async fn broadcast_deleted_findings(state: &AppState, deleted: u64, namespace: Option<&str>, resource_name: Option<&str>) {
    if deleted == 0 {
        return;
    }
    state
        .hub
        .broadcast(Envelope::new(
            "security_finding_deleted",
            serde_json::json!({ "namespace": namespace, "resource_name": resource_name, "count": deleted }),
        ))
        .await;
}

// ---- excluded namespaces --------------------------------------------------

pub async fn list_excluded_namespaces(State(state): State<AppState>) -> CoreResult<Json<Vec<ExcludedNamespace>>> {
    Ok(Json(state.storage.list_excluded_namespaces().await?))
}

#[derive(Debug, Deserialize)]
pub struct NamespaceBody {
    pub namespace: String,
}

/// Cascading add: insert the exclusion, delete matching findings, broadcast
/// a deletion event, then broadcast the exclusion change.
pub async fn add_excluded_namespace(
    State(state): State<AppState>,
    Json(body): Json<NamespaceBody>,
) -> CoreResult<Json<ExcludedNamespace>> {
    let row = state.storage.add_excluded_namespace(&body.namespace).await?;
    let deleted = state.storage.delete_findings_by_namespace(&body.namespace).await?;
    broadcast_deleted_findings(&state, deleted, Some(&body.namespace), None).await;

    state
        .hub
        .broadcast(Envelope::new(
            "namespace_exclusion_change",
            serde_json::json!({ "namespace": row.namespace, "excluded": true }),
        ))
        .await;

    Ok(Json(row))
}

/// Removal broadcasts only the exclusion change — no rescan on the
/// backend, the scanner does that.
pub async fn remove_excluded_namespace(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> CoreResult<Json<serde_json::Value>> {
    state.storage.remove_excluded_namespace(&namespace).await?;
    state
        .hub
        .broadcast(Envelope::new(
            "namespace_exclusion_change",
            serde_json::json!({ "namespace": namespace, "excluded": false }),
        ))
        .await;
    Ok(Json(serde_json::json!({ "removed": true })))
}

// ---- excluded pods ---------------------------------------------------------

pub async fn list_excluded_pods(State(state): State<AppState>) -> CoreResult<Json<Vec<ExcludedPod>>> {
    Ok(Json(state.storage.list_excluded_pods().await?))
}

#[derive(Debug, Deserialize)]
pub struct PodBody {
    pub pod_name: String,
}

pub async fn add_excluded_pod(
    State(state): State<AppState>,
    Json(body): Json<PodBody>,
) -> CoreResult<Json<ExcludedPod>> {
    let row = state.storage.add_excluded_pod(&body.pod_name).await?;
    let deleted = state.storage.delete_findings_by_pod_name(&body.pod_name).await?;
    broadcast_deleted_findings(&state, deleted, None, Some(&body.pod_name)).await;

    state
        .hub
        .broadcast(Envelope::new(
            "pod_exclusion_change",
            serde_json::json!({ "pod_name": row.pod_name, "excluded": true }),
        ))
        .await;

    Ok(Json(row))
}

pub async fn remove_excluded_pod(
    State(state): State<AppState>,
    Path(pod_name): Path<String>,
) -> CoreResult<Json<serde_json::Value>> {
    state.storage.remove_excluded_pod(&pod_name).await?;
    state
        .hub
        .broadcast(Envelope::new(
            "pod_exclusion_change",
            serde_json::json!({ "pod_name": pod_name, "excluded": false }),
        ))
        .await;
    Ok(Json(serde_json::json!({ "removed": true })))
}

// ---- excluded rules ---------------------------------------------------------

pub async fn list_excluded_rules(State(state): State<AppState>) -> CoreResult<Json<Vec<ExcludedRule>>> {
    Ok(Json(state.storage.list_excluded_rules().await?))
}

#[derive(Debug, Deserialize)]
pub struct RuleBody {
    pub rule_title: String,
    #[serde(default)]
    pub namespace: String,
}

pub async fn add_excluded_rule(
    State(state): State<AppState>,
    Json(body): Json<RuleBody>,
) -> CoreResult<Json<ExcludedRule>> {
    let row = state.storage.add_excluded_rule(&body.rule_title, &body.namespace).await?;
    let namespace_filter = (!row.namespace.is_empty()).then_some(row.namespace.as_str());
    let deleted = state
        .storage
        .delete_findings_by_rule_title(&row.rule_title, namespace_filter)
        .await?;
    broadcast_deleted_findings(&state, deleted, namespace_filter, Some(&row.rule_title)).await;

    state
        .hub
        .broadcast(Envelope::new(
            "rule_exclusion_change",
            serde_json::json!({ "rule_title": row.rule_title, "namespace": row.namespace, "excluded": true }),
        ))
        .await;

    Ok(Json(row))
}

pub async fn remove_excluded_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> CoreResult<Json<serde_json::Value>> {
    let rules = state.storage.list_excluded_rules().await?;
    let rule = rules
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(|| CoreError::NotFound(format!("excluded rule {id}")))?;

    state.storage.remove_excluded_rule(&rule.rule_title, &rule.namespace).await?;
    state
        .hub
        .broadcast(Envelope::new(
            "rule_exclusion_change",
            serde_json::json!({ "rule_title": rule.rule_title, "namespace": rule.namespace, "excluded": false }),
        ))
        .await;
    Ok(Json(serde_json::json!({ "removed": true })))
}

// ---- trusted registries ------------------------------------------------------

pub async fn list_trusted_registries(State(state): State<AppState>) -> CoreResult<Json<Vec<TrustedRegistry>>> {
    Ok(Json(state.storage.list_trusted_registries().await?))
}

#[derive(Debug, Deserialize)]
pub struct RegistryBody {
    pub registry: String,
}

/// No cascading delete here — a trusted-registry change only triggers
/// scanner-side rescans, never a backend-side delete.
pub async fn add_trusted_registry(
    State(state): State<AppState>,
    Json(body): Json<RegistryBody>,
) -> CoreResult<Json<TrustedRegistry>> {
    let registry = body.registry.to_lowercase();
    let row = state.storage.add_trusted_registry(&registry).await?;
    state
        .hub
        .broadcast(Envelope::new(
            "trusted_registry_change",
            serde_json::json!({ "registry": row.registry, "added": true }),
        ))
        .await;
    Ok(Json(row))
}

pub async fn remove_trusted_registry(
    State(state): State<AppState>,
    Path(registry): Path<String>,
) -> CoreResult<Json<serde_json::Value>> {
    state.storage.remove_trusted_registry(&registry).await?;
    state
        .hub
        .broadcast(Envelope::new(
            "trusted_registry_change",
            serde_json::json!({ "registry": registry, "added": false }),
        ))
        .await;
    Ok(Json(serde_json::json!({ "removed": true })))
}

// ---- retention settings -------------------------------------------------------

pub async fn get_history_retention(State(state): State<AppState>) -> CoreResult<Json<serde_json::Value>> {
    get_retention(&state, kure_core::models::app_settings::HISTORY_RETENTION_MINUTES).await
}

pub async fn get_ignored_retention(State(state): State<AppState>) -> CoreResult<Json<serde_json::Value>> {
    get_retention(&state, kure_core::models::app_settings::IGNORED_RETENTION_MINUTES).await
}

async fn get_retention(state: &AppState, key: &str) -> CoreResult<Json<serde_json::Value>> {
    let minutes = state
        .storage
        .get_app_setting(key)
        .await?
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);
    Ok(Json(serde_json::json!({ "minutes": minutes })))
}

#[derive(Debug, Deserialize)]
pub struct RetentionBody {
    pub minutes: i64,
}

pub async fn set_history_retention(
    State(state): State<AppState>,
    Json(body): Json<RetentionBody>,
) -> CoreResult<Json<serde_json::Value>> {
    set_retention(&state, kure_core::models::app_settings::HISTORY_RETENTION_MINUTES, body.minutes).await
}

pub async fn set_ignored_retention(
    State(state): State<AppState>,
    Json(body): Json<RetentionBody>,
) -> CoreResult<Json<serde_json::Value>> {
    set_retention(&state, kure_core::models::app_settings::IGNORED_RETENTION_MINUTES, body.minutes).await
}

async fn set_retention(state: &AppState, key: &str, minutes: i64) -> CoreResult<Json<serde_json::Value>> {
    validate_retention_minutes(minutes)?;
    state.storage.set_app_setting(key, &minutes.to_string()).await?;
    Ok(Json(serde_json::json!({ "minutes": minutes })))
}

// ---- API keys ------------------------------------------------------------------

pub async fn list_api_keys(State(state): State<AppState>) -> CoreResult<Json<Vec<ApiKeyRecord>>> {
    Ok(Json(state.storage.list_api_keys().await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyBody {
    pub label: String,
    pub api_key: String,
}

/// The raw key is never stored — only a salted hash, so the backend can
/// never disclose it again after creation (the caller must record it now).
pub async fn create_api_key(
    State(state): State<AppState>,
    Json(body): Json<CreateApiKeyBody>,
) -> CoreResult<Json<ApiKeyRecord>> {
    let hash = crypto::hash_api_key(&body.api_key);
    let row = state.storage.create_api_key(&body.label, &hash).await?;
    Ok(Json(row))
}

pub async fn revoke_api_key(State(state): State<AppState>, Path(id): Path<i64>) -> CoreResult<Json<serde_json::Value>> {
    state.storage.revoke_api_key(id).await?;
    Ok(Json(serde_json::json!({ "revoked": true })))
}

// ---- LLM config ------------------------------------------------------------------

pub async fn get_llm_config(State(state): State<AppState>) -> CoreResult<Json<Option<LlmConfig>>> {
    let mut config = state.storage.get_llm_config().await?;
    if let Some(c) = config.as_mut() {
        c.api_key_encrypted = "***redacted***".to_string();
    }
    Ok(Json(config))
}

#[derive(Debug, Deserialize)]
pub struct SetLlmConfigBody {
    pub provider: String,
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

/// `LLMConfig` is a singleton row; writing replaces any existing row.
/// The key is encrypted at rest under `ENCRYPTION_KEY`.
pub async fn set_llm_config(
    State(state): State<AppState>,
    Json(body): Json<SetLlmConfigBody>,
) -> CoreResult<Json<serde_json::Value>> {
    let encryption_key = state
        .config
        .encryption_key
        .as_deref()
        .ok_or_else(|| CoreError::Validation("ENCRYPTION_KEY is not configured".into()))?;

    let api_key_encrypted = crypto::encrypt(encryption_key, &body.api_key)?;
    state
        .storage
        .set_llm_config(LlmConfig {
            provider: body.provider,
            api_key_encrypted,
            model: body.model,
            base_url: body.base_url,
        })
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn clear_llm_config(State(state): State<AppState>) -> CoreResult<Json<serde_json::Value>> {
    state.storage.clear_llm_config().await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

// ---- notification settings ---------------------------------------------------------

pub async fn list_notifications(State(state): State<AppState>) -> CoreResult<Json<Vec<NotificationSetting>>> {
    Ok(Json(state.storage.list_notification_settings().await?))
}

#[derive(Debug, Deserialize)]
pub struct UpsertNotificationBody {
    pub provider: String,
    pub enabled: bool,
    #[serde(default)]
    pub config: serde_json::Value,
}

pub async fn upsert_notification(
    State(state): State<AppState>,
    Json(body): Json<UpsertNotificationBody>,
) -> CoreResult<Json<NotificationSetting>> {
    let row = state
        .storage
        .upsert_notification_setting(&body.provider, body.enabled, body.config)
        .await?;
    Ok(Json(row))
}

//! Router assembly and shared application state, the backend's analogue
//! of `original_source/backend/core/app.py`'s FastAPI app construction.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use kure_core::config::BackendConfig;
use kure_core::storage::Storage;

use crate::auth::{self, LoginRateLimiter};
use crate::llm::LlmPort;
use crate::notify::Notifier;
use crate::routes;
use crate::ws::Hub;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub hub: Hub,
    pub config: Arc<BackendConfig>,
    pub login_limiter: Arc<LoginRateLimiter>,
    pub notifier: Arc<dyn Notifier>,
    pub llm: Arc<dyn LlmPort>,
}

pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/metrics", get(routes::metrics::exposition))
        .route("/api/auth/status", get(auth::auth_status))
        .route("/api/auth/login", post(auth::auth_login));

    let api = Router::new()
        .route("/api/pods/failed", post(routes::pods::ingest).get(routes::pods::list))
        .route("/api/pods/failed/:id/status", patch(routes::pods::update_status))
        .route("/api/pods/records/:id", delete(routes::pods::delete_record))
        .route("/api/pods/dismiss-deleted", post(routes::pods::dismiss_deleted))
        .route("/api/pods/:ns/:pod/logs/stream", get(routes::logs::stream))
        .route("/api/security/findings", post(routes::security::ingest).get(routes::security::list))
        .route(
            "/api/security/findings/resource/:kind/:ns/:name",
            delete(routes::security::delete_by_resource),
        )
        .route("/api/security/findings/:id/dismiss", post(routes::security::dismiss))
        .route("/api/security/scan/clear", post(routes::security::clear))
        .route("/api/security/rescan-status", post(routes::security::report_rescan_status))
        .route(
            "/api/admin/excluded-namespaces",
            get(routes::admin::list_excluded_namespaces).post(routes::admin::add_excluded_namespace),
        )
        .route(
            "/api/admin/excluded-namespaces/:namespace",
            delete(routes::admin::remove_excluded_namespace),
        )
        .route(
            "/api/admin/excluded-pods",
            get(routes::admin::list_excluded_pods).post(routes::admin::add_excluded_pod),
        )
        .route("/api/admin/excluded-pods/:pod_name", delete(routes::admin::remove_excluded_pod))
        .route(
            "/api/admin/excluded-rules",
            get(routes::admin::list_excluded_rules).post(routes::admin::add_excluded_rule),
        )
        .route("/api/admin/excluded-rules/:id", delete(routes::admin::remove_excluded_rule))
        .route(
            "/api/admin/trusted-registries",
            get(routes::admin::list_trusted_registries).post(routes::admin::add_trusted_registry),
        )
        .route(
            "/api/admin/trusted-registries/:registry",
            delete(routes::admin::remove_trusted_registry),
        )
        .route(
            "/api/admin/settings/history-retention",
            get(routes::admin::get_history_retention).put(routes::admin::set_history_retention),
        )
        .route(
            "/api/admin/settings/ignored-retention",
            get(routes::admin::get_ignored_retention).put(routes::admin::set_ignored_retention),
        )
        .route(
            "/api/admin/api-keys",
            get(routes::admin::list_api_keys).post(routes::admin::create_api_key),
        )
        .route("/api/admin/api-keys/:id", delete(routes::admin::revoke_api_key))
        .route(
            "/api/admin/llm-config",
            get(routes::admin::get_llm_config)
                .put(routes::admin::set_llm_config)
                .delete(routes::admin::clear_llm_config),
        )
        .route(
            "/api/admin/notifications",
            get(routes::admin::list_notifications).put(routes::admin::upsert_notification),
        )
        .route("/api/cve/findings", post(routes::security::ingest_cve).get(routes::security::list_cve))
        .route("/api/cve/findings/:id/dismiss", post(routes::security::dismiss_cve))
        .route("/api/metrics/cluster", post(routes::metrics::ingest_cluster_metrics))
        .route(
            "/api/metrics/security-scan-duration",
            post(routes::metrics::record_scan_duration),
        )
        .route("/ws", get(routes::ws::upgrade));

    public
        .merge(api)
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_auth))
        .with_state(state)
}

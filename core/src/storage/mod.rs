//! Persistence port. One trait, one production implementation
//! ([`postgres::PostgresStorage`]), collapsing the three-way
//! `database_base.py` / `database_postgresql.py` / `database_sqlite.py`
//! split in `original_source/backend/database/` into a single `Storage`
//! trait over a single production Postgres implementation.

pub mod postgres;

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::models::{
    ApiKeyRecord, ClusterMetrics, CveFindingResponse, ExcludedNamespace, ExcludedPod,
    ExcludedRule, LlmConfig, MetricsHistoryPoint, NotificationSetting, PodFailureCreate,
    PodFailureResponse, PodFailureStatus, SecurityFindingCreate, SecurityFindingResponse,
    Severity, TrustedRegistry,
};

/// Filter accepted by [`Storage::list_pod_failures`] and the `GET
/// /api/pods/failed` route.
#[derive(Debug, Clone, Default)]
pub struct PodFailureFilter {
    pub status: Option<PodFailureStatus>,
    pub namespace: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default)]
pub struct SecurityFindingFilter {
    pub namespace: Option<String>,
    pub severity: Option<Severity>,
    pub include_dismissed: bool,
    pub limit: i64,
    pub offset: i64,
}

/// All storage operations the backend needs, spanning the ingest,
/// lifecycle, exclusion, and settings surfaces. Held behind
/// `Arc<dyn Storage>` in `AppState` so routes never know which backing
/// store they're talking to.
#[async_trait]
pub trait Storage: Send + Sync {
    // ---- pod failures ----------------------------------------------------

    /// Upserts by `(pod_name, namespace)`: at most one active row exists
    /// per pod, so a pod already `new`/`investigating` is updated in place
    /// instead of duplicated.
    async fn save_pod_failure(&self, create: PodFailureCreate) -> CoreResult<PodFailureResponse>;

    async fn list_pod_failures(
        &self,
        filter: PodFailureFilter,
    ) -> CoreResult<Vec<PodFailureResponse>>;

    async fn get_pod_failure(&self, id: i64) -> CoreResult<PodFailureResponse>;

    /// Validates the transition against [`PodFailureStatus::can_transition_to`]
    /// before writing; callers get [`crate::error::CoreError::InvalidTransition`]
    /// on a rejected edge.
    async fn update_pod_failure_status(
        &self,
        id: i64,
        next: PodFailureStatus,
        resolution_note: Option<String>,
    ) -> CoreResult<PodFailureResponse>;

    async fn update_pod_failure_solution(&self, id: i64, solution: String) -> CoreResult<()>;

    /// Marks every active row for `pod_name`/`namespace` resolved because
    /// the agent no longer observes the pod, mirroring
    /// `dismiss_deleted_pod` in the source mixin. Returns the updated row,
    /// if one existed.
    async fn dismiss_deleted_pod(
        &self,
        pod_name: &str,
        namespace: &str,
    ) -> CoreResult<Option<PodFailureResponse>>;

    async fn delete_pod_failure(&self, id: i64) -> CoreResult<()>;

    /// Deletes `resolved` rows older than `older_than_minutes`. Returns the
    /// number of rows removed.
    async fn cleanup_old_resolved_pods(&self, older_than_minutes: i64) -> CoreResult<u64>;

    /// Deletes `ignored` rows older than `older_than_minutes`.
    async fn cleanup_old_ignored_pods(&self, older_than_minutes: i64) -> CoreResult<u64>;

    // ---- security findings ------------------------------------------------

    /// Upserts on the identity `(namespace, resource_name, title)` among
    /// non-dismissed rows. Returns the stored row and whether it was newly
    /// inserted, so callers only broadcast genuinely new findings.
    async fn save_security_finding(
        &self,
        create: SecurityFindingCreate,
    ) -> CoreResult<(SecurityFindingResponse, bool)>;

    async fn list_security_findings(
        &self,
        filter: SecurityFindingFilter,
    ) -> CoreResult<Vec<SecurityFindingResponse>>;

    async fn dismiss_security_finding(&self, id: i64) -> CoreResult<()>;

    /// Deletes findings tied to a resource that no longer exists. Driven by
    /// the scanner's delete-watch events.
    async fn delete_findings_by_resource(
        &self,
        resource_type: &str,
        resource_name: &str,
        namespace: &str,
    ) -> CoreResult<u64>;

    async fn delete_findings_by_namespace(&self, namespace: &str) -> CoreResult<u64>;

    /// Deletes `Pod`-kind findings for `pod_name` across all namespaces,
    /// driven by the cascading delete on `POST /api/admin/excluded-pods`:
    /// adding an exclusion deletes all matching findings.
    async fn delete_findings_by_pod_name(&self, pod_name: &str) -> CoreResult<u64>;

    /// `POST /api/security/scan/clear`: drops every non-dismissed finding,
    /// run once at scanner startup before the first full sweep.
    async fn clear_all_security_findings(&self) -> CoreResult<u64>;

    /// Deletes findings whose title matches `rule_title` under the
    /// base-name rule (`title == rule_title || title.starts_with("rule_title: ")`),
    /// scoped to `namespace` when given, global otherwise.
    async fn delete_findings_by_rule_title(
        &self,
        rule_title: &str,
        namespace: Option<&str>,
    ) -> CoreResult<u64>;

    // ---- CVE findings -------------------------------------------------------

    async fn save_cve_finding(&self, finding: CveFindingResponse) -> CoreResult<CveFindingResponse>;

    async fn list_cve_findings(&self, include_dismissed: bool) -> CoreResult<Vec<CveFindingResponse>>;

    async fn dismiss_cve_finding(&self, id: i64) -> CoreResult<()>;

    // ---- exclusions ---------------------------------------------------------

    async fn list_excluded_namespaces(&self) -> CoreResult<Vec<ExcludedNamespace>>;
    async fn add_excluded_namespace(&self, namespace: &str) -> CoreResult<ExcludedNamespace>;
    async fn remove_excluded_namespace(&self, namespace: &str) -> CoreResult<()>;

    async fn list_excluded_pods(&self) -> CoreResult<Vec<ExcludedPod>>;
    async fn add_excluded_pod(&self, pod_name: &str) -> CoreResult<ExcludedPod>;
    async fn remove_excluded_pod(&self, pod_name: &str) -> CoreResult<()>;

    async fn list_excluded_rules(&self) -> CoreResult<Vec<ExcludedRule>>;
    /// `namespace` of `""` excludes the rule cluster-wide.
    async fn add_excluded_rule(&self, rule_title: &str, namespace: &str) -> CoreResult<ExcludedRule>;
    async fn remove_excluded_rule(&self, rule_title: &str, namespace: &str) -> CoreResult<()>;

    async fn list_trusted_registries(&self) -> CoreResult<Vec<TrustedRegistry>>;
    async fn add_trusted_registry(&self, registry: &str) -> CoreResult<TrustedRegistry>;
    async fn remove_trusted_registry(&self, registry: &str) -> CoreResult<()>;

    // ---- settings, api keys, notifications, llm config -----------------------

    async fn get_app_setting(&self, key: &str) -> CoreResult<Option<String>>;
    async fn set_app_setting(&self, key: &str, value: &str) -> CoreResult<()>;

    async fn list_api_keys(&self) -> CoreResult<Vec<ApiKeyRecord>>;
    async fn create_api_key(&self, label: &str, key_hash: &str) -> CoreResult<ApiKeyRecord>;
    async fn revoke_api_key(&self, id: i64) -> CoreResult<()>;
    async fn touch_api_key_last_used(&self, id: i64) -> CoreResult<()>;

    async fn list_notification_settings(&self) -> CoreResult<Vec<NotificationSetting>>;
    async fn upsert_notification_setting(
        &self,
        provider: &str,
        enabled: bool,
        config: serde_json::Value,
    ) -> CoreResult<NotificationSetting>;

    async fn get_llm_config(&self) -> CoreResult<Option<LlmConfig>>;
    async fn set_llm_config(&self, config: LlmConfig) -> CoreResult<()>;
    async fn clear_llm_config(&self) -> CoreResult<()>;

    // ---- cluster metrics history ---------------------------------------------

    /// Persists the latest snapshot and appends to the bounded per-pod
    /// history ring (`METRICS_HISTORY_CAPACITY`).
    async fn save_cluster_metrics(&self, metrics: &ClusterMetrics) -> CoreResult<()>;
    async fn latest_cluster_metrics(&self) -> CoreResult<Option<ClusterMetrics>>;
    async fn metrics_history(
        &self,
        namespace: &str,
        pod_name: &str,
    ) -> CoreResult<Vec<MetricsHistoryPoint>>;
    async fn append_metrics_history(
        &self,
        namespace: &str,
        pod_name: &str,
        point: MetricsHistoryPoint,
    ) -> CoreResult<()>;
}

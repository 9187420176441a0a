//! Postgres-backed [`Storage`]. SQL text follows the shape of the mixins
//! under `original_source/backend/database/mixins/`, translated from
//! psycopg's `%s` placeholders to sqlx's `$n` and from hand-rolled upsert
//! `SELECT ... FOR UPDATE` + branch logic to `ON CONFLICT`.
//!
//! Schema is created by the migrations embedded at `migrations/`, applied
//! from `main.rs` via `sqlx::migrate!` on startup before serving traffic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use super::{PodFailureFilter, SecurityFindingFilter, Storage};
use crate::error::{CoreError, CoreResult};
use crate::models::{
    ApiKeyRecord, ClusterMetrics, ContainerStatus, CveFindingResponse, ExcludedNamespace,
    ExcludedPod, ExcludedRule, LlmConfig, MetricsHistoryPoint, NotificationSetting, PodEvent,
    PodFailureCreate, PodFailureResponse, PodFailureStatus, SecurityFindingCreate,
    SecurityFindingResponse, Severity, TrustedRegistry, METRICS_HISTORY_CAPACITY,
};

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(PostgresStorage { pool })
    }

    #[cfg(test)]
    pub fn from_pool(pool: PgPool) -> Self {
        PostgresStorage { pool }
    }
}

fn pod_failure_from_row(row: &sqlx::postgres::PgRow) -> CoreResult<PodFailureResponse> {
    let status_str: String = row.try_get("status")?;
    let container_statuses: serde_json::Value = row.try_get("container_statuses")?;
    let events: serde_json::Value = row.try_get("events")?;
    Ok(PodFailureResponse {
        id: row.try_get("id")?,
        pod_name: row.try_get("pod_name")?,
        namespace: row.try_get("namespace")?,
        node_name: row.try_get("node_name")?,
        phase: row.try_get("phase")?,
        creation_timestamp: row.try_get("creation_timestamp")?,
        failure_reason: row.try_get("failure_reason")?,
        failure_message: row.try_get("failure_message")?,
        container_statuses: serde_json::from_value::<Vec<ContainerStatus>>(container_statuses)
            .map_err(|e| CoreError::internal(anyhow::anyhow!(e)))?,
        events: serde_json::from_value::<Vec<PodEvent>>(events)
            .map_err(|e| CoreError::internal(anyhow::anyhow!(e)))?,
        logs: row.try_get("logs")?,
        manifest: row.try_get("manifest")?,
        solution: row.try_get("solution")?,
        timestamp: row.try_get("timestamp")?,
        status: PodFailureStatus::parse(&status_str)
            .ok_or_else(|| CoreError::internal(anyhow::anyhow!("bad status in row: {status_str}")))?,
        resolved_at: row.try_get("resolved_at")?,
        resolution_note: row.try_get("resolution_note")?,
    })
}

fn finding_from_row(row: &sqlx::postgres::PgRow) -> CoreResult<SecurityFindingResponse> {
    let severity_str: String = row.try_get("severity")?;
    Ok(SecurityFindingResponse {
        id: row.try_get("id")?,
        resource_type: row.try_get("resource_type")?,
        resource_name: row.try_get("resource_name")?,
        namespace: row.try_get("namespace")?,
        severity: Severity::parse(&severity_str)
            .ok_or_else(|| CoreError::internal(anyhow::anyhow!("bad severity in row: {severity_str}")))?,
        category: row.try_get("category")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        remediation: row.try_get("remediation")?,
        timestamp: row.try_get("timestamp")?,
        dismissed: row.try_get("dismissed")?,
        manifest: row.try_get("manifest")?,
    })
}

/// Base-name rule-title predicate shared by the scanner's exclusion cache
/// and the backend's bulk-delete-on-exclude path: a concrete finding
/// title matches an exclusion entry either exactly or as
/// `"{excluded}: {detail}"`.
fn rule_title_like_pattern(rule_title: &str) -> String {
    format!("{rule_title}: %")
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn save_pod_failure(&self, create: PodFailureCreate) -> CoreResult<PodFailureResponse> {
        let container_statuses = serde_json::to_value(&create.container_statuses)
            .map_err(|e| CoreError::internal(anyhow::anyhow!(e)))?;
        let events = serde_json::to_value(&create.events)
            .map_err(|e| CoreError::internal(anyhow::anyhow!(e)))?;
        let creation_timestamp: DateTime<Utc> = create
            .creation_timestamp
            .parse()
            .map_err(|_| CoreError::Validation("creation_timestamp must be RFC3339".into()))?;

        let row = sqlx::query(
            r#"
            INSERT INTO pod_failures
                (pod_name, namespace, node_name, phase, creation_timestamp, failure_reason,
                 failure_message, container_statuses, events, logs, manifest, solution,
                 timestamp, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, '', now(), 'new')
            ON CONFLICT (pod_name, namespace) WHERE status IN ('new', 'investigating')
            DO UPDATE SET
                node_name = EXCLUDED.node_name,
                phase = EXCLUDED.phase,
                failure_reason = EXCLUDED.failure_reason,
                failure_message = EXCLUDED.failure_message,
                container_statuses = EXCLUDED.container_statuses,
                events = EXCLUDED.events,
                logs = EXCLUDED.logs,
                manifest = EXCLUDED.manifest,
                timestamp = now()
            RETURNING *
            "#,
        )
        .bind(&create.pod_name)
        .bind(&create.namespace)
        .bind(&create.node_name)
        .bind(&create.phase)
        .bind(creation_timestamp)
        .bind(&create.failure_reason)
        .bind(&create.failure_message)
        .bind(container_statuses)
        .bind(events)
        .bind(&create.logs)
        .bind(&create.manifest)
        .fetch_one(&self.pool)
        .await?;

        pod_failure_from_row(&row)
    }

    async fn list_pod_failures(
        &self,
        filter: PodFailureFilter,
    ) -> CoreResult<Vec<PodFailureResponse>> {
        let limit = if filter.limit > 0 { filter.limit } else { 100 };
        let rows = sqlx::query(
            r#"
            SELECT * FROM pod_failures
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR namespace = $2)
            ORDER BY timestamp DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.status.map(|s| s.as_str().to_string()))
        .bind(filter.namespace)
        .bind(limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(pod_failure_from_row).collect()
    }

    async fn get_pod_failure(&self, id: i64) -> CoreResult<PodFailureResponse> {
        let row = sqlx::query("SELECT * FROM pod_failures WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("pod failure {id}")))?;
        pod_failure_from_row(&row)
    }

    async fn update_pod_failure_status(
        &self,
        id: i64,
        next: PodFailureStatus,
        resolution_note: Option<String>,
    ) -> CoreResult<PodFailureResponse> {
        let current = self.get_pod_failure(id).await?;
        if !current.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: current.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }

        let resolved_at = matches!(next, PodFailureStatus::Resolved).then(chrono::Utc::now);
        let row = sqlx::query(
            r#"
            UPDATE pod_failures
            SET status = $1, resolution_note = $2, resolved_at = $3
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(next.as_str())
        .bind(&resolution_note)
        .bind(resolved_at)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        pod_failure_from_row(&row)
    }

    async fn update_pod_failure_solution(&self, id: i64, solution: String) -> CoreResult<()> {
        sqlx::query("UPDATE pod_failures SET solution = $1 WHERE id = $2")
            .bind(solution)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn dismiss_deleted_pod(
        &self,
        pod_name: &str,
        namespace: &str,
    ) -> CoreResult<Option<PodFailureResponse>> {
        let row = sqlx::query(
            r#"
            UPDATE pod_failures
            SET status = 'resolved', resolved_at = now(), resolution_note = 'pod no longer present'
            WHERE pod_name = $1 AND namespace = $2 AND status IN ('new', 'investigating')
            RETURNING *
            "#,
        )
        .bind(pod_name)
        .bind(namespace)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(pod_failure_from_row).transpose()
    }

    async fn delete_pod_failure(&self, id: i64) -> CoreResult<()> {
        sqlx::query("DELETE FROM pod_failures WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cleanup_old_resolved_pods(&self, older_than_minutes: i64) -> CoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM pod_failures WHERE status = 'resolved' AND resolved_at < now() - ($1 || ' minutes')::interval",
        )
        .bind(older_than_minutes)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn cleanup_old_ignored_pods(&self, older_than_minutes: i64) -> CoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM pod_failures WHERE status = 'ignored' AND timestamp < now() - ($1 || ' minutes')::interval",
        )
        .bind(older_than_minutes)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn save_security_finding(
        &self,
        create: SecurityFindingCreate,
    ) -> CoreResult<(SecurityFindingResponse, bool)> {
        let severity = create.severity.as_str();
        let existing = sqlx::query(
            r#"
            SELECT id FROM security_findings
            WHERE namespace = $1 AND resource_name = $2 AND title = $3 AND dismissed = false
            "#,
        )
        .bind(&create.namespace)
        .bind(&create.resource_name)
        .bind(&create.title)
        .fetch_optional(&self.pool)
        .await?;

        let is_new = existing.is_none();
        let row = if let Some(existing) = existing {
            let id: i64 = existing.try_get("id")?;
            sqlx::query(
                r#"
                UPDATE security_findings
                SET severity = $1, category = $2, description = $3, remediation = $4,
                    manifest = $5, timestamp = now(), resource_type = $6
                WHERE id = $7
                RETURNING *
                "#,
            )
            .bind(severity)
            .bind(&create.category)
            .bind(&create.description)
            .bind(&create.remediation)
            .bind(&create.manifest)
            .bind(&create.resource_type)
            .bind(id)
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                INSERT INTO security_findings
                    (resource_type, resource_name, namespace, severity, category, title,
                     description, remediation, manifest, timestamp, dismissed)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), false)
                RETURNING *
                "#,
            )
            .bind(&create.resource_type)
            .bind(&create.resource_name)
            .bind(&create.namespace)
            .bind(severity)
            .bind(&create.category)
            .bind(&create.title)
            .bind(&create.description)
            .bind(&create.remediation)
            .bind(&create.manifest)
            .fetch_one(&self.pool)
            .await?
        };

        Ok((finding_from_row(&row)?, is_new))
    }

    async fn list_security_findings(
        &self,
        filter: SecurityFindingFilter,
    ) -> CoreResult<Vec<SecurityFindingResponse>> {
        let limit = if filter.limit > 0 { filter.limit } else { 200 };
        let rows = sqlx::query(
            r#"
            SELECT * FROM security_findings
            WHERE ($1::text IS NULL OR namespace = $1)
              AND ($2::text IS NULL OR severity = $2)
              AND (dismissed = false OR $3)
            ORDER BY timestamp DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.namespace)
        .bind(filter.severity.map(|s| s.as_str().to_string()))
        .bind(filter.include_dismissed)
        .bind(limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(finding_from_row).collect()
    }

    async fn dismiss_security_finding(&self, id: i64) -> CoreResult<()> {
        sqlx::query("UPDATE security_findings SET dismissed = true WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_findings_by_resource(
        &self,
        resource_type: &str,
        resource_name: &str,
        namespace: &str,
    ) -> CoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM security_findings WHERE resource_type = $1 AND resource_name = $2 AND namespace = $3",
        )
        .bind(resource_type)
        .bind(resource_name)
        .bind(namespace)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_findings_by_namespace(&self, namespace: &str) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM security_findings WHERE namespace = $1")
            .bind(namespace)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_findings_by_pod_name(&self, pod_name: &str) -> CoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM security_findings WHERE resource_type = 'Pod' AND resource_name = $1",
        )
        .bind(pod_name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn clear_all_security_findings(&self) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM security_findings WHERE dismissed = false")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_findings_by_rule_title(
        &self,
        rule_title: &str,
        namespace: Option<&str>,
    ) -> CoreResult<u64> {
        let like = rule_title_like_pattern(rule_title);
        let result = sqlx::query(
            r#"
            DELETE FROM security_findings
            WHERE (title = $1 OR title LIKE $2)
              AND ($3::text IS NULL OR namespace = $3)
            "#,
        )
        .bind(rule_title)
        .bind(like)
        .bind(namespace)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn save_cve_finding(&self, finding: CveFindingResponse) -> CoreResult<CveFindingResponse> {
        let row = sqlx::query(
            r#"
            INSERT INTO cve_findings
                (resource_type, resource_name, namespace, package, installed_version,
                 fixed_version, cve_id, cvss_score, severity, timestamp, dismissed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), false)
            ON CONFLICT (namespace, resource_name, package, cve_id) WHERE dismissed = false
            DO UPDATE SET cvss_score = EXCLUDED.cvss_score, timestamp = now()
            RETURNING *
            "#,
        )
        .bind(&finding.resource_type)
        .bind(&finding.resource_name)
        .bind(&finding.namespace)
        .bind(&finding.package)
        .bind(&finding.installed_version)
        .bind(&finding.fixed_version)
        .bind(&finding.cve_id)
        .bind(finding.cvss_score)
        .bind(finding.severity.as_str())
        .fetch_one(&self.pool)
        .await?;

        let severity_str: String = row.try_get("severity")?;
        Ok(CveFindingResponse {
            id: row.try_get("id")?,
            resource_type: row.try_get("resource_type")?,
            resource_name: row.try_get("resource_name")?,
            namespace: row.try_get("namespace")?,
            package: row.try_get("package")?,
            installed_version: row.try_get("installed_version")?,
            fixed_version: row.try_get("fixed_version")?,
            cve_id: row.try_get("cve_id")?,
            cvss_score: row.try_get("cvss_score")?,
            severity: Severity::parse(&severity_str)
                .ok_or_else(|| CoreError::internal(anyhow::anyhow!("bad severity")))?,
            timestamp: row.try_get("timestamp")?,
            dismissed: row.try_get("dismissed")?,
        })
    }

    async fn list_cve_findings(&self, include_dismissed: bool) -> CoreResult<Vec<CveFindingResponse>> {
        let rows = sqlx::query(
            "SELECT * FROM cve_findings WHERE dismissed = false OR $1 ORDER BY cvss_score DESC NULLS LAST",
        )
        .bind(include_dismissed)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let severity_str: String = row.try_get("severity")?;
                Ok(CveFindingResponse {
                    id: row.try_get("id")?,
                    resource_type: row.try_get("resource_type")?,
                    resource_name: row.try_get("resource_name")?,
                    namespace: row.try_get("namespace")?,
                    package: row.try_get("package")?,
                    installed_version: row.try_get("installed_version")?,
                    fixed_version: row.try_get("fixed_version")?,
                    cve_id: row.try_get("cve_id")?,
                    cvss_score: row.try_get("cvss_score")?,
                    severity: Severity::parse(&severity_str)
                        .ok_or_else(|| CoreError::internal(anyhow::anyhow!("bad severity")))?,
                    timestamp: row.try_get("timestamp")?,
                    dismissed: row.try_get("dismissed")?,
                })
            })
            .collect()
    }

    async fn dismiss_cve_finding(&self, id: i64) -> CoreResult<()> {
        sqlx::query("UPDATE cve_findings SET dismissed = true WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_excluded_namespaces(&self) -> CoreResult<Vec<ExcludedNamespace>> {
        let rows = sqlx::query_as::<_, (i64, String, DateTime<Utc>)>(
            "SELECT id, namespace, created_at FROM excluded_namespaces ORDER BY namespace",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, namespace, created_at)| ExcludedNamespace { id, namespace, created_at })
            .collect())
    }

    async fn add_excluded_namespace(&self, namespace: &str) -> CoreResult<ExcludedNamespace> {
        let (id, namespace, created_at) = sqlx::query_as::<_, (i64, String, DateTime<Utc>)>(
            r#"
            INSERT INTO excluded_namespaces (namespace, created_at) VALUES ($1, now())
            ON CONFLICT (namespace) DO UPDATE SET namespace = EXCLUDED.namespace
            RETURNING id, namespace, created_at
            "#,
        )
        .bind(namespace)
        .fetch_one(&self.pool)
        .await?;
        Ok(ExcludedNamespace { id, namespace, created_at })
    }

    async fn remove_excluded_namespace(&self, namespace: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM excluded_namespaces WHERE namespace = $1")
            .bind(namespace)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_excluded_pods(&self) -> CoreResult<Vec<ExcludedPod>> {
        let rows = sqlx::query_as::<_, (i64, String, DateTime<Utc>)>(
            "SELECT id, pod_name, created_at FROM excluded_pods ORDER BY pod_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, pod_name, created_at)| ExcludedPod { id, pod_name, created_at })
            .collect())
    }

    async fn add_excluded_pod(&self, pod_name: &str) -> CoreResult<ExcludedPod> {
        let (id, pod_name, created_at) = sqlx::query_as::<_, (i64, String, DateTime<Utc>)>(
            r#"
            INSERT INTO excluded_pods (pod_name, created_at) VALUES ($1, now())
            ON CONFLICT (pod_name) DO UPDATE SET pod_name = EXCLUDED.pod_name
            RETURNING id, pod_name, created_at
            "#,
        )
        .bind(pod_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(ExcludedPod { id, pod_name, created_at })
    }

    async fn remove_excluded_pod(&self, pod_name: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM excluded_pods WHERE pod_name = $1")
            .bind(pod_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_excluded_rules(&self) -> CoreResult<Vec<ExcludedRule>> {
        let rows = sqlx::query_as::<_, (i64, String, String, DateTime<Utc>)>(
            "SELECT id, rule_title, namespace, created_at FROM excluded_rules ORDER BY rule_title",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, rule_title, namespace, created_at)| ExcludedRule {
                id,
                rule_title,
                namespace,
                created_at,
            })
            .collect())
    }

    async fn add_excluded_rule(&self, rule_title: &str, namespace: &str) -> CoreResult<ExcludedRule> {
        let (id, rule_title, namespace, created_at) =
            sqlx::query_as::<_, (i64, String, String, DateTime<Utc>)>(
                r#"
                INSERT INTO excluded_rules (rule_title, namespace, created_at) VALUES ($1, $2, now())
                ON CONFLICT (rule_title, namespace) DO UPDATE SET rule_title = EXCLUDED.rule_title
                RETURNING id, rule_title, namespace, created_at
                "#,
            )
            .bind(rule_title)
            .bind(namespace)
            .fetch_one(&self.pool)
            .await?;
        Ok(ExcludedRule { id, rule_title, namespace, created_at })
    }

    async fn remove_excluded_rule(&self, rule_title: &str, namespace: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM excluded_rules WHERE rule_title = $1 AND namespace = $2")
            .bind(rule_title)
            .bind(namespace)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_trusted_registries(&self) -> CoreResult<Vec<TrustedRegistry>> {
        let rows = sqlx::query_as::<_, (i64, String, DateTime<Utc>)>(
            "SELECT id, registry, created_at FROM trusted_registries ORDER BY registry",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, registry, created_at)| TrustedRegistry { id, registry, created_at })
            .collect())
    }

    async fn add_trusted_registry(&self, registry: &str) -> CoreResult<TrustedRegistry> {
        let (id, registry, created_at) = sqlx::query_as::<_, (i64, String, DateTime<Utc>)>(
            r#"
            INSERT INTO trusted_registries (registry, created_at) VALUES ($1, now())
            ON CONFLICT (registry) DO UPDATE SET registry = EXCLUDED.registry
            RETURNING id, registry, created_at
            "#,
        )
        .bind(registry)
        .fetch_one(&self.pool)
        .await?;
        Ok(TrustedRegistry { id, registry, created_at })
    }

    async fn remove_trusted_registry(&self, registry: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM trusted_registries WHERE registry = $1")
            .bind(registry)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_app_setting(&self, key: &str) -> CoreResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM app_settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get::<String, _>("value")).transpose().map_err(CoreError::from)
    }

    async fn set_app_setting(&self, key: &str, value: &str) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO app_settings (key, value) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_api_keys(&self) -> CoreResult<Vec<ApiKeyRecord>> {
        let rows = sqlx::query(
            "SELECT id, label, created_at, last_used_at, revoked FROM api_keys ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(ApiKeyRecord {
                    id: row.try_get("id")?,
                    label: row.try_get("label")?,
                    created_at: row.try_get("created_at")?,
                    last_used_at: row.try_get("last_used_at")?,
                    revoked: row.try_get("revoked")?,
                })
            })
            .collect()
    }

    async fn create_api_key(&self, label: &str, key_hash: &str) -> CoreResult<ApiKeyRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO api_keys (label, key_hash, created_at, revoked)
            VALUES ($1, $2, now(), false)
            RETURNING id, label, created_at, last_used_at, revoked
            "#,
        )
        .bind(label)
        .bind(key_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(ApiKeyRecord {
            id: row.try_get("id")?,
            label: row.try_get("label")?,
            created_at: row.try_get("created_at")?,
            last_used_at: row.try_get("last_used_at")?,
            revoked: row.try_get("revoked")?,
        })
    }

    async fn revoke_api_key(&self, id: i64) -> CoreResult<()> {
        sqlx::query("UPDATE api_keys SET revoked = true WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_api_key_last_used(&self, id: i64) -> CoreResult<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_notification_settings(&self) -> CoreResult<Vec<NotificationSetting>> {
        let rows = sqlx::query(
            "SELECT id, provider, enabled, config, created_at, updated_at FROM notification_settings ORDER BY provider",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(NotificationSetting {
                    id: row.try_get("id")?,
                    provider: row.try_get("provider")?,
                    enabled: row.try_get("enabled")?,
                    config: row.try_get("config")?,
                    created_at: row.try_get("created_at")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }

    async fn upsert_notification_setting(
        &self,
        provider: &str,
        enabled: bool,
        config: serde_json::Value,
    ) -> CoreResult<NotificationSetting> {
        let row = sqlx::query(
            r#"
            INSERT INTO notification_settings (provider, enabled, config, created_at, updated_at)
            VALUES ($1, $2, $3, now(), now())
            ON CONFLICT (provider) DO UPDATE SET
                enabled = EXCLUDED.enabled, config = EXCLUDED.config, updated_at = now()
            RETURNING id, provider, enabled, config, created_at, updated_at
            "#,
        )
        .bind(provider)
        .bind(enabled)
        .bind(config)
        .fetch_one(&self.pool)
        .await?;
        Ok(NotificationSetting {
            id: row.try_get("id")?,
            provider: row.try_get("provider")?,
            enabled: row.try_get("enabled")?,
            config: row.try_get("config")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn get_llm_config(&self) -> CoreResult<Option<LlmConfig>> {
        let row = sqlx::query(
            "SELECT provider, api_key_encrypted, model, base_url FROM llm_config WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            Ok(LlmConfig {
                provider: row.try_get("provider")?,
                api_key_encrypted: row.try_get("api_key_encrypted")?,
                model: row.try_get("model")?,
                base_url: row.try_get("base_url")?,
            })
        })
        .transpose()
    }

    async fn set_llm_config(&self, config: LlmConfig) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO llm_config (id, provider, api_key_encrypted, model, base_url)
            VALUES (1, $1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                provider = EXCLUDED.provider,
                api_key_encrypted = EXCLUDED.api_key_encrypted,
                model = EXCLUDED.model,
                base_url = EXCLUDED.base_url
            "#,
        )
        .bind(&config.provider)
        .bind(&config.api_key_encrypted)
        .bind(&config.model)
        .bind(&config.base_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_llm_config(&self) -> CoreResult<()> {
        sqlx::query("DELETE FROM llm_config WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_cluster_metrics(&self, metrics: &ClusterMetrics) -> CoreResult<()> {
        let payload = serde_json::to_value(metrics).map_err(|e| CoreError::internal(anyhow::anyhow!(e)))?;
        sqlx::query(
            r#"
            INSERT INTO cluster_metrics_latest (id, payload, timestamp)
            VALUES (1, $1, $2)
            ON CONFLICT (id) DO UPDATE SET payload = EXCLUDED.payload, timestamp = EXCLUDED.timestamp
            "#,
        )
        .bind(payload)
        .bind(metrics.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_cluster_metrics(&self) -> CoreResult<Option<ClusterMetrics>> {
        let row = sqlx::query("SELECT payload FROM cluster_metrics_latest WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            let payload: serde_json::Value = row.try_get("payload")?;
            serde_json::from_value(payload).map_err(|e| CoreError::internal(anyhow::anyhow!(e)))
        })
        .transpose()
    }

    async fn metrics_history(
        &self,
        namespace: &str,
        pod_name: &str,
    ) -> CoreResult<Vec<MetricsHistoryPoint>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, cpu_usage_percent, memory_usage_percent
            FROM pod_metrics_history
            WHERE namespace = $1 AND pod_name = $2
            ORDER BY timestamp ASC
            "#,
        )
        .bind(namespace)
        .bind(pod_name)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(MetricsHistoryPoint {
                    timestamp: row.try_get("timestamp")?,
                    cpu_usage_percent: row.try_get("cpu_usage_percent")?,
                    memory_usage_percent: row.try_get("memory_usage_percent")?,
                })
            })
            .collect()
    }

    async fn append_metrics_history(
        &self,
        namespace: &str,
        pod_name: &str,
        point: MetricsHistoryPoint,
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO pod_metrics_history (namespace, pod_name, timestamp, cpu_usage_percent, memory_usage_percent)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(namespace)
        .bind(pod_name)
        .bind(point.timestamp)
        .bind(point.cpu_usage_percent)
        .bind(point.memory_usage_percent)
        .execute(&mut *tx)
        .await?;

        // Keep only the newest METRICS_HISTORY_CAPACITY rows per pod.
        sqlx::query(
            r#"
            DELETE FROM pod_metrics_history
            WHERE namespace = $1 AND pod_name = $2
              AND timestamp < (
                  SELECT timestamp FROM pod_metrics_history
                  WHERE namespace = $1 AND pod_name = $2
                  ORDER BY timestamp DESC
                  OFFSET $3 LIMIT 1
              )
            "#,
        )
        .bind(namespace)
        .bind(pod_name)
        .bind(METRICS_HISTORY_CAPACITY as i64 - 1)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

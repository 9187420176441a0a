//! Domain entities, ported field-for-field from the Pydantic
//! models in `original_source/backend/models/models.py`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pod failure lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PodFailureStatus {
    New,
    Investigating,
    Resolved,
    Ignored,
}

impl PodFailureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodFailureStatus::New => "new",
            PodFailureStatus::Investigating => "investigating",
            PodFailureStatus::Resolved => "resolved",
            PodFailureStatus::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(PodFailureStatus::New),
            "investigating" => Some(PodFailureStatus::Investigating),
            "resolved" => Some(PodFailureStatus::Resolved),
            "ignored" => Some(PodFailureStatus::Ignored),
            _ => None,
        }
    }

    /// `true` for the two statuses that count as "active" — at most one
    /// active record should exist per pod at a time.
    pub fn is_active(&self) -> bool {
        matches!(self, PodFailureStatus::New | PodFailureStatus::Investigating)
    }

    /// Validates a transition against the graph:
    /// `new -> investigating -> resolved`, `investigating -> ignored`,
    /// `ignored -> new`. `resolved` is terminal; anything not in the graph
    /// is rejected.
    pub fn can_transition_to(&self, next: PodFailureStatus) -> bool {
        use PodFailureStatus::*;
        matches!(
            (self, next),
            (New, Investigating)
                | (New, Ignored)
                | (Investigating, Resolved)
                | (Investigating, Ignored)
                | (Ignored, New)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub ready: bool,
    pub restart_count: i32,
    pub image: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub reason: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Inbound payload for `POST /api/pods/failed` (agent ingest).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodFailureCreate {
    pub pod_name: String,
    pub namespace: String,
    #[serde(default)]
    pub node_name: Option<String>,
    pub phase: String,
    pub creation_timestamp: String,
    pub failure_reason: String,
    #[serde(default)]
    pub failure_message: Option<String>,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
    #[serde(default)]
    pub events: Vec<PodEvent>,
    #[serde(default)]
    pub logs: String,
    #[serde(default)]
    pub manifest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodFailureResponse {
    pub id: i64,
    pub pod_name: String,
    pub namespace: String,
    pub node_name: Option<String>,
    pub phase: String,
    pub creation_timestamp: DateTime<Utc>,
    pub failure_reason: String,
    pub failure_message: Option<String>,
    pub container_statuses: Vec<ContainerStatus>,
    pub events: Vec<PodEvent>,
    pub logs: String,
    pub manifest: String,
    pub solution: String,
    pub timestamp: DateTime<Utc>,
    pub status: PodFailureStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_note: Option<String>,
}

impl PodFailureResponse {
    /// Backward-compatible `dismissed` flag some clients still read: true
    /// once the record has left the `new`/`investigating` pair.
    pub fn dismissed(&self) -> bool {
        !self.status.is_active()
    }
}

/// Severity ordering: critical > high > medium > low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    Security,
    BestPractice,
    Compliance,
}

impl FindingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingCategory::Security => "Security",
            FindingCategory::BestPractice => "Best Practice",
            FindingCategory::Compliance => "Compliance",
        }
    }
}

/// Inbound payload for `POST /api/security/findings` (scanner ingest).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityFindingCreate {
    pub resource_type: String,
    pub resource_name: String,
    pub namespace: String,
    pub severity: Severity,
    pub category: String,
    pub title: String,
    pub description: String,
    pub remediation: String,
    pub timestamp: String,
    #[serde(default)]
    pub manifest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityFindingResponse {
    pub id: i64,
    pub resource_type: String,
    pub resource_name: String,
    pub namespace: String,
    pub severity: Severity,
    pub category: String,
    pub title: String,
    pub description: String,
    pub remediation: String,
    pub timestamp: DateTime<Utc>,
    pub dismissed: bool,
    pub manifest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CveFindingResponse {
    pub id: i64,
    pub resource_type: String,
    pub resource_name: String,
    pub namespace: String,
    pub package: String,
    pub installed_version: String,
    pub fixed_version: Option<String>,
    pub cve_id: String,
    pub cvss_score: Option<f64>,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub dismissed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedNamespace {
    pub id: i64,
    pub namespace: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedPod {
    pub id: i64,
    pub pod_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedRule {
    pub id: i64,
    pub rule_title: String,
    /// Empty string means a global exclusion rather than a namespace-scoped one.
    pub namespace: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedRegistry {
    pub id: i64,
    pub registry: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: i64,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSetting {
    pub id: i64,
    pub provider: String,
    pub enabled: bool,
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    /// Ciphertext, base64-encoded; see `kure_core::crypto`.
    pub api_key_encrypted: String,
    pub model: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub name: String,
    pub cpu_capacity: String,
    pub cpu_allocatable: String,
    pub cpu_usage: Option<String>,
    pub memory_capacity: String,
    pub memory_allocatable: String,
    pub memory_usage: Option<String>,
    #[serde(default)]
    pub conditions: Vec<serde_json::Value>,
    pub pods_count: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub node: String,
    pub status: String,
    pub ready: bool,
    pub restarts: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterMetrics {
    pub node_count: i32,
    pub nodes: Vec<NodeMetrics>,
    pub total_cpu_capacity: String,
    pub total_cpu_allocatable: String,
    pub cpu_usage_percent: Option<f64>,
    pub total_memory_capacity: String,
    pub total_memory_allocatable: String,
    pub memory_usage_percent: Option<f64>,
    pub total_pods: Option<i32>,
    #[serde(default)]
    pub pods: Vec<PodInfo>,
    pub metrics_available: bool,
    pub timestamp: DateTime<Utc>,
}

/// One point in the bounded 15-sample ring kept per `(namespace, pod_name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsHistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub cpu_usage_percent: Option<f64>,
    pub memory_usage_percent: Option<f64>,
}

pub const METRICS_HISTORY_CAPACITY: usize = 15;

/// WebSocket / broadcast envelope: `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Envelope { kind: kind.into(), data }
    }
}

pub mod app_settings {
    pub const HISTORY_RETENTION_MINUTES: &str = "history_retention_minutes";
    pub const IGNORED_RETENTION_MINUTES: &str = "ignored_retention_minutes";
    pub const MAX_RETENTION_MINUTES: i64 = 43_200;
}

//! Notification port. Slack/Teams/email webhook adapters
//! (`original_source/backend/services/notification_service.py`) are out of
//! scope; this module defines the port the ingest routes call after a pod
//! resolves or is dismissed-deleted.

use async_trait::async_trait;
use kure_core::models::PodFailureResponse;

#[derive(Debug, Clone)]
pub enum NotificationEvent {
    PodResolved(PodFailureResponse),
    PodDismissedDeleted { pod_name: String, namespace: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotificationEvent) -> anyhow::Result<()>;
}

/// No delivery adapter is wired into this repository; notification
/// delivery is an external collaborator. Failures here are optional-path
/// and swallowed by the caller, so a no-op is a safe default rather than
/// a stub needing wiring.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, event: NotificationEvent) -> anyhow::Result<()> {
        tracing::debug!(?event, "notification_dropped_no_adapter_configured");
        Ok(())
    }
}

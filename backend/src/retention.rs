//! Retention sweeper: periodic task applying `history_retention_minutes`
//! and `ignored_retention_minutes` from AppSettings.

use std::time::Duration;

use kure_core::models::app_settings;

use crate::app::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Runs forever as a supervised task; a failed sweep is logged
/// and retried on the next tick rather than crashing the process.
pub async fn run(state: AppState) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        if let Err(e) = sweep_once(&state).await {
            tracing::warn!(error = %e, "retention_sweep_failed");
        }
    }
}

async fn sweep_once(state: &AppState) -> anyhow::Result<()> {
    let history_minutes = bound_from_setting(state, app_settings::HISTORY_RETENTION_MINUTES).await?;
    if history_minutes > 0 {
        let deleted = state.storage.cleanup_old_resolved_pods(history_minutes).await?;
        if deleted > 0 {
            tracing::info!(deleted, "retention_swept_resolved_pods");
        }
    }

    let ignored_minutes = bound_from_setting(state, app_settings::IGNORED_RETENTION_MINUTES).await?;
    if ignored_minutes > 0 {
        let deleted = state.storage.cleanup_old_ignored_pods(ignored_minutes).await?;
        if deleted > 0 {
            tracing::info!(deleted, "retention_swept_ignored_pods");
        }
    }

    Ok(())
}

async fn bound_from_setting(state: &AppState, key: &str) -> anyhow::Result<i64> {
    let raw = state.storage.get_app_setting(key).await?;
    Ok(raw.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0))
}

/// Validates a retention bound the way `PUT /api/admin/settings/*-retention`
/// does: 0 disables, negative or > 43200 (30 days) is a [`kure_core::error::CoreError::Validation`].
pub fn validate_retention_minutes(minutes: i64) -> kure_core::error::CoreResult<()> {
    if minutes < 0 || minutes > app_settings::MAX_RETENTION_MINUTES {
        return Err(kure_core::error::CoreError::Validation(format!(
            "retention minutes must be between 0 and {}",
            app_settings::MAX_RETENTION_MINUTES
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_valid_and_disables() {
        assert!(validate_retention_minutes(0).is_ok());
    }

    #[test]
    fn bound_plus_one_is_rejected() {
        assert!(validate_retention_minutes(app_settings::MAX_RETENTION_MINUTES + 1).is_err());
    }

    #[test]
    fn negative_is_rejected() {
        assert!(validate_retention_minutes(-1).is_err());
    }
}

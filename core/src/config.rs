//! Environment-driven configuration, the
//! Rust analogue of `original_source/agent/config/config.py` and
//! `backend/core/app.py`'s scattered `os.environ` reads.

use std::env;

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_var_or(key: &str, default: &str) -> String {
    env_var(key).unwrap_or_else(|| default.to_string())
}

fn env_flag(key: &str, default: bool) -> bool {
    match env_var(key) {
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
        None => default,
    }
}

/// Process exit codes: 0 normal, distinct non-zero on
/// unrecoverable startup error.
pub const EXIT_STARTUP_ERROR: i32 = 78;

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub database_url: String,
    pub auth_api_key: Option<String>,
    pub encryption_key: Option<String>,
    pub bind_addr: String,
}

impl BackendConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?;
        Ok(BackendConfig {
            database_url,
            auth_api_key: env_var("AUTH_API_KEY"),
            encryption_key: env_var("ENCRYPTION_KEY"),
            bind_addr: env_var_or("BIND_ADDR", "0.0.0.0:8000"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub backend_url: String,
}

impl ScannerConfig {
    pub fn from_env() -> Self {
        ScannerConfig {
            backend_url: env_var_or("BACKEND_URL", "http://kure-monitor-backend:8000"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub backend_url: String,
    pub check_interval_secs: u64,
    pub cluster_metrics_enabled: bool,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        let check_interval_secs = env_var("KURE_CHECK_INTERVAL")
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        AgentConfig {
            backend_url: env_var_or("BACKEND_URL", "http://kure-monitor-backend:8000"),
            check_interval_secs,
            cluster_metrics_enabled: env_flag("CLUSTER_METRICS_ENABLED", true),
        }
    }
}

/// Initializes the shared `tracing` subscriber the same way across all
/// three binaries: env-filter honoring `RUST_LOG`, JSON output suitable for
/// cluster log collection.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = fmt().with_env_filter(filter).json().try_init();
}

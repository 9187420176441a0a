//! Backend entry point: HTTP ingest, persistence, WebSocket broadcast,
//! and the retention sweeper. Rust analogue of
//! `original_source/backend/main.py`'s FastAPI `lifespan` startup.

mod app;
mod auth;
mod llm;
mod notify;
mod retention;
mod routes;
mod solution;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use kure_core::config::{init_tracing, BackendConfig, EXIT_STARTUP_ERROR};
use kure_core::storage::postgres::PostgresStorage;
use tracing::info;

use crate::app::{build_router, AppState};
use crate::auth::LoginRateLimiter;
use crate::llm::UnconfiguredLlm;
use crate::notify::NullNotifier;
use crate::ws::Hub;

#[tokio::main]
async fn main() {
    init_tracing("kure_backend=info,tower_http=info");

    if let Err(e) = run().await {
        tracing::error!(error = ?e, "backend_startup_failed");
        std::process::exit(EXIT_STARTUP_ERROR);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = BackendConfig::from_env().context("loading backend configuration")?;
    info!(bind_addr = %config.bind_addr, "backend_starting");

    let storage = PostgresStorage::connect(&config.database_url)
        .await
        .context("connecting to database and running migrations")?;
    info!("database_connected_and_migrated");

    let state = AppState {
        storage: Arc::new(storage),
        hub: Hub::new(),
        config: Arc::new(config.clone()),
        login_limiter: LoginRateLimiter::new(),
        notifier: Arc::new(NullNotifier),
        llm: Arc::new(UnconfiguredLlm),
    };

    tokio::spawn(retention::run(state.clone()));

    let addr: SocketAddr = config.bind_addr.parse().context("invalid BIND_ADDR")?;
    let listener = tokio::net::TcpListener::bind(addr).await.context("binding listen address")?;
    info!(addr = %addr, "backend_listening");

    let router = build_router(state);

    // `into_make_service_with_connect_info` is required for the
    // `ConnectInfo<SocketAddr>` extractor used by the login rate limiter.
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;

    info!("backend_stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown_signal_received");
}

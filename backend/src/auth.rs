//! Shared-secret auth middleware, login rate limiter, and the `/auth/*`
//! routes, ported from `original_source/backend/api/auth.py`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kure_core::crypto::tokens_equal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::app::AppState;

const LOGIN_MAX_ATTEMPTS: usize = 5;
const LOGIN_COOLDOWN: Duration = Duration::from_secs(30);

/// Exact-match `(method, path)` pairs exempt from auth: agent/scanner
/// ingest endpoints plus the always-public auth routes.
const EXEMPT_ROUTES: &[(&str, &str)] = &[
    ("POST", "/api/pods/failed"),
    ("POST", "/api/pods/dismiss-deleted"),
    ("POST", "/api/security/findings"),
    ("POST", "/api/security/scan/clear"),
    ("POST", "/api/security/rescan-status"),
    ("POST", "/api/metrics/cluster"),
    ("POST", "/api/metrics/security-scan-duration"),
    ("GET", "/api/auth/status"),
    ("POST", "/api/auth/login"),
    ("GET", "/metrics"),
];

const EXEMPT_PREFIXES: &[(&str, &str)] = &[("DELETE", "/api/security/findings/resource/")];

/// Paths that authenticate via `?token=` instead of the `Authorization`
/// header, because `EventSource`/raw WebSocket upgrades cannot set
/// arbitrary headers from the browser.
const TOKEN_PARAM_SUFFIXES: &[&str] = &["/logs/stream", "/ws"];

fn is_exempt(method: &str, path: &str) -> bool {
    EXEMPT_ROUTES.iter().any(|(m, p)| *m == method && *p == path)
        || EXEMPT_PREFIXES
            .iter()
            .any(|(m, prefix)| *m == method && path.starts_with(prefix))
}

fn wants_token_param(path: &str) -> bool {
    TOKEN_PARAM_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

pub fn validate_token_param(auth_api_key: &Option<String>, token: Option<&str>) -> bool {
    match auth_api_key {
        None => true,
        Some(expected) => token.is_some_and(|t| tokens_equal(t, expected)),
    }
}

/// `axum::middleware::from_fn_with_state` layer applied to the whole
/// router; mirrors `require_auth`'s exemption logic in the source.
pub async fn require_auth(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.config.auth_api_key.as_ref() else {
        return next.run(request).await;
    };

    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();

    if is_exempt(&method, &path) {
        return next.run(request).await;
    }

    if wants_token_param(&path) {
        let token = request
            .uri()
            .query()
            .and_then(|q| url_query_param(q, "token"));
        if !validate_token_param(&state.config.auth_api_key, token.as_deref()) {
            return unauthorized();
        }
        return next.run(request).await;
    }

    let header_token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match header_token {
        Some(token) if tokens_equal(token, expected) => next.run(request).await,
        _ => unauthorized(),
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "Invalid or missing API key" })),
    )
        .into_response()
}

fn url_query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then(|| urlencoding_decode(v))
    })
}

/// Minimal percent-decoding, sufficient for the bearer-token query param;
/// full URL decoding is not needed for a token alphabet.
fn urlencoding_decode(s: &str) -> String {
    s.replace('+', " ")
}

/// In-memory sliding-window limiter: 5 failed attempts per source address
/// in a 30 s window, matching `_check_rate_limit` in the source.
#[derive(Default)]
pub struct LoginRateLimiter {
    attempts: Mutex<HashMap<SocketAddr, Vec<Instant>>>,
}

impl LoginRateLimiter {
    pub fn new() -> Arc<Self> {
        Arc::new(LoginRateLimiter::default())
    }

    async fn check(&self, addr: SocketAddr) -> bool {
        let mut attempts = self.attempts.lock().await;
        let entry = attempts.entry(addr).or_default();
        let now = Instant::now();
        entry.retain(|t| now.duration_since(*t) < LOGIN_COOLDOWN);
        entry.len() < LOGIN_MAX_ATTEMPTS
    }

    async fn record_failure(&self, addr: SocketAddr) {
        self.attempts.lock().await.entry(addr).or_default().push(Instant::now());
    }

    async fn clear(&self, addr: SocketAddr) {
        self.attempts.lock().await.remove(&addr);
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub valid: bool,
}

pub async fn auth_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "enabled": state.config.auth_api_key.is_some() }))
}

pub async fn auth_login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<LoginRequest>,
) -> Response {
    let Some(expected) = state.config.auth_api_key.as_ref() else {
        return Json(LoginResponse { valid: true }).into_response();
    };

    if !state.login_limiter.check(addr).await {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "Too many login attempts. Please try again in 30 seconds."
            })),
        )
            .into_response();
    }

    if tokens_equal(&body.api_key, expected) {
        state.login_limiter.clear(addr).await;
        Json(LoginResponse { valid: true }).into_response()
    } else {
        state.login_limiter.record_failure(addr).await;
        (StatusCode::UNAUTHORIZED, Json(serde_json::json!({ "error": "Invalid API key" }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exempt_routes_match_exactly() {
        assert!(is_exempt("POST", "/api/pods/failed"));
        assert!(!is_exempt("GET", "/api/pods/failed"));
    }

    #[test]
    fn exempt_prefix_covers_resource_delete() {
        assert!(is_exempt(
            "DELETE",
            "/api/security/findings/resource/Pod/prod/web"
        ));
    }

    #[test]
    fn token_param_paths_cover_logs_and_ws() {
        assert!(wants_token_param("/api/pods/prod/web/logs/stream"));
        assert!(wants_token_param("/ws"));
        assert!(!wants_token_param("/api/pods/failed"));
    }

    #[tokio::test]
    async fn rate_limiter_blocks_after_five_failures() {
        let limiter = LoginRateLimiter::new();
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        for _ in 0..5 {
            assert!(limiter.check(addr).await);
            limiter.record_failure(addr).await;
        }
        assert!(!limiter.check(addr).await);
        limiter.clear(addr).await;
        assert!(limiter.check(addr).await);
    }
}

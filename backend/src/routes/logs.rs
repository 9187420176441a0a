//! `GET /api/pods/{namespace}/{pod}/logs/stream` — SSE pod log tail,
//! ported from `original_source/backend/api/routes_logs.py`'s
//! `stream_pod_logs` generator. Auth for this endpoint is the `?token=`
//! query param handled by [`crate::auth::require_auth`] before the
//! request reaches here.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::LogParams;
use kube::{Api, Client};
use serde::Deserialize;
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    container: Option<String>,
    #[serde(default = "default_tail_lines")]
    tail_lines: i64,
    #[serde(default)]
    token: Option<String>,
}

fn default_tail_lines() -> i64 {
    100
}

/// Follows the target container's log, yielding one SSE `data:` event per
/// line. A keep-alive comment every 500ms of silence keeps intermediating
/// proxies from closing an idle connection.
pub async fn stream(
    Path((namespace, pod_name)): Path<(String, String)>,
    Query(query): Query<LogQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let _ = query.token; // validated by the auth middleware before this handler runs

    let body = match open_log_stream(&namespace, &pod_name, query.container.as_deref(), query.tail_lines).await {
        Ok(lines) => lines.boxed(),
        Err(e) => stream::once(async move { Ok(Event::default().data(format!("[Error: {e}]"))) }).boxed(),
    };

    Sse::new(body).keep_alive(KeepAlive::new().interval(Duration::from_millis(500)).text(": heartbeat"))
}

async fn open_log_stream(
    namespace: &str,
    pod_name: &str,
    container: Option<&str>,
    tail_lines: i64,
) -> anyhow::Result<impl Stream<Item = Result<Event, Infallible>>> {
    let client = Client::try_default().await?;
    let pods: Api<Pod> = Api::namespaced(client, namespace);

    let params = LogParams {
        follow: true,
        tail_lines: Some(tail_lines),
        container: container.map(str::to_string),
        ..LogParams::default()
    };

    // `log_stream` hands back an `AsyncBufRead` over the chunked HTTP
    // response body, so lines can be read directly without re-wrapping
    // the byte stream.
    let reader = pods.log_stream(pod_name, &params).await?;
    let lines = LinesStream::new(reader.lines());

    Ok(lines.map(|line| {
        Ok(match line {
            Ok(text) => Event::default().data(text),
            Err(e) => Event::default().data(format!("[Error: {e}]")),
        })
    }))
}

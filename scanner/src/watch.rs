//! Generic resource watch loop built on `kube_runtime::watcher`, the async
//! idiomatic replacement for
//! `original_source/security-scanner/services/watch_manager.py`'s
//! thread-plus-queue bridge around the synchronous `kubernetes` client.
//! `kube_runtime` already gives us a native async stream of watch events,
//! so there is no thread to manage here.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use kube::api::Api;
use kube::Resource;
use kube_runtime::watcher::{watcher, Config, Event};
use serde::de::DeserializeOwned;
use tracing::{error, warn};

const RESTART_BACKOFF: Duration = Duration::from_secs(5);

#[async_trait]
pub trait WatchSink<K>: Send + Sync {
    async fn applied(&self, obj: K);
    async fn deleted(&self, obj: K);
}

/// Runs `api`'s watch forever, dispatching to `sink`. On any stream error
/// the watcher is recreated after a 5s backoff. When `handle_403` is set
/// and the cluster denies the watch with Forbidden, the loop exits quietly
/// instead of retrying forever against a permission it will never gain —
/// the CronJob watch uses this to tolerate missing RBAC gracefully.
pub async fn run<K, S>(api: Api<K>, resource_type: &'static str, handle_403: bool, sink: Arc<S>)
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default,
    S: WatchSink<K> + 'static,
{
    loop {
        let mut stream = watcher(api.clone(), Config::default()).boxed();
        let mut restart = false;

        loop {
            match stream.next().await {
                Some(Ok(Event::Applied(obj))) => sink.applied(obj).await,
                Some(Ok(Event::Deleted(obj))) => sink.deleted(obj).await,
                Some(Ok(Event::Restarted(objs))) => {
                    for obj in objs {
                        sink.applied(obj).await;
                    }
                }
                Some(Err(e)) => {
                    let message = e.to_string();
                    if handle_403 && message.contains("403") {
                        warn!(resource_type, "watch_forbidden_disabling");
                        return;
                    }
                    error!(resource_type, error = %message, "watch_error_restarting");
                    restart = true;
                    break;
                }
                None => {
                    warn!(resource_type, "watch_stream_ended_restarting");
                    restart = true;
                    break;
                }
            }
        }

        if restart {
            tokio::time::sleep(RESTART_BACKOFF).await;
        }
    }
}

//! Exclusion caching, ported from
//! `original_source/security-scanner/services/exclusion_manager.py`. Three
//! independent caches, each refreshed from the backend no more than once a
//! minute unless a WebSocket change notification forces an immediate
//! refresh.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::warn;

use crate::client::BackendClient;

const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

struct Cached<T> {
    value: T,
    refreshed_at: Option<Instant>,
}

impl<T: Default> Default for Cached<T> {
    fn default() -> Self {
        Cached { value: T::default(), refreshed_at: None }
    }
}

impl<T> Cached<T> {
    fn is_stale(&self) -> bool {
        match self.refreshed_at {
            Some(t) => t.elapsed() > REFRESH_INTERVAL,
            None => true,
        }
    }
}

pub struct ExclusionCache {
    client: Arc<BackendClient>,
    namespaces: RwLock<Cached<Vec<String>>>,
    global_rules: RwLock<Cached<HashSet<String>>>,
    namespace_rules: RwLock<Cached<HashMap<String, HashSet<String>>>>,
    trusted_registries: RwLock<Cached<Vec<String>>>,
}

impl ExclusionCache {
    pub fn new(client: Arc<BackendClient>) -> Self {
        ExclusionCache {
            client,
            namespaces: RwLock::new(Cached::default()),
            global_rules: RwLock::new(Cached::default()),
            namespace_rules: RwLock::new(Cached::default()),
            trusted_registries: RwLock::new(Cached::default()),
        }
    }

    pub async fn refresh_excluded_namespaces(&self, force: bool) {
        if !force && !self.namespaces.read().await.is_stale() {
            return;
        }
        match self.client.get_excluded_namespaces().await {
            Ok(namespaces) => {
                let mut cache = self.namespaces.write().await;
                cache.value = namespaces;
                cache.refreshed_at = Some(Instant::now());
            }
            Err(e) => warn!(error = %e, "excluded_namespaces_refresh_failed"),
        }
    }

    pub async fn refresh_excluded_rules(&self, force: bool) {
        if !force && !self.global_rules.read().await.is_stale() {
            return;
        }
        let rules = match self.client.get_excluded_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(error = %e, "excluded_rules_refresh_failed");
                return;
            }
        };

        let mut global = HashSet::new();
        let mut by_namespace: HashMap<String, HashSet<String>> = HashMap::new();
        for rule in rules {
            if rule.namespace.is_empty() {
                global.insert(rule.rule_title);
            } else {
                by_namespace.entry(rule.namespace).or_default().insert(rule.rule_title);
            }
        }

        let now = Some(Instant::now());
        {
            let mut cache = self.global_rules.write().await;
            cache.value = global;
            cache.refreshed_at = now;
        }
        {
            let mut cache = self.namespace_rules.write().await;
            cache.value = by_namespace;
            cache.refreshed_at = now;
        }
    }

    pub async fn refresh_trusted_registries(&self, force: bool) {
        if !force && !self.trusted_registries.read().await.is_stale() {
            return;
        }
        match self.client.get_trusted_registries().await {
            Ok(registries) => {
                let mut cache = self.trusted_registries.write().await;
                cache.value = registries;
                cache.refreshed_at = Some(Instant::now());
            }
            Err(e) => warn!(error = %e, "trusted_registries_refresh_failed"),
        }
    }

    pub async fn is_namespace_excluded(&self, namespace: &str) -> bool {
        self.refresh_excluded_namespaces(false).await;
        self.namespaces.read().await.value.iter().any(|n| n == namespace)
    }

    /// Matches `title` against globally-excluded rules, then (if
    /// `namespace` given) against that namespace's excluded rules. A title
    /// containing `": <suffix>"` (container-scoped instances, e.g.
    /// `"Privileged container: nginx"`) also checks its base name, so
    /// excluding the base rule suppresses every per-container instance.
    pub async fn is_rule_excluded(&self, title: &str, namespace: Option<&str>) -> bool {
        self.refresh_excluded_rules(false).await;

        let base = title.split_once(": ").map(|(base, _)| base);

        let global = self.global_rules.read().await;
        if global.value.contains(title) || base.map(|b| global.value.contains(b)).unwrap_or(false) {
            return true;
        }
        drop(global);

        if let Some(ns) = namespace {
            let by_namespace = self.namespace_rules.read().await;
            if let Some(rules) = by_namespace.value.get(ns) {
                if rules.contains(title) || base.map(|b| rules.contains(b)).unwrap_or(false) {
                    return true;
                }
            }
        }

        false
    }

    pub async fn trusted_registries(&self) -> Vec<String> {
        self.refresh_trusted_registries(false).await;
        self.trusted_registries.read().await.value.clone()
    }

    pub async fn force_refresh_namespaces(&self) {
        self.refresh_excluded_namespaces(true).await;
    }

    pub async fn force_refresh_rules(&self) {
        self.refresh_excluded_rules(true).await;
    }

    pub async fn force_refresh_registries(&self) {
        self.refresh_trusted_registries(true).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rule_exclusion_matches_base_name_for_container_scoped_titles() {
        let cache = ExclusionCache::new(Arc::new(BackendClient::new("http://unused.invalid")));
        {
            let mut global = cache.global_rules.write().await;
            global.value.insert("Privileged container".to_string());
            global.refreshed_at = Some(Instant::now());
        }
        assert!(cache.is_rule_excluded("Privileged container: nginx", None).await);
        assert!(!cache.is_rule_excluded("Writable root filesystem: nginx", None).await);
    }
}

//! ConfigMap sensitive-data scan, ported from
//! `original_source/security-scanner/services/scanners/resource_scanners.py`
//! (`scan_configmaps`).

use k8s_openapi::api::core::v1::ConfigMap;
use kure_core::models::{SecurityFindingCreate, Severity};
use regex::RegexSet;
use std::sync::LazyLock;

use super::finding;

const SENSITIVE_KEYS: &[&str] = &[
    "password", "passwd", "secret", "token", "api_key", "apikey",
    "private_key", "privatekey", "credentials", "auth",
];

static SENSITIVE_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)password\s*[=:]\s*\S+",
        r"(?i)api[_-]?key\s*[=:]\s*\S+",
        r"(?i)secret[_-]?key\s*[=:]\s*\S+",
        r"(?i)access[_-]?token\s*[=:]\s*\S+",
        r"(?i)private[_-]?key",
        r"-----BEGIN\s+(RSA\s+)?PRIVATE\s+KEY-----",
        r"(?i)aws[_-]?secret[_-]?access[_-]?key",
    ])
    .expect("sensitive-data patterns are valid regexes")
});

pub fn scan(cm: &ConfigMap) -> Vec<SecurityFindingCreate> {
    let namespace = cm.metadata.namespace.as_deref().unwrap_or_default();
    let name = cm.metadata.name.as_deref().unwrap_or_default();
    let data = cm.data.clone().unwrap_or_default();

    let mut found_sensitive: Vec<String> = Vec::new();

    for (key, value) in &data {
        let key_lower = key.to_lowercase();
        if let Some(matched) = SENSITIVE_KEYS.iter().find(|k| key_lower.contains(*k)) {
            found_sensitive.push(format!("key '{key}' (contains '{matched}')"));
            continue;
        }
        if !value.is_empty() && SENSITIVE_PATTERNS.is_match(value) {
            found_sensitive.push("value matching a known secret pattern".to_string());
        }
    }

    if found_sensitive.is_empty() {
        return Vec::new();
    }

    found_sensitive.truncate(3);
    vec![finding(
        "ConfigMap", name, namespace, Severity::High, "Security",
        "ConfigMap may contain sensitive data",
        format!(
            "ConfigMap '{name}' appears to contain sensitive data: {}. ConfigMaps are not encrypted and should not store secrets.",
            found_sensitive.join(", ")
        ),
        "Move sensitive data to Kubernetes Secrets (which can be encrypted at rest) or use external secret management like HashiCorp Vault.",
        "",
    )]
}

//! Shared constants and helpers used across the rule catalog, ported from
//! `original_source/security-scanner/services/scanner_base.py`.

use serde::Serialize;
use serde_json::Value;

pub const DANGEROUS_CAPABILITIES: &[&str] = &[
    "SYS_ADMIN",
    "NET_RAW",
    "SYS_PTRACE",
    "SYS_MODULE",
    "DAC_READ_SEARCH",
    "NET_ADMIN",
    "SYS_RAWIO",
    "SYS_BOOT",
    "SYS_TIME",
    "MKNOD",
    "SETUID",
    "SETGID",
];

#[allow(dead_code)]
pub const ALLOWED_CAPABILITIES: &[&str] = &["NET_BIND_SERVICE"];

pub const SYSTEM_NAMESPACES: &[&str] = &[
    "kube-system",
    "kube-public",
    "kube-node-lease",
    "kube-flannel",
    "kure-system",
    "kyverno",
];

pub const TRUSTED_REGISTRIES: &[&str] = &[
    "docker.io",
    "gcr.io",
    "ghcr.io",
    "quay.io",
    "registry.k8s.io",
    "mcr.microsoft.com",
    "public.ecr.aws",
];

pub const LARGE_EMPTYDIR_THRESHOLD: i64 = 10 * 1024 * 1024 * 1024;

pub const CRITICAL_HOST_PATHS: &[&str] = &["/", "/etc", "/var", "/root", "/home"];

/// Parses the registry host out of an image reference. Bare names
/// (`nginx`) and ambiguous two-part names (`library/nginx`) fall back to
/// `docker.io`; a leading segment containing a dot, a colon, or equal to
/// `localhost` is treated as an explicit registry host, with any `:port`
/// stripped off.
pub fn get_image_registry(image: &str) -> Option<String> {
    if image.is_empty() {
        return None;
    }
    let parts: Vec<&str> = image.split('/').collect();
    if parts.len() == 1 {
        return Some("docker.io".to_string());
    }
    let first = parts[0];
    let looks_like_registry = first.contains('.') || first.contains(':') || first == "localhost";
    if parts.len() == 2 {
        Some(if looks_like_registry {
            first.split(':').next().unwrap_or(first).to_string()
        } else {
            "docker.io".to_string()
        })
    } else {
        Some(first.split(':').next().unwrap_or(first).to_string())
    }
}

const BINARY_SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1024.0 * 1024.0),
    ("Gi", 1024.0 * 1024.0 * 1024.0),
    ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
];

const DECIMAL_SUFFIXES: &[(&str, f64)] = &[
    ("K", 1000.0),
    ("M", 1000.0 * 1000.0),
    ("G", 1000.0 * 1000.0 * 1000.0),
    ("T", 1000.0 * 1000.0 * 1000.0 * 1000.0),
];

/// Parses a Kubernetes quantity string (`20Gi`, `500M`, `1024`) into a raw
/// byte count.
pub fn parse_size_to_bytes(size_str: &str) -> Option<i64> {
    let s = size_str.trim();
    if s.is_empty() {
        return None;
    }
    for (suffix, mult) in BINARY_SUFFIXES {
        if let Some(num) = s.strip_suffix(suffix) {
            return num.trim().parse::<f64>().ok().map(|n| (n * mult) as i64);
        }
    }
    for (suffix, mult) in DECIMAL_SUFFIXES {
        if let Some(num) = s.strip_suffix(suffix) {
            return num.trim().parse::<f64>().ok().map(|n| (n * mult) as i64);
        }
    }
    s.parse::<f64>().ok().map(|n| n as i64)
}

fn prune(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for v in map.values_mut() {
                prune(v);
            }
            map.retain(|_, v| !matches!(v, Value::Null | Value::Array(_) | Value::Object(_))
                || matches!(v, Value::Array(a) if !a.is_empty())
                || matches!(v, Value::Object(o) if !o.is_empty()));
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                prune(item);
            }
        }
        _ => {}
    }
}

/// Serializes a resource into the sanitized YAML manifest stored alongside
/// a finding: injects `apiVersion`/`kind`, strips server-managed metadata
/// and the whole `status` subtree, and drops fields left empty so the
/// manifest reads like something a human actually authored.
pub fn resource_manifest<T: Serialize>(resource: &T, api_version: &str, kind: &str) -> String {
    let mut value = match serde_json::to_value(resource) {
        Ok(v) => v,
        Err(_) => return String::new(),
    };

    if let Value::Object(ref mut map) = value {
        map.insert("apiVersion".to_string(), Value::String(api_version.to_string()));
        map.insert("kind".to_string(), Value::String(kind.to_string()));
        map.remove("status");

        if let Some(Value::Object(metadata)) = map.get_mut("metadata") {
            for key in ["managedFields", "resourceVersion", "uid", "creationTimestamp", "generation", "selfLink"] {
                metadata.remove(key);
            }
        }
    }

    prune(&mut value);
    serde_yaml::to_string(&value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_registry_bare_name_is_docker_hub() {
        assert_eq!(get_image_registry("nginx"), Some("docker.io".to_string()));
        assert_eq!(get_image_registry("nginx:1.25"), Some("docker.io".to_string()));
    }

    #[test]
    fn image_registry_two_part_without_dot_is_docker_hub() {
        assert_eq!(get_image_registry("library/nginx"), Some("docker.io".to_string()));
    }

    #[test]
    fn image_registry_recognizes_explicit_hosts() {
        assert_eq!(get_image_registry("ghcr.io/acme/app:v1"), Some("ghcr.io".to_string()));
        assert_eq!(get_image_registry("localhost:5000/app"), Some("localhost".to_string()));
        assert_eq!(get_image_registry("registry.internal/team/app:v1"), Some("registry.internal".to_string()));
    }

    #[test]
    fn size_parsing_handles_binary_and_decimal_suffixes() {
        assert_eq!(parse_size_to_bytes("1Ki"), Some(1024));
        assert_eq!(parse_size_to_bytes("20Gi"), Some(20 * 1024 * 1024 * 1024));
        assert_eq!(parse_size_to_bytes("500M"), Some(500_000_000));
        assert_eq!(parse_size_to_bytes("2048"), Some(2048));
    }
}

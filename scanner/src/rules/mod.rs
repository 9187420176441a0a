//! The rule catalog: one module per Kubernetes kind, each exposing a
//! `scan_*` function that inspects a single resource and returns the
//! findings it produced. Grounded on
//! `original_source/security-scanner/services/scanners/pod_scanner.py`
//! and `.../scanners/resource_scanners.py`.

pub mod base;
pub mod configmap;
pub mod cronjob;
pub mod deployment;
pub mod ingress;
pub mod namespace;
pub mod pod;
pub mod pv;
pub mod rbac;
pub mod service;

use chrono::Utc;
use kure_core::models::SecurityFindingCreate;

/// Builds one finding. `timestamp` is stamped at report time rather than
/// scan time since a finding can sit in the exclusion-check pipeline for a
/// moment before being sent.
#[allow(clippy::too_many_arguments)]
pub fn finding(
    resource_type: &str,
    resource_name: &str,
    namespace: &str,
    severity: kure_core::models::Severity,
    category: &str,
    title: impl Into<String>,
    description: impl Into<String>,
    remediation: impl Into<String>,
    manifest: &str,
) -> SecurityFindingCreate {
    SecurityFindingCreate {
        resource_type: resource_type.to_string(),
        resource_name: resource_name.to_string(),
        namespace: namespace.to_string(),
        severity,
        category: category.to_string(),
        title: title.into(),
        description: description.into(),
        remediation: remediation.into(),
        timestamp: Utc::now().to_rfc3339(),
        manifest: manifest.to_string(),
    }
}

//! PersistentVolume checks, ported from
//! `original_source/security-scanner/services/scanners/resource_scanners.py`
//! (`scan_persistent_volumes`).

use k8s_openapi::api::core::v1::PersistentVolume;
use kure_core::models::{SecurityFindingCreate, Severity};

use super::base::{resource_manifest, CRITICAL_HOST_PATHS};
use super::finding;

pub fn scan(pv: &PersistentVolume) -> Vec<SecurityFindingCreate> {
    let mut out = Vec::new();
    let name = pv.metadata.name.as_deref().unwrap_or_default();
    let manifest = resource_manifest(pv, "v1", "PersistentVolume");
    let Some(spec) = &pv.spec else { return out };

    if let Some(host_path) = &spec.host_path {
        let severity = if CRITICAL_HOST_PATHS.contains(&host_path.path.as_str()) { Severity::Critical } else { Severity::High };
        out.push(finding(
            "PersistentVolume", name, "cluster-wide", severity, "Security",
            format!("PersistentVolume uses hostPath: {}", host_path.path),
            format!(
                "PersistentVolume '{name}' uses hostPath '{}'. This provides direct access to the host filesystem and can lead to container escape or data exposure.",
                host_path.path
            ),
            "Use cloud provider storage classes, NFS, or other network-attached storage instead of hostPath for PersistentVolumes.",
            &manifest,
        ));
    }

    if let Some(local) = &spec.local {
        out.push(finding(
            "PersistentVolume", name, "cluster-wide", Severity::Medium, "Security",
            format!("PersistentVolume uses local storage: {}", local.path),
            format!("PersistentVolume '{name}' uses local storage at '{}'. Local volumes are node-specific and may expose host filesystem.", local.path),
            "Consider using network-attached storage for better isolation and portability.",
            &manifest,
        ));
    }

    out
}

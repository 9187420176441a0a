//! Namespace-level checks (NetworkPolicy, Pod Security Admission,
//! ResourceQuota/LimitRange presence), ported from
//! `original_source/security-scanner/services/scanners/resource_scanners.py`
//! (`scan_network_policies`, `scan_pod_security_admission`,
//! `scan_resource_quotas`). These are bulk checks run once per namespace
//! that already has at least one pod — an empty namespace generates no
//! findings since there is nothing running for a missing policy to expose.

use k8s_openapi::api::core::v1::Namespace;
use kure_core::models::{SecurityFindingCreate, Severity};

use super::base::resource_manifest;
use super::finding;

pub fn missing_network_policy_finding(ns: &Namespace, has_pods: bool, has_network_policy: bool) -> Option<SecurityFindingCreate> {
    if !has_pods || has_network_policy {
        return None;
    }
    let name = ns.metadata.name.as_deref().unwrap_or_default();
    let manifest = resource_manifest(ns, "v1", "Namespace");
    Some(finding(
        "Namespace", name, name, Severity::Medium, "Security",
        "Namespace has no NetworkPolicy",
        format!("Namespace '{name}' has no NetworkPolicy defined. All pods can communicate with all other pods in the cluster without restriction."),
        "Create NetworkPolicies to implement network segmentation and restrict pod-to-pod communication based on the principle of least privilege.",
        &manifest,
    ))
}

pub fn pod_security_admission_finding(ns: &Namespace, has_pods: bool) -> Option<SecurityFindingCreate> {
    if !has_pods {
        return None;
    }
    let name = ns.metadata.name.as_deref().unwrap_or_default();
    let manifest = resource_manifest(ns, "v1", "Namespace");
    let labels = ns.metadata.labels.clone().unwrap_or_default();

    let enforce = labels.get("pod-security.kubernetes.io/enforce").map(String::as_str);
    let warn = labels.get("pod-security.kubernetes.io/warn");
    let audit = labels.get("pod-security.kubernetes.io/audit");

    if enforce.is_none() && warn.is_none() && audit.is_none() {
        Some(finding(
            "Namespace", name, name, Severity::Medium, "Compliance",
            "No Pod Security Admission labels configured",
            format!("Namespace '{name}' has no Pod Security Admission labels configured. PSA provides built-in enforcement of Pod Security Standards."),
            "Add PSA labels to the namespace: 'pod-security.kubernetes.io/enforce: baseline' or 'restricted' for production workloads.",
            &manifest,
        ))
    } else if enforce == Some("privileged") {
        Some(finding(
            "Namespace", name, name, Severity::High, "Security",
            "Pod Security Admission set to privileged",
            format!("Namespace '{name}' has PSA enforce set to 'privileged', which allows unrestricted pod configurations including privileged containers."),
            "Consider using 'baseline' or 'restricted' enforce level for better security. Use 'privileged' only for system namespaces.",
            &manifest,
        ))
    } else {
        None
    }
}

pub fn resource_governance_findings(ns: &Namespace, has_pods: bool, has_quota: bool, has_limit_range: bool) -> Vec<SecurityFindingCreate> {
    let mut out = Vec::new();
    if !has_pods {
        return out;
    }
    let name = ns.metadata.name.as_deref().unwrap_or_default();
    let manifest = resource_manifest(ns, "v1", "Namespace");

    if !has_quota {
        out.push(finding(
            "Namespace", name, name, Severity::Low, "Best Practice",
            "Namespace has no ResourceQuota",
            format!("Namespace '{name}' has no ResourceQuota configured. Workloads can consume unlimited cluster resources."),
            "Create a ResourceQuota to limit the total resources (CPU, memory, storage, object count) that can be consumed in this namespace.",
            &manifest,
        ));
    }

    if !has_limit_range {
        out.push(finding(
            "Namespace", name, name, Severity::Low, "Best Practice",
            "Namespace has no LimitRange",
            format!("Namespace '{name}' has no LimitRange configured. Containers without resource limits can consume unlimited resources."),
            "Create a LimitRange to set default resource limits and requests for containers in this namespace.",
            &manifest,
        ));
    }

    out
}

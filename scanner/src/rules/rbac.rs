//! ClusterRole / Role / ClusterRoleBinding checks, ported from
//! `original_source/security-scanner/services/scanners/resource_scanners.py`
//! (`scan_single_cluster_role`, `scan_single_role`, `scan_cluster_role_bindings`).

use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role};
use kure_core::models::{SecurityFindingCreate, Severity};

use super::base::resource_manifest;
use super::finding;

pub fn scan_cluster_role(role: &ClusterRole) -> Vec<SecurityFindingCreate> {
    let mut out = Vec::new();
    let name = role.metadata.name.as_deref().unwrap_or_default();
    let manifest = resource_manifest(role, "rbac.authorization.k8s.io/v1", "ClusterRole");

    let mut reported_wildcard = false;

    for rule in role.rules.iter().flatten() {
        let resources: Vec<&str> = rule.resources.iter().flatten().map(String::as_str).collect();
        let verbs: Vec<&str> = rule.verbs.iter().map(String::as_str).collect();
        let api_groups: Vec<&str> = rule.api_groups.iter().flatten().map(String::as_str).collect();

        if resources.contains(&"*") && !reported_wildcard {
            out.push(finding(
                "ClusterRole", name, "cluster-wide", Severity::High, "Security",
                "ClusterRole with wildcard resource permissions",
                format!("ClusterRole '{name}' has wildcard (*) resource permissions, which grants access to all resources."),
                "Restrict permissions to specific resources instead of using wildcards.",
                &manifest,
            ));
            reported_wildcard = true;
        }

        if verbs.contains(&"*") && !reported_wildcard {
            out.push(finding(
                "ClusterRole", name, "cluster-wide", Severity::High, "Security",
                "ClusterRole with wildcard verb permissions",
                format!("ClusterRole '{name}' has wildcard (*) verb permissions, which grants all actions."),
                "Restrict permissions to specific verbs (get, list, watch, create, update, delete) instead of using wildcards.",
                &manifest,
            ));
            reported_wildcard = true;
        }

        if resources.contains(&"secrets") {
            let dangerous: Vec<&str> = verbs.iter().copied().filter(|v| ["get", "list", "watch", "*"].contains(v)).collect();
            if !dangerous.is_empty() {
                out.push(finding(
                    "ClusterRole", name, "cluster-wide", Severity::High, "Security",
                    "ClusterRole can read secrets",
                    format!("ClusterRole '{name}' has {} access to secrets. This allows reading sensitive data like passwords, tokens, and keys.", dangerous.join(", ")),
                    "Restrict secrets access to only the namespaces and specific secrets required.",
                    &manifest,
                ));
            }
        }

        if resources.contains(&"pods/exec") || (resources.contains(&"pods") && verbs.contains(&"create")) {
            out.push(finding(
                "ClusterRole", name, "cluster-wide", Severity::High, "Security",
                "ClusterRole allows pod exec",
                format!("ClusterRole '{name}' can execute commands inside pods. This allows running arbitrary commands in containers."),
                "Limit exec permissions to specific namespaces or remove if not needed for debugging.",
                &manifest,
            ));
        }

        if resources.contains(&"*") && verbs.contains(&"*") && (api_groups.contains(&"") || api_groups.contains(&"*")) {
            out.push(finding(
                "ClusterRole", name, "cluster-wide", Severity::Critical, "Security",
                "ClusterRole has cluster-admin equivalent permissions",
                format!("ClusterRole '{name}' has full access to all resources in all API groups. This is equivalent to cluster-admin."),
                "Review if full cluster access is necessary. Apply principle of least privilege.",
                &manifest,
            ));
        }
    }

    out
}

pub fn scan_role(role: &Role) -> Vec<SecurityFindingCreate> {
    let mut out = Vec::new();
    let name = role.metadata.name.as_deref().unwrap_or_default();
    let namespace = role.metadata.namespace.as_deref().unwrap_or_default();
    let manifest = resource_manifest(role, "rbac.authorization.k8s.io/v1", "Role");

    for rule in role.rules.iter().flatten() {
        let resources: Vec<&str> = rule.resources.iter().flatten().map(String::as_str).collect();
        let verbs: Vec<&str> = rule.verbs.iter().map(String::as_str).collect();

        if resources.contains(&"secrets") {
            let dangerous: Vec<&str> = verbs.iter().copied().filter(|v| ["get", "list", "watch", "*"].contains(v)).collect();
            if !dangerous.is_empty() {
                out.push(finding(
                    "Role", name, namespace, Severity::Medium, "Security",
                    "Role can read secrets in namespace",
                    format!("Role '{name}' has {} access to secrets in namespace '{namespace}'.", dangerous.join(", ")),
                    "Review if secrets access is necessary and limit to specific secret names if possible.",
                    &manifest,
                ));
            }
        }
    }

    out
}

const DANGEROUS_SUBJECTS: &[(&str, &str)] = &[("Group", "system:anonymous"), ("Group", "system:unauthenticated")];
const HIGH_PRIVILEGE_ROLES: &[&str] = &["cluster-admin", "admin", "edit"];

pub fn scan_cluster_role_binding(binding: &ClusterRoleBinding) -> Vec<SecurityFindingCreate> {
    let mut out = Vec::new();
    let name = binding.metadata.name.as_deref().unwrap_or_default();
    let manifest = resource_manifest(binding, "rbac.authorization.k8s.io/v1", "ClusterRoleBinding");
    let role_ref = binding.role_ref.name.as_str();

    for subject in binding.subjects.iter().flatten() {
        if DANGEROUS_SUBJECTS.contains(&(subject.kind.as_str(), subject.name.as_str())) {
            out.push(finding(
                "ClusterRoleBinding", name, "cluster-wide", Severity::Critical, "Security",
                format!("ClusterRoleBinding grants permissions to {}", subject.name),
                format!("ClusterRoleBinding '{name}' grants cluster-wide permissions to '{}'. This allows unauthenticated access to cluster resources.", subject.name),
                "Remove this binding or change the subject to authenticated users/groups only.",
                &manifest,
            ));
        }
    }

    if HIGH_PRIVILEGE_ROLES.contains(&role_ref) {
        for subject in binding.subjects.iter().flatten() {
            if subject.kind == "ServiceAccount" {
                out.push(finding(
                    "ClusterRoleBinding", name, "cluster-wide", Severity::High, "Security",
                    format!("ServiceAccount bound to {role_ref}"),
                    format!(
                        "ServiceAccount '{}/{}' is bound to high-privilege ClusterRole '{role_ref}' via '{name}'.",
                        subject.namespace.clone().unwrap_or_default(), subject.name
                    ),
                    "Review if this ServiceAccount requires cluster-admin level access. Apply principle of least privilege.",
                    &manifest,
                ));
            }
        }
    }

    out
}

//! Deployment checks, ported from
//! `original_source/security-scanner/services/scanners/resource_scanners.py`
//! (`scan_single_deployment`, `scan_pod_disruption_budgets`).

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kure_core::models::{SecurityFindingCreate, Severity};

use super::base::resource_manifest;
use super::finding;

pub fn scan(deployment: &Deployment) -> Vec<SecurityFindingCreate> {
    let mut out = Vec::new();
    let namespace = deployment.metadata.namespace.as_deref().unwrap_or_default();
    let name = deployment.metadata.name.as_deref().unwrap_or_default();
    let manifest = resource_manifest(deployment, "apps/v1", "Deployment");
    let Some(spec) = &deployment.spec else { return out };
    let replicas = spec.replicas.unwrap_or(1);

    if replicas < 2 {
        out.push(finding(
            "Deployment", name, namespace, Severity::Low, "Best Practice",
            "Single replica deployment",
            format!("Deployment has only {replicas} replica(s), which affects high availability."),
            "Increase the number of replicas to at least 2 for production workloads.",
            &manifest,
        ));
        return out;
    }

    let affinity = spec.template.spec.as_ref().and_then(|s| s.affinity.as_ref());
    let has_anti_affinity = affinity
        .and_then(|a| a.pod_anti_affinity.as_ref())
        .map(|paa| {
            paa.required_during_scheduling_ignored_during_execution.as_ref().map(|v| !v.is_empty()).unwrap_or(false)
                || paa.preferred_during_scheduling_ignored_during_execution.as_ref().map(|v| !v.is_empty()).unwrap_or(false)
        })
        .unwrap_or(false);

    if !has_anti_affinity {
        out.push(finding(
            "Deployment", name, namespace, Severity::Low, "Best Practice",
            "HA deployment without pod anti-affinity",
            format!("Deployment '{name}' has {replicas} replicas but no pod anti-affinity rules. All replicas could be scheduled on the same node."),
            "Add podAntiAffinity rules to spread replicas across nodes for better fault tolerance.",
            &manifest,
        ));
    }

    out
}

fn labels_match(selector: &BTreeMap<String, String>, pdb_selector: &BTreeMap<String, String>) -> bool {
    pdb_selector.iter().all(|(k, v)| selector.get(k) == Some(v))
}

/// Cross-checks every >=2-replica Deployment against the cluster's
/// PodDisruptionBudgets. This is a bulk check (needs both lists at once),
/// unlike the rest of the deployment rules which run per-resource.
pub fn missing_pdb_findings(deployments: &[Deployment], pdbs: &[PodDisruptionBudget]) -> Vec<SecurityFindingCreate> {
    let mut out = Vec::new();

    let mut pdb_selectors: BTreeMap<String, Vec<BTreeMap<String, String>>> = BTreeMap::new();
    for pdb in pdbs {
        let ns = pdb.metadata.namespace.clone().unwrap_or_default();
        if let Some(labels) = pdb.spec.as_ref().and_then(|s| s.selector.as_ref()).and_then(|s| s.match_labels.clone()) {
            pdb_selectors.entry(ns).or_default().push(labels);
        }
    }

    for deployment in deployments {
        let namespace = deployment.metadata.namespace.clone().unwrap_or_default();
        let name = deployment.metadata.name.as_deref().unwrap_or_default();
        let Some(spec) = &deployment.spec else { continue };
        let replicas = spec.replicas.unwrap_or(1);
        if replicas < 2 {
            continue;
        }

        let deploy_labels = spec.selector.match_labels.clone().unwrap_or_default();
        let has_pdb = pdb_selectors
            .get(&namespace)
            .map(|sels| sels.iter().any(|s| labels_match(&deploy_labels, s)))
            .unwrap_or(false);

        if !has_pdb {
            let manifest = resource_manifest(deployment, "apps/v1", "Deployment");
            out.push(finding(
                "Deployment", name, &namespace, Severity::Low, "Best Practice",
                "High-availability deployment without PodDisruptionBudget",
                format!("Deployment '{name}' has {replicas} replicas but no PodDisruptionBudget. During cluster maintenance, all pods could be evicted simultaneously."),
                "Create a PodDisruptionBudget to ensure minimum availability during voluntary disruptions like node drains.",
                &manifest,
            ));
        }
    }

    out
}

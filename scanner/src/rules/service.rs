//! Service checks, ported from
//! `original_source/security-scanner/services/scanners/resource_scanners.py`
//! (`scan_single_service`).

use k8s_openapi::api::core::v1::Service;
use kure_core::models::{SecurityFindingCreate, Severity};

use super::base::resource_manifest;
use super::finding;

pub fn scan(service: &Service) -> Vec<SecurityFindingCreate> {
    let mut out = Vec::new();
    let namespace = service.metadata.namespace.as_deref().unwrap_or_default();
    let name = service.metadata.name.as_deref().unwrap_or_default();
    let manifest = resource_manifest(service, "v1", "Service");
    let Some(spec) = &service.spec else { return out };
    let service_type = spec.type_.as_deref().unwrap_or("ClusterIP");

    match service_type {
        "LoadBalancer" => out.push(finding(
            "Service", name, namespace, Severity::Medium, "Security",
            "Service exposed via LoadBalancer",
            "Service is exposed externally via LoadBalancer, which may be accessible from the internet.",
            "Review if external exposure is necessary. Consider using ClusterIP with Ingress controller for better control.",
            &manifest,
        )),
        "NodePort" => out.push(finding(
            "Service", name, namespace, Severity::Medium, "Security",
            "Service exposed via NodePort",
            "Service is exposed on all cluster nodes via NodePort. This exposes the service on every node's IP address.",
            "Consider using ClusterIP with Ingress controller for controlled external access, or LoadBalancer for cloud environments.",
            &manifest,
        )),
        "ExternalName" => out.push(finding(
            "Service", name, namespace, Severity::Low, "Security",
            "ExternalName service detected",
            format!(
                "Service redirects to external DNS name '{}'. This can be used for DNS rebinding attacks or unintended external access.",
                spec.external_name.clone().unwrap_or_default()
            ),
            "Verify the external name is trusted and consider using NetworkPolicies to restrict egress traffic.",
            &manifest,
        )),
        _ => {}
    }

    out
}

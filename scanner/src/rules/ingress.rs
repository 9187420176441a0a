//! Ingress checks, ported from
//! `original_source/security-scanner/services/scanners/resource_scanners.py`
//! (`scan_single_ingress`).

use k8s_openapi::api::networking::v1::Ingress;
use kure_core::models::{SecurityFindingCreate, Severity};

use super::base::resource_manifest;
use super::finding;

const DANGEROUS_ANNOTATIONS: &[&str] = &[
    "nginx.ingress.kubernetes.io/ssl-passthrough",
    "nginx.ingress.kubernetes.io/backend-protocol",
    "nginx.ingress.kubernetes.io/configuration-snippet",
    "nginx.ingress.kubernetes.io/server-snippet",
];

pub fn scan(ingress: &Ingress) -> Vec<SecurityFindingCreate> {
    let mut out = Vec::new();
    let namespace = ingress.metadata.namespace.as_deref().unwrap_or_default();
    let name = ingress.metadata.name.as_deref().unwrap_or_default();
    let annotations = ingress.metadata.annotations.clone().unwrap_or_default();
    let manifest = resource_manifest(ingress, "networking.k8s.io/v1", "Ingress");
    let Some(spec) = &ingress.spec else { return out };

    if spec.tls.as_ref().map(|t| t.is_empty()).unwrap_or(true) {
        out.push(finding(
            "Ingress", name, namespace, Severity::High, "Security",
            "Ingress without TLS configuration",
            format!("Ingress '{name}' does not have TLS configured. Traffic will be unencrypted."),
            "Configure TLS for the Ingress using a certificate from cert-manager or a manually provisioned certificate.",
            &manifest,
        ));
    }

    for rule in spec.rules.iter().flatten() {
        if let Some(host) = &rule.host {
            if host.starts_with('*') {
                out.push(finding(
                    "Ingress", name, namespace, Severity::Medium, "Security",
                    format!("Ingress with wildcard host: {host}"),
                    format!("Ingress '{name}' uses wildcard host '{host}'. This could expose services to unintended subdomains."),
                    "Use specific hostnames instead of wildcards to limit exposure.",
                    &manifest,
                ));
            }
        }
    }

    for annotation in DANGEROUS_ANNOTATIONS {
        if annotations.contains_key(*annotation) {
            out.push(finding(
                "Ingress", name, namespace, Severity::Medium, "Security",
                "Potentially dangerous Ingress annotation",
                format!("Ingress '{name}' uses annotation '{annotation}' which could be used to bypass security controls or inject configuration."),
                "Review if this annotation is necessary and ensure it doesn't introduce security vulnerabilities.",
                &manifest,
            ));
        }
    }

    out
}

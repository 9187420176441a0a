//! CronJob checks, ported from
//! `original_source/security-scanner/services/scanners/resource_scanners.py`
//! (`scan_single_cronjob`).

use k8s_openapi::api::batch::v1::CronJob;
use kure_core::models::{SecurityFindingCreate, Severity};

use super::base::resource_manifest;
use super::finding;

pub fn scan(cronjob: &CronJob) -> Vec<SecurityFindingCreate> {
    let mut out = Vec::new();
    let namespace = cronjob.metadata.namespace.as_deref().unwrap_or_default();
    let name = cronjob.metadata.name.as_deref().unwrap_or_default();
    let manifest = resource_manifest(cronjob, "batch/v1", "CronJob");
    let Some(spec) = &cronjob.spec else { return out };

    if let Some(limit) = spec.successful_jobs_history_limit {
        if limit > 10 {
            out.push(finding(
                "CronJob", name, namespace, Severity::Low, "Best Practice",
                "CronJob retains excessive job history",
                format!("CronJob '{name}' retains {limit} successful jobs. This can consume significant cluster resources over time."),
                "Set successfulJobsHistoryLimit to a lower value (e.g., 3) to reduce resource consumption.",
                &manifest,
            ));
        }
    }

    let Some(job_spec) = &spec.job_template.spec else { return out };
    let Some(pod_spec) = &job_spec.template.spec else { return out };

    let containers = pod_spec.containers.iter().chain(pod_spec.init_containers.iter().flatten());
    for container in containers {
        if container.security_context.as_ref().and_then(|c| c.privileged).unwrap_or(false) {
            out.push(finding(
                "CronJob", name, namespace, Severity::Critical, "Security",
                format!("CronJob runs privileged container: {}", container.name),
                format!(
                    "CronJob '{name}' creates jobs with privileged container '{}'. Privileged jobs that run on schedule pose significant security risks.",
                    container.name
                ),
                "Remove 'privileged: true' from the container's securityContext. Use specific capabilities if elevated permissions are required.",
                &manifest,
            ));
        }
    }

    if pod_spec.host_network.unwrap_or(false) {
        out.push(finding(
            "CronJob", name, namespace, Severity::High, "Security",
            "CronJob uses host network",
            format!("CronJob '{name}' creates jobs with hostNetwork access, which bypasses network policies."),
            "Remove 'hostNetwork: true' unless the job specifically requires host network access.",
            &manifest,
        ));
    }

    out
}

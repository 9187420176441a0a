//! Rule-based remediation text, ported from the hardcoded fallback table
//! in `original_source/backend/services/solution_engine.py`. Computed
//! synchronously and attached to every ingest; the
//! [`crate::llm::LlmPort`] is only consulted on an explicit retry.

use kure_core::models::{ContainerStatus, PodEvent};

struct Rule {
    reason: &'static str,
    default: &'static str,
    patterns: &'static [(&'static str, &'static str)],
}

const RULES: &[Rule] = &[
    Rule {
        reason: "ImagePullBackOff",
        default: "The pod cannot pull the container image. Check: 1) image name and tag are correct, 2) image exists in the registry, 3) registry credentials are properly configured, 4) network connectivity to registry.",
        patterns: &[
            ("repository does not exist", "The image repository does not exist. Verify the image name and registry URL."),
            ("pull access denied", "Insufficient permissions to pull image. Check if imagePullSecrets are configured correctly."),
            ("not found", "Image or tag not found. Verify the image name and tag exist in the registry."),
        ],
    },
    Rule {
        reason: "ErrImagePull",
        default: "Error pulling container image. Verify: 1) image name syntax is correct, 2) registry is accessible, 3) authentication credentials if needed.",
        patterns: &[],
    },
    Rule {
        reason: "CrashLoopBackOff",
        default: "Container is crashing repeatedly. Check: 1) application logs for errors, 2) resource limits (CPU/memory), 3) environment variables and configuration, 4) health check configuration.",
        patterns: &[
            ("exit code 125", "Container failed to start. Check container configuration and command syntax."),
            ("exit code 126", "Container command not executable. Verify file permissions and executable path."),
            ("exit code 127", "Container command not found. Check if the command exists in the container."),
            ("oomkilled", "Container killed due to out of memory. Increase memory limits or optimize application memory usage."),
        ],
    },
    Rule {
        reason: "Pending",
        default: "Pod is stuck in pending state. Check: 1) node resources (CPU/memory), 2) node selectors and taints, 3) persistent volume availability, 4) image pull issues.",
        patterns: &[
            ("insufficient cpu", "Not enough CPU resources available. Scale cluster or reduce resource requests."),
            ("insufficient memory", "Not enough memory available. Scale cluster or reduce memory requests."),
            ("no nodes available", "No suitable nodes found. Check node selectors, taints, and tolerations."),
            ("pod has unbound immediate persistentvolumeclaims", "Missing persistent volume. Create PV or check storage class configuration."),
            ("failedscheduling", "Scheduler cannot place pod. Check node resources, taints/tolerations, and node selectors."),
        ],
    },
    Rule {
        reason: "FailedScheduling",
        default: "Pod cannot be scheduled to any node. Check: 1) node resources (CPU/memory), 2) node selectors match available nodes, 3) tolerations match node taints, 4) affinity rules are satisfiable.",
        patterns: &[
            ("insufficient cpu", "Not enough CPU resources on nodes. Scale cluster, reduce resource requests, or wait for other pods to complete."),
            ("insufficient memory", "Not enough memory on nodes. Scale cluster, reduce memory requests, or wait for other pods to complete."),
            ("node(s) didn't match pod's node affinity", "No nodes match the pod's node selector or affinity rules. Update selectors or add matching nodes."),
            ("node(s) had taint", "Nodes have taints that pod does not tolerate. Add tolerations to pod spec or remove taints from nodes."),
            ("persistentvolumeclaim", "PVC not bound. Check PVC status and ensure storage class/PV is available."),
            ("0/", "No nodes available for scheduling. Check if nodes are Ready and have sufficient resources."),
        ],
    },
    Rule {
        reason: "CreateContainerConfigError",
        default: "Error creating container configuration. Check: 1) ConfigMap and Secret references, 2) volume mount configurations, 3) environment variable references.",
        patterns: &[],
    },
    Rule {
        reason: "InvalidImageName",
        default: "Invalid container image name format. Verify image name follows registry/repository:tag format.",
        patterns: &[],
    },
    Rule {
        reason: "Error",
        default: "Pod is in error state. Check pod events and logs for specific error details.",
        patterns: &[],
    },
];

fn find_rule(reason: &str) -> Option<&'static Rule> {
    RULES.iter().find(|r| r.reason == reason)
}

fn pattern_solution(rule: &Rule, message: Option<&str>, events: &[PodEvent]) -> Option<&'static str> {
    let mut haystack = String::new();
    if let Some(m) = message {
        haystack.push_str(&m.to_lowercase());
    }
    for event in events {
        haystack.push(' ');
        haystack.push_str(&event.message.to_lowercase());
    }
    rule.patterns
        .iter()
        .find(|(pattern, _)| haystack.contains(&pattern.to_lowercase()))
        .map(|(_, solution)| *solution)
}

fn enhance(base: String, reason: &str, container_statuses: &[ContainerStatus], events: &[PodEvent]) -> String {
    let mut enhancements = Vec::new();

    match reason {
        "ImagePullBackOff" => enhancements.push(
            "Commands to check: 'kubectl describe pod <pod-name>' and 'docker pull <image>' on a node.".to_string(),
        ),
        "CrashLoopBackOff" => {
            enhancements.push("Commands: 'kubectl logs <pod-name> --previous' to see crash logs.".to_string());
            for status in container_statuses {
                if status.restart_count > 5 {
                    enhancements.push(format!(
                        "Container '{}' has restarted {} times - investigate application startup issues.",
                        status.name, status.restart_count
                    ));
                }
            }
        }
        "Pending" => enhancements.push(
            "Commands: 'kubectl describe pod <pod-name>' and 'kubectl get nodes' to check resources.".to_string(),
        ),
        _ => {}
    }

    for event in events {
        if event.reason.contains("FailedScheduling") {
            enhancements.push("Scheduling issue detected - check node capacity and pod requirements.".to_string());
        } else if event.reason.contains("FailedMount") {
            enhancements.push("Volume mount issue - verify PVC and volume configuration.".to_string());
        }
    }

    if enhancements.is_empty() {
        base
    } else {
        format!("{base} Additional info: {}", enhancements.join(" "))
    }
}

/// Computes the default remediation text for a failure. Always succeeds —
/// unknown reasons get a generic "check events and logs" message rather
/// than an error, since a solution string is attached to every ingest.
pub fn rule_based_solution(
    reason: &str,
    message: Option<&str>,
    events: &[PodEvent],
    container_statuses: &[ContainerStatus],
) -> String {
    let base = match find_rule(reason) {
        Some(rule) => pattern_solution(rule, message, events)
            .map(str::to_string)
            .unwrap_or_else(|| rule.default.to_string()),
        None => format!("Unknown failure reason: {reason}. Check pod events and logs for more details."),
    };

    enhance(base, reason, container_statuses, events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_reason_falls_back_to_default() {
        let solution = rule_based_solution("ErrImagePull", None, &[], &[]);
        assert!(solution.contains("Error pulling container image"));
    }

    #[test]
    fn pattern_match_overrides_default() {
        let solution = rule_based_solution(
            "CrashLoopBackOff",
            Some("Container exited, OOMKilled"),
            &[],
            &[],
        );
        assert!(solution.contains("out of memory"));
    }

    #[test]
    fn unknown_reason_gets_generic_message() {
        let solution = rule_based_solution("SomeNewReason", None, &[], &[]);
        assert!(solution.starts_with("Unknown failure reason: SomeNewReason"));
    }

    #[test]
    fn high_restart_count_adds_enhancement() {
        let statuses = vec![ContainerStatus {
            name: "app".into(),
            ready: false,
            restart_count: 9,
            image: "app:latest".into(),
            state: "waiting".into(),
            reason: None,
            message: None,
            exit_code: None,
        }];
        let solution = rule_based_solution("CrashLoopBackOff", None, &[], &statuses);
        assert!(solution.contains("restarted 9 times"));
    }
}

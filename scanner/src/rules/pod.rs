//! Pod and container security checks, ported from
//! `original_source/security-scanner/services/scanners/pod_scanner.py`.

use k8s_openapi::api::core::v1::{Container, Pod};
use kure_core::models::{SecurityFindingCreate, Severity};

use super::base::{get_image_registry, parse_size_to_bytes, resource_manifest, CRITICAL_HOST_PATHS, DANGEROUS_CAPABILITIES, LARGE_EMPTYDIR_THRESHOLD, TRUSTED_REGISTRIES};
use super::finding;

fn all_containers(pod: &Pod) -> Vec<&Container> {
    let spec = match &pod.spec {
        Some(s) => s,
        None => return Vec::new(),
    };
    spec.containers
        .iter()
        .chain(spec.init_containers.iter().flatten())
        .collect()
}

/// Every check this module knows about for a single pod, except the
/// trusted-registry check (that one needs the exclusion cache's live
/// admin-configured registry list, so the orchestrator runs it separately
/// via [`untrusted_registry_findings`]).
pub fn scan(pod: &Pod) -> Vec<SecurityFindingCreate> {
    let mut out = Vec::new();
    let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
    let pod_name = pod.metadata.name.as_deref().unwrap_or_default();
    let manifest = resource_manifest(pod, "v1", "Pod");

    let Some(spec) = &pod.spec else { return out };

    if spec.host_network.unwrap_or(false) {
        out.push(finding(
            "Pod", pod_name, namespace, Severity::High, "Security",
            "Pod uses host network namespace",
            "Pod is using the host network namespace, which exposes the host's network stack to the container and bypasses network policies.",
            "Remove 'hostNetwork: true' unless required for specific use cases like CNI plugins or monitoring agents.",
            &manifest,
        ));
    }

    if spec.host_pid.unwrap_or(false) {
        out.push(finding(
            "Pod", pod_name, namespace, Severity::High, "Security",
            "Pod uses host PID namespace",
            "Pod is using the host PID namespace, which allows viewing and signaling all processes on the host.",
            "Remove 'hostPID: true' unless absolutely necessary for debugging or monitoring.",
            &manifest,
        ));
    }

    if spec.host_ipc.unwrap_or(false) {
        out.push(finding(
            "Pod", pod_name, namespace, Severity::High, "Security",
            "Pod uses host IPC namespace",
            "Pod is using the host IPC namespace, which allows reading shared memory with host processes.",
            "Remove 'hostIPC: true' from the pod specification.",
            &manifest,
        ));
    }

    for volume in spec.volumes.iter().flatten() {
        if let Some(host_path) = &volume.host_path {
            let severity = if CRITICAL_HOST_PATHS.contains(&host_path.path.as_str()) { Severity::Critical } else { Severity::High };
            out.push(finding(
                "Pod", pod_name, namespace, severity, "Security",
                format!("HostPath volume mounted: {}", host_path.path),
                format!("Volume '{}' mounts host path '{}'. This provides direct access to the host filesystem and can lead to container escape.", volume.name, host_path.path),
                "Use persistent volumes, configMaps, secrets, or emptyDir instead of hostPath volumes.",
                &manifest,
            ));
        }
        if let Some(empty_dir) = &volume.empty_dir {
            if let Some(size_limit) = &empty_dir.size_limit {
                if let Some(bytes) = parse_size_to_bytes(&size_limit.0) {
                    if bytes > LARGE_EMPTYDIR_THRESHOLD {
                        out.push(finding(
                            "Pod", pod_name, namespace, Severity::Low, "Best Practice",
                            format!("EmptyDir with large sizeLimit: {}", volume.name),
                            format!("Volume '{}' has emptyDir with sizeLimit of {}. Large emptyDir volumes can exhaust node disk space.", volume.name, size_limit.0),
                            "Consider using PersistentVolumes for large storage needs, or reduce the sizeLimit.",
                            &manifest,
                        ));
                    }
                }
            }
        }
    }

    let containers = all_containers(pod);
    let annotations = pod.metadata.annotations.clone().unwrap_or_default();
    let pod_sec_ctx = spec.security_context.as_ref();
    let pod_run_as_non_root = pod_sec_ctx.and_then(|c| c.run_as_non_root).unwrap_or(false);
    let pod_has_selinux = pod_sec_ctx.map(|c| c.se_linux_options.is_some()).unwrap_or(false);

    for container in &containers {
        let container_name = container.name.as_str();
        let sec_ctx = container.security_context.as_ref();

        if sec_ctx.and_then(|c| c.privileged).unwrap_or(false) {
            out.push(finding(
                "Pod", pod_name, namespace, Severity::Critical, "Security",
                format!("Privileged container: {container_name}"),
                format!("Container '{container_name}' is running in privileged mode, which grants full access to all host devices and capabilities. This is equivalent to root on the host."),
                "Remove 'privileged: true' from the container's securityContext. Use specific capabilities if needed.",
                &manifest,
            ));
        }

        let escalation_allowed = sec_ctx.and_then(|c| c.allow_privilege_escalation);
        if escalation_allowed.is_none() || escalation_allowed == Some(true) {
            out.push(finding(
                "Pod", pod_name, namespace, Severity::High, "Security",
                format!("Privilege escalation allowed: {container_name}"),
                format!("Container '{container_name}' allows privilege escalation via setuid binaries or filesystem capabilities."),
                "Set 'allowPrivilegeEscalation: false' in the container's securityContext.",
                &manifest,
            ));
        }

        if let Some(caps) = sec_ctx.and_then(|c| c.capabilities.as_ref()) {
            let dangerous: Vec<&str> = caps
                .add
                .iter()
                .flatten()
                .map(String::as_str)
                .filter(|c| DANGEROUS_CAPABILITIES.contains(c))
                .collect();
            if !dangerous.is_empty() {
                out.push(finding(
                    "Pod", pod_name, namespace, Severity::High, "Security",
                    format!("Dangerous capabilities added: {container_name}"),
                    format!("Container '{container_name}' adds dangerous capabilities: {}. These can be used for container escape or privilege escalation.", dangerous.join(", ")),
                    "Remove dangerous capabilities from the container. Only NET_BIND_SERVICE is allowed in the Restricted policy.",
                    &manifest,
                ));
            }
        }

        let caps_dropped_all = sec_ctx
            .and_then(|c| c.capabilities.as_ref())
            .and_then(|caps| caps.drop.as_ref())
            .map(|drop| drop.iter().any(|c| c.eq_ignore_ascii_case("all")))
            .unwrap_or(false);
        if !caps_dropped_all {
            out.push(finding(
                "Pod", pod_name, namespace, Severity::Medium, "Security",
                format!("Capabilities not dropped: {container_name}"),
                format!("Container '{container_name}' does not drop all capabilities. Containers inherit default capabilities that may not be needed."),
                "Add 'drop: [\"ALL\"]' to capabilities and only add back specific needed capabilities.",
                &manifest,
            ));
        }

        let run_as_non_root = sec_ctx.and_then(|c| c.run_as_non_root).unwrap_or(false);
        let explicit_root = sec_ctx.and_then(|c| c.run_as_user) == Some(0);

        if explicit_root {
            out.push(finding(
                "Pod", pod_name, namespace, Severity::High, "Security",
                format!("Container runs as root (UID 0): {container_name}"),
                format!("Container '{container_name}' explicitly sets runAsUser: 0 (root). Running as root increases the impact of container escape."),
                "Set 'runAsUser' to a non-zero UID (e.g., 1000) and 'runAsNonRoot: true'.",
                &manifest,
            ));
        } else if !run_as_non_root && !pod_run_as_non_root {
            out.push(finding(
                "Pod", pod_name, namespace, Severity::Medium, "Security",
                format!("Container may run as root: {container_name}"),
                format!("Container '{container_name}' does not explicitly prevent running as root user."),
                "Set 'runAsNonRoot: true' in the container's or pod's securityContext.",
                &manifest,
            ));
        }

        if !sec_ctx.and_then(|c| c.read_only_root_filesystem).unwrap_or(false) {
            out.push(finding(
                "Pod", pod_name, namespace, Severity::Medium, "Security",
                format!("Writable root filesystem: {container_name}"),
                format!("Container '{container_name}' has a writable root filesystem, which allows attackers to modify binaries or add malicious files."),
                "Set 'readOnlyRootFilesystem: true' and use emptyDir or volumes for writable paths.",
                &manifest,
            ));
        }

        let has_limits = container.resources.as_ref().and_then(|r| r.limits.as_ref()).map(|l| !l.is_empty()).unwrap_or(false);
        if !has_limits {
            out.push(finding(
                "Pod", pod_name, namespace, Severity::Medium, "Best Practice",
                format!("Missing resource limits: {container_name}"),
                format!("Container '{container_name}' does not have resource limits defined, which can lead to resource exhaustion and DoS."),
                "Add resource limits (cpu and memory) to the container specification.",
                &manifest,
            ));
        }

        for port in container.ports.iter().flatten() {
            if let Some(host_port) = port.host_port {
                out.push(finding(
                    "Pod", pod_name, namespace, Severity::Medium, "Security",
                    format!("Host port exposed: {host_port}"),
                    format!("Container '{container_name}' exposes host port {host_port}. This bypasses Kubernetes networking and may expose the service on all nodes."),
                    "Use Services (ClusterIP, NodePort, LoadBalancer) instead of hostPort for external access.",
                    &manifest,
                ));
            }
        }

        for env in container.env.iter().flatten() {
            if let Some(secret_ref) = env.value_from.as_ref().and_then(|v| v.secret_key_ref.as_ref()) {
                out.push(finding(
                    "Pod", pod_name, namespace, Severity::Low, "Best Practice",
                    format!("Secret exposed as environment variable: {}", env.name),
                    format!(
                        "Container '{container_name}' exposes secret '{}' as environment variable '{}'. Env vars can be leaked in logs, error messages, or child processes.",
                        secret_ref.name.clone().unwrap_or_default(), env.name
                    ),
                    "Mount secrets as files using volumes instead of environment variables.",
                    &manifest,
                ));
            }
        }

        let image = container.image.clone().unwrap_or_default();
        let mutable_tag = image.ends_with(":latest") || !image.rsplit('/').next().unwrap_or("").contains(':');

        if mutable_tag {
            out.push(finding(
                "Pod", pod_name, namespace, Severity::Medium, "Best Practice",
                format!("Image uses :latest or no tag: {container_name}"),
                format!("Container '{container_name}' uses image '{image}' with :latest or no tag. Mutable tags can introduce unexpected changes and make rollbacks difficult."),
                "Use immutable image tags (e.g., specific versions or SHA digests) for reproducible deployments.",
                &manifest,
            ));
        }

        let pull_policy = container.image_pull_policy.as_deref();
        if (pull_policy.is_none() || pull_policy == Some("IfNotPresent")) && mutable_tag {
            out.push(finding(
                "Pod", pod_name, namespace, Severity::Low, "Best Practice",
                format!("Missing imagePullPolicy with mutable tag: {container_name}"),
                format!("Container '{container_name}' uses a mutable image tag without imagePullPolicy: Always. Cached vulnerable images may be used."),
                "Set imagePullPolicy: Always when using mutable tags, or use immutable image tags.",
                &manifest,
            ));
        }

        let apparmor_key = format!("container.apparmor.security.beta.kubernetes.io/{container_name}");
        if !annotations.contains_key(&apparmor_key) {
            out.push(finding(
                "Pod", pod_name, namespace, Severity::Medium, "Security",
                format!("Missing AppArmor profile: {container_name}"),
                format!("Container '{container_name}' does not have an AppArmor profile configured. AppArmor provides mandatory access control for Linux applications."),
                format!("Add annotation '{apparmor_key}: runtime/default' to use the default AppArmor profile."),
                &manifest,
            ));
        }

        let container_has_selinux = sec_ctx.map(|c| c.se_linux_options.is_some()).unwrap_or(false);
        if !pod_has_selinux && !container_has_selinux {
            out.push(finding(
                "Pod", pod_name, namespace, Severity::Medium, "Security",
                format!("Missing SELinux options: {container_name}"),
                format!("Container '{container_name}' does not have SELinux options configured. SELinux provides mandatory access control enforcement."),
                "Configure seLinuxOptions in the pod or container securityContext if running on SELinux-enabled nodes.",
                &manifest,
            ));
        }
    }

    out
}

/// Untrusted-registry check, separated from [`scan`] because it needs the
/// live admin-configured trusted registry list from the exclusion cache.
pub fn untrusted_registry_findings(pod: &Pod, admin_trusted: &[String]) -> Vec<SecurityFindingCreate> {
    let mut out = Vec::new();
    let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
    let pod_name = pod.metadata.name.as_deref().unwrap_or_default();
    let manifest = resource_manifest(pod, "v1", "Pod");

    for container in all_containers(pod) {
        let image = container.image.clone().unwrap_or_default();
        let Some(registry) = get_image_registry(&image) else { continue };
        if TRUSTED_REGISTRIES.contains(&registry.as_str()) || admin_trusted.iter().any(|r| r == &registry) {
            continue;
        }
        out.push(finding(
            "Pod", pod_name, namespace, Severity::High, "Security",
            format!("Image from untrusted registry: {}", container.name),
            format!("Container '{}' uses image from registry '{registry}' which is not in the trusted registry list.", container.name),
            format!("Use images from trusted registries: {}. Or add the registry to the trusted list via the Admin panel.", TRUSTED_REGISTRIES[..4].join(", ")),
            &manifest,
        ));
    }

    out
}

/// Default-ServiceAccount and auto-mount checks.
/// `sa_default_automount` is `None` when the referenced ServiceAccount
/// could not be read (mirrors the Python's silent 403 tolerance).
pub fn service_account_findings(pod: &Pod, sa_default_automount: Option<bool>) -> Vec<SecurityFindingCreate> {
    let mut out = Vec::new();
    let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
    let pod_name = pod.metadata.name.as_deref().unwrap_or_default();
    let manifest = resource_manifest(pod, "v1", "Pod");
    let Some(spec) = &pod.spec else { return out };

    let sa_name = spec.service_account_name.clone().unwrap_or_else(|| "default".to_string());

    if sa_name == "default" {
        out.push(finding(
            "Pod", pod_name, namespace, Severity::Low, "Best Practice",
            "Pod uses default ServiceAccount",
            format!("Pod '{pod_name}' uses the default service account. This makes it harder to apply the principle of least privilege."),
            "Create a dedicated ServiceAccount for this workload and assign only the permissions it needs.",
            &manifest,
        ));
    }

    let pod_automount = spec.automount_service_account_token;
    if pod_automount.is_none() || pod_automount == Some(true) {
        if sa_default_automount.is_none() || sa_default_automount == Some(true) {
            out.push(finding(
                "Pod", pod_name, namespace, Severity::Medium, "Security",
                "ServiceAccount token auto-mounted",
                format!("Pod '{pod_name}' has the ServiceAccount token automatically mounted. If compromised, this token can be used to access the Kubernetes API."),
                "Set 'automountServiceAccountToken: false' in the pod spec or service account if API access is not needed.",
                &manifest,
            ));
        }
    }

    let (sa_namespace, sa_name) = match sa_name.split_once('/') {
        Some((ns, name)) => (ns.to_string(), name.to_string()),
        None => (namespace.to_string(), sa_name),
    };

    if sa_namespace == "kube-system" || (namespace != "kube-system" && sa_name.starts_with("system:")) {
        out.push(finding(
            "Pod", pod_name, namespace, Severity::Medium, "Security",
            format!("Pod uses system ServiceAccount: {sa_name}"),
            format!("Pod '{pod_name}' uses a system-level ServiceAccount. This could grant unintended elevated permissions."),
            "Create a dedicated ServiceAccount in the workload's namespace with only required permissions.",
            &manifest,
        ));
    }

    out
}

/// Seccomp profile check (PSS Restricted requirement), one finding per
/// container lacking `RuntimeDefault`/`Localhost` at either pod or
/// container scope.
pub fn seccomp_findings(pod: &Pod) -> Vec<SecurityFindingCreate> {
    let mut out = Vec::new();
    let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
    let pod_name = pod.metadata.name.as_deref().unwrap_or_default();
    let manifest = resource_manifest(pod, "v1", "Pod");
    let Some(spec) = &pod.spec else { return out };

    let is_restricted_type = |t: &str| t == "RuntimeDefault" || t == "Localhost";
    let pod_has_seccomp = spec
        .security_context
        .as_ref()
        .and_then(|c| c.seccomp_profile.as_ref())
        .map(|p| is_restricted_type(&p.type_))
        .unwrap_or(false);

    for container in all_containers(pod) {
        let container_has_seccomp = container
            .security_context
            .as_ref()
            .and_then(|c| c.seccomp_profile.as_ref())
            .map(|p| is_restricted_type(&p.type_))
            .unwrap_or(false);

        if !pod_has_seccomp && !container_has_seccomp {
            out.push(finding(
                "Pod", pod_name, namespace, Severity::Medium, "Security",
                format!("Missing seccomp profile: {}", container.name),
                format!("Container '{}' does not have a seccomp profile configured. Seccomp restricts which system calls a container can make.", container.name),
                "Set seccompProfile.type to 'RuntimeDefault' in the pod or container securityContext. This is required for PSS Restricted compliance.",
                &manifest,
            ));
        }
    }

    out
}

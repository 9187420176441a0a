//! The scanning engine: composes the backend client, exclusion cache, and
//! rule catalog into the startup sequence, full-cluster sweep, and
//! real-time watch dispatch described by
//! `original_source/security-scanner/services/security_scanner.py`.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, PersistentVolume, Pod, ResourceQuota, LimitRange, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role};
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::client::BackendClient;
use crate::exclusions::ExclusionCache;
use crate::rules;
use crate::watch::{self, WatchSink};
use crate::ws_client::{ExclusionChangeHandler, WsClient};

type ResourceKey = (String, String, String);

pub struct ScannerEngine {
    client: Client,
    backend_url: String,
    backend: Arc<BackendClient>,
    exclusions: Arc<ExclusionCache>,
    tracked: Mutex<HashSet<ResourceKey>>,
}

impl ScannerEngine {
    pub fn new(client: Client, backend_url: String) -> Arc<Self> {
        let backend = Arc::new(BackendClient::new(&backend_url));
        let exclusions = Arc::new(ExclusionCache::new(backend.clone()));
        Arc::new(ScannerEngine {
            client,
            backend_url,
            backend,
            exclusions,
            tracked: Mutex::new(HashSet::new()),
        })
    }

    async fn report_findings(&self, findings: Vec<kure_core::models::SecurityFindingCreate>) {
        for finding in findings {
            if self.exclusions.is_rule_excluded(&finding.title, Some(&finding.namespace)).await {
                continue;
            }
            let key = (finding.resource_type.clone(), finding.namespace.clone(), finding.resource_name.clone());
            self.tracked.lock().await.insert(key);
            self.backend.report_security_finding(&finding).await;
        }
    }

    async fn handle_deletion(&self, resource_type: &str, namespace: &str, name: &str) {
        let key = (resource_type.to_string(), namespace.to_string(), name.to_string());
        let was_tracked = self.tracked.lock().await.remove(&key);
        if was_tracked {
            info!(resource_type, namespace, name, "resource_deleted_removing_findings");
            self.backend.delete_findings_by_resource(resource_type, namespace, name).await;
        }
    }

    // --- single-resource scans (shared by bulk sweep and real-time watch) ---

    pub async fn scan_single_pod(&self, pod: &Pod) {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        if self.exclusions.is_namespace_excluded(&namespace).await {
            return;
        }
        let pod_name = pod.metadata.name.clone().unwrap_or_default();
        self.backend.delete_findings_by_resource("Pod", &namespace, &pod_name).await;

        let mut findings = rules::pod::scan(pod);
        let admin_trusted = self.exclusions.trusted_registries().await;
        findings.extend(rules::pod::untrusted_registry_findings(pod, &admin_trusted));
        self.report_findings(findings).await;
    }

    pub async fn scan_single_deployment(&self, deployment: &Deployment) {
        let namespace = deployment.metadata.namespace.clone().unwrap_or_default();
        if self.exclusions.is_namespace_excluded(&namespace).await {
            return;
        }
        let name = deployment.metadata.name.clone().unwrap_or_default();
        self.backend.delete_findings_by_resource("Deployment", &namespace, &name).await;
        self.report_findings(rules::deployment::scan(deployment)).await;
    }

    pub async fn scan_single_service(&self, service: &Service) {
        let namespace = service.metadata.namespace.clone().unwrap_or_default();
        if self.exclusions.is_namespace_excluded(&namespace).await {
            return;
        }
        let name = service.metadata.name.clone().unwrap_or_default();
        self.backend.delete_findings_by_resource("Service", &namespace, &name).await;
        self.report_findings(rules::service::scan(service)).await;
    }

    pub async fn scan_single_cluster_role(&self, role: &ClusterRole) {
        let name = role.metadata.name.clone().unwrap_or_default();
        self.backend.delete_findings_by_resource("ClusterRole", "cluster-wide", &name).await;
        self.report_findings(rules::rbac::scan_cluster_role(role)).await;
    }

    pub async fn scan_single_role(&self, role: &Role) {
        let namespace = role.metadata.namespace.clone().unwrap_or_default();
        if self.exclusions.is_namespace_excluded(&namespace).await {
            return;
        }
        let name = role.metadata.name.clone().unwrap_or_default();
        self.backend.delete_findings_by_resource("Role", &namespace, &name).await;
        self.report_findings(rules::rbac::scan_role(role)).await;
    }

    pub async fn scan_single_ingress(&self, ingress: &Ingress) {
        let namespace = ingress.metadata.namespace.clone().unwrap_or_default();
        if self.exclusions.is_namespace_excluded(&namespace).await {
            return;
        }
        let name = ingress.metadata.name.clone().unwrap_or_default();
        self.backend.delete_findings_by_resource("Ingress", &namespace, &name).await;
        self.report_findings(rules::ingress::scan(ingress)).await;
    }

    pub async fn scan_single_cronjob(&self, cronjob: &CronJob) {
        let namespace = cronjob.metadata.namespace.clone().unwrap_or_default();
        if self.exclusions.is_namespace_excluded(&namespace).await {
            return;
        }
        let name = cronjob.metadata.name.clone().unwrap_or_default();
        self.backend.delete_findings_by_resource("CronJob", &namespace, &name).await;
        self.report_findings(rules::cronjob::scan(cronjob)).await;
    }

    // --- bulk sweeps (initial scan_cluster pass) ---

    async fn rescan_all_pods(&self) {
        self.scan_pods().await;
    }

    async fn rescan_namespace_pods(&self, namespace: &str) {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        match pods.list(&ListParams::default()).await {
            Ok(list) => {
                for pod in &list.items {
                    self.scan_single_pod(pod).await;
                }
            }
            Err(e) => error!(namespace, error = %e, "namespace_pod_rescan_failed"),
        }
    }

    async fn scan_pods(&self) {
        info!("scanning_pods");
        let api: Api<Pod> = Api::all(self.client.clone());
        match api.list(&ListParams::default()).await {
            Ok(list) => {
                for pod in &list.items {
                    self.scan_single_pod(pod).await;
                }
            }
            Err(e) => error!(error = %e, "pod_scan_failed"),
        }
    }

    async fn scan_deployments(&self) {
        info!("scanning_deployments");
        let api: Api<Deployment> = Api::all(self.client.clone());
        match api.list(&ListParams::default()).await {
            Ok(list) => {
                for d in &list.items {
                    self.scan_single_deployment(d).await;
                }
            }
            Err(e) => error!(error = %e, "deployment_scan_failed"),
        }
    }

    async fn scan_services(&self) {
        info!("scanning_services");
        let api: Api<Service> = Api::all(self.client.clone());
        match api.list(&ListParams::default()).await {
            Ok(list) => {
                for s in &list.items {
                    self.scan_single_service(s).await;
                }
            }
            Err(e) => error!(error = %e, "service_scan_failed"),
        }
    }

    async fn scan_rbac(&self) {
        info!("scanning_rbac");
        let cr_api: Api<ClusterRole> = Api::all(self.client.clone());
        match cr_api.list(&ListParams::default()).await {
            Ok(list) => {
                for role in &list.items {
                    if role.name_any().starts_with("system:") {
                        continue;
                    }
                    self.scan_single_cluster_role(role).await;
                }
            }
            Err(e) => error!(error = %e, "cluster_role_scan_failed"),
        }

        let role_api: Api<Role> = Api::all(self.client.clone());
        match role_api.list(&ListParams::default()).await {
            Ok(list) => {
                for role in &list.items {
                    self.scan_single_role(role).await;
                }
            }
            Err(e) => error!(error = %e, "role_scan_failed"),
        }
    }

    async fn scan_network_policies(&self) {
        info!("scanning_network_policies");
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let policies: Api<NetworkPolicy> = Api::all(self.client.clone());

        let (namespaces, policies) = match (namespaces.list(&ListParams::default()).await, policies.list(&ListParams::default()).await) {
            (Ok(ns), Ok(pol)) => (ns, pol),
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "network_policy_scan_failed");
                return;
            }
        };

        let covered: HashSet<String> = policies.items.iter().filter_map(|p| p.metadata.namespace.clone()).collect();

        for ns in &namespaces.items {
            let ns_name = ns.name_any();
            if self.exclusions.is_namespace_excluded(&ns_name).await {
                continue;
            }
            if !self.namespace_has_pods(&ns_name).await {
                continue;
            }
            if let Some(f) = rules::namespace::missing_network_policy_finding(ns, true, covered.contains(&ns_name)) {
                self.report_findings(vec![f]).await;
            }
        }
    }

    async fn namespace_has_pods(&self, namespace: &str) -> bool {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.list(&ListParams::default()).await.map(|l| !l.items.is_empty()).unwrap_or(false)
    }

    async fn scan_service_accounts(&self) {
        info!("scanning_service_accounts");
        let api: Api<Pod> = Api::all(self.client.clone());
        let pods = match api.list(&ListParams::default()).await {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "service_account_scan_failed");
                return;
            }
        };

        for pod in &pods.items {
            let namespace = pod.metadata.namespace.clone().unwrap_or_default();
            if self.exclusions.is_namespace_excluded(&namespace).await {
                continue;
            }
            let Some(spec) = &pod.spec else { continue };
            let sa_name = spec.service_account_name.clone().unwrap_or_else(|| "default".to_string());
            let automount = spec.automount_service_account_token;

            let sa_automount = if automount.is_none() || automount == Some(true) {
                let sa_api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), &namespace);
                sa_api.get(&sa_name).await.ok().and_then(|sa| sa.automount_service_account_token)
            } else {
                None
            };

            self.report_findings(rules::pod::service_account_findings(pod, sa_automount)).await;
        }
    }

    async fn scan_pod_security_admission(&self) {
        info!("scanning_pod_security_admission");
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespaces = match api.list(&ListParams::default()).await {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "psa_scan_failed");
                return;
            }
        };

        for ns in &namespaces.items {
            let ns_name = ns.name_any();
            if self.exclusions.is_namespace_excluded(&ns_name).await {
                continue;
            }
            if !self.namespace_has_pods(&ns_name).await {
                continue;
            }
            if let Some(f) = rules::namespace::pod_security_admission_finding(ns, true) {
                self.report_findings(vec![f]).await;
            }
        }
    }

    async fn scan_ingresses(&self) {
        info!("scanning_ingresses");
        let api: Api<Ingress> = Api::all(self.client.clone());
        match api.list(&ListParams::default()).await {
            Ok(list) => {
                for ingress in &list.items {
                    self.scan_single_ingress(ingress).await;
                }
            }
            Err(e) => error!(error = %e, "ingress_scan_failed"),
        }
    }

    async fn scan_seccomp_profiles(&self) {
        info!("scanning_seccomp_profiles");
        let api: Api<Pod> = Api::all(self.client.clone());
        match api.list(&ListParams::default()).await {
            Ok(list) => {
                for pod in &list.items {
                    let namespace = pod.metadata.namespace.clone().unwrap_or_default();
                    if self.exclusions.is_namespace_excluded(&namespace).await {
                        continue;
                    }
                    self.report_findings(rules::pod::seccomp_findings(pod)).await;
                }
            }
            Err(e) => error!(error = %e, "seccomp_scan_failed"),
        }
    }

    async fn scan_cluster_role_bindings(&self) {
        info!("scanning_cluster_role_bindings");
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        match api.list(&ListParams::default()).await {
            Ok(list) => {
                for binding in &list.items {
                    if binding.name_any().starts_with("system:") {
                        continue;
                    }
                    let name = binding.name_any();
                    self.backend.delete_findings_by_resource("ClusterRoleBinding", "cluster-wide", &name).await;
                    self.report_findings(rules::rbac::scan_cluster_role_binding(binding)).await;
                }
            }
            Err(e) => error!(error = %e, "cluster_role_binding_scan_failed"),
        }
    }

    async fn scan_pod_disruption_budgets(&self) {
        info!("scanning_pod_disruption_budgets");
        let deploy_api: Api<Deployment> = Api::all(self.client.clone());
        let pdb_api: Api<PodDisruptionBudget> = Api::all(self.client.clone());

        let (deployments, pdbs) = match (deploy_api.list(&ListParams::default()).await, pdb_api.list(&ListParams::default()).await) {
            (Ok(d), Ok(p)) => (d, p),
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "pdb_scan_failed");
                return;
            }
        };

        let mut eligible = Vec::new();
        for d in &deployments.items {
            let namespace = d.metadata.namespace.clone().unwrap_or_default();
            if !self.exclusions.is_namespace_excluded(&namespace).await {
                eligible.push(d.clone());
            }
        }

        self.report_findings(rules::deployment::missing_pdb_findings(&eligible, &pdbs.items)).await;
    }

    async fn scan_resource_quotas(&self) {
        info!("scanning_resource_quotas");
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespaces = match api.list(&ListParams::default()).await {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "resource_quota_scan_failed");
                return;
            }
        };

        for ns in &namespaces.items {
            let ns_name = ns.name_any();
            if self.exclusions.is_namespace_excluded(&ns_name).await {
                continue;
            }
            if !self.namespace_has_pods(&ns_name).await {
                continue;
            }

            let quota_api: Api<ResourceQuota> = Api::namespaced(self.client.clone(), &ns_name);
            let limit_api: Api<LimitRange> = Api::namespaced(self.client.clone(), &ns_name);
            let has_quota = quota_api.list(&ListParams::default()).await.map(|l| !l.items.is_empty()).unwrap_or(true);
            let has_limit_range = limit_api.list(&ListParams::default()).await.map(|l| !l.items.is_empty()).unwrap_or(true);

            self.report_findings(rules::namespace::resource_governance_findings(ns, true, has_quota, has_limit_range)).await;
        }
    }

    async fn scan_configmaps(&self) {
        info!("scanning_configmaps");
        let api: Api<ConfigMap> = Api::all(self.client.clone());
        match api.list(&ListParams::default()).await {
            Ok(list) => {
                for cm in &list.items {
                    let namespace = cm.metadata.namespace.clone().unwrap_or_default();
                    if self.exclusions.is_namespace_excluded(&namespace).await {
                        continue;
                    }
                    self.report_findings(rules::configmap::scan(cm)).await;
                }
            }
            Err(e) => error!(error = %e, "configmap_scan_failed"),
        }
    }

    async fn scan_cronjobs(&self) {
        info!("scanning_cronjobs");
        let api: Api<CronJob> = Api::all(self.client.clone());
        match api.list(&ListParams::default()).await {
            Ok(list) => {
                for cj in &list.items {
                    self.scan_single_cronjob(cj).await;
                }
            }
            Err(e) => error!(error = %e, "cronjob_scan_failed"),
        }
    }

    async fn scan_persistent_volumes(&self) {
        info!("scanning_persistent_volumes");
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        match api.list(&ListParams::default()).await {
            Ok(list) => {
                for pv in &list.items {
                    let name = pv.metadata.name.clone().unwrap_or_default();
                    self.backend.delete_findings_by_resource("PersistentVolume", "cluster-wide", &name).await;
                    self.report_findings(rules::pv::scan(pv)).await;
                }
            }
            Err(e) => error!(error = %e, "pv_scan_failed"),
        }
    }

    /// Runs every bulk check once, in the order
    /// `original_source/security-scanner/services/security_scanner.py`'s
    /// `scan_cluster` uses, then reports the total duration for the
    /// `kure_security_scan_duration_seconds` histogram.
    pub async fn scan_cluster(&self) -> anyhow::Result<()> {
        let start = std::time::Instant::now();

        self.exclusions.force_refresh_namespaces().await;
        self.exclusions.force_refresh_rules().await;

        self.scan_pods().await;
        self.scan_deployments().await;
        self.scan_services().await;
        self.scan_rbac().await;
        self.scan_network_policies().await;
        self.scan_service_accounts().await;
        self.scan_pod_security_admission().await;
        self.scan_ingresses().await;
        self.scan_seccomp_profiles().await;
        self.scan_cluster_role_bindings().await;
        self.scan_pod_disruption_budgets().await;
        self.scan_resource_quotas().await;
        self.scan_configmaps().await;
        self.scan_cronjobs().await;
        self.scan_persistent_volumes().await;

        let duration = start.elapsed().as_secs_f64();
        self.backend.report_scan_duration(duration).await;
        info!(seconds = duration, "cluster_scan_completed");
        Ok(())
    }

    /// Startup sequence: wait for the backend's migrations to
    /// finish, clear any stale findings from a previous run, prime the
    /// exclusion caches, run one full sweep, then hand off to real-time
    /// watches for everything after.
    pub async fn start_scanning(self: Arc<Self>) -> anyhow::Result<()> {
        self.backend.wait_until_ready().await?;
        self.backend.clear_security_findings().await;
        self.exclusions.force_refresh_namespaces().await;
        self.exclusions.force_refresh_rules().await;
        self.scan_cluster().await?;

        let mut tasks = JoinSet::new();

        macro_rules! spawn_watch {
            ($kind:ty, $resource_type:expr, $handle_403:expr, $sink:expr) => {{
                let api: Api<$kind> = Api::all(self.client.clone());
                let sink = $sink;
                tasks.spawn(async move { watch::run(api, $resource_type, $handle_403, sink).await });
            }};
        }

        spawn_watch!(Pod, "Pod", false, Arc::new(PodSink(self.clone())));
        spawn_watch!(Deployment, "Deployment", false, Arc::new(DeploymentSink(self.clone())));
        spawn_watch!(Service, "Service", false, Arc::new(ServiceSink(self.clone())));
        spawn_watch!(ClusterRole, "ClusterRole", false, Arc::new(ClusterRoleSink(self.clone())));
        spawn_watch!(Role, "Role", false, Arc::new(RoleSink(self.clone())));
        spawn_watch!(Ingress, "Ingress", false, Arc::new(IngressSink(self.clone())));
        spawn_watch!(CronJob, "CronJob", true, Arc::new(CronJobSink(self.clone())));
        spawn_watch!(Namespace, "Namespace", false, Arc::new(DeletionOnlySink { engine: self.clone(), resource_type: "Namespace", namespaced: false }));
        spawn_watch!(DaemonSet, "DaemonSet", false, Arc::new(DeletionOnlySink { engine: self.clone(), resource_type: "DaemonSet", namespaced: true }));
        spawn_watch!(StatefulSet, "StatefulSet", false, Arc::new(DeletionOnlySink { engine: self.clone(), resource_type: "StatefulSet", namespaced: true }));

        let ws_client = WsClient::new(&self.backend_url);
        let ws_handler: Arc<dyn ExclusionChangeHandler> = self.clone();
        tasks.spawn(async move { ws_client.run(ws_handler).await });

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown_signal_received");
            }
            _ = tasks.join_next() => {
                warn!("a_scanner_task_exited_unexpectedly");
            }
        }

        tasks.shutdown().await;
        Ok(())
    }
}

#[async_trait]
impl ExclusionChangeHandler for ScannerEngine {
    async fn on_namespace_change(&self, namespace: &str, excluded: bool) {
        self.exclusions.force_refresh_namespaces().await;
        info!(namespace, excluded, "namespace_exclusion_change_received");
        // Excluded: the backend already deleted the namespace's findings,
        // nothing to rescan. Included: it may now host findings it was
        // hiding while excluded.
        if !excluded {
            self.rescan_namespace_pods(namespace).await;
        }
    }

    async fn on_rule_change(&self, rule_title: &str, excluded: bool, namespace: Option<&str>) {
        self.exclusions.force_refresh_rules().await;
        info!(rule_title, excluded, namespace, "rule_exclusion_change_received");
        if excluded {
            return;
        }
        if let Err(e) = self.scan_cluster().await {
            error!(error = %e, "rescan_after_rule_change_failed");
        }
    }

    async fn on_registry_change(&self, registry: &str, added: bool) {
        self.exclusions.force_refresh_registries().await;
        info!(registry, added, "trusted_registry_change_received");
        self.backend.report_rescan_status("started").await;
        self.rescan_all_pods().await;
        self.backend.report_rescan_status("completed").await;
    }
}

macro_rules! applied_only_sink {
    ($name:ident, $kind:ty, $method:ident) => {
        struct $name(Arc<ScannerEngine>);

        #[async_trait]
        impl WatchSink<$kind> for $name {
            async fn applied(&self, obj: $kind) {
                self.0.$method(&obj).await;
            }
            async fn deleted(&self, obj: $kind) {
                let namespace = obj.namespace().unwrap_or_default();
                if self.0.exclusions.is_namespace_excluded(&namespace).await {
                    return;
                }
                self.0.handle_deletion(stringify!($kind), &namespace, &obj.name_any()).await;
            }
        }
    };
}

applied_only_sink!(PodSink, Pod, scan_single_pod);
applied_only_sink!(DeploymentSink, Deployment, scan_single_deployment);
applied_only_sink!(ServiceSink, Service, scan_single_service);
applied_only_sink!(RoleSink, Role, scan_single_role);
applied_only_sink!(IngressSink, Ingress, scan_single_ingress);

struct ClusterRoleSink(Arc<ScannerEngine>);

#[async_trait]
impl WatchSink<ClusterRole> for ClusterRoleSink {
    async fn applied(&self, obj: ClusterRole) {
        if obj.name_any().starts_with("system:") {
            return;
        }
        self.0.scan_single_cluster_role(&obj).await;
    }

    async fn deleted(&self, obj: ClusterRole) {
        if obj.name_any().starts_with("system:") {
            return;
        }
        self.0.handle_deletion("ClusterRole", "cluster-wide", &obj.name_any()).await;
    }
}

struct CronJobSink(Arc<ScannerEngine>);

#[async_trait]
impl WatchSink<CronJob> for CronJobSink {
    async fn applied(&self, obj: CronJob) {
        self.0.scan_single_cronjob(&obj).await;
    }

    async fn deleted(&self, obj: CronJob) {
        let namespace = obj.namespace().unwrap_or_default();
        if self.0.exclusions.is_namespace_excluded(&namespace).await {
            return;
        }
        self.0.handle_deletion("CronJob", &namespace, &obj.name_any()).await;
    }
}

/// Shared by the watches that only ever need to notice a deletion
/// (Namespace, DaemonSet, StatefulSet — these kinds are too
/// noisy or too narrow in scope to warrant a live rule scan, but a
/// deletion still needs to clear any findings it was carrying).
struct DeletionOnlySink {
    engine: Arc<ScannerEngine>,
    resource_type: &'static str,
    namespaced: bool,
}

#[async_trait]
impl<K> WatchSink<K> for DeletionOnlySink
where
    K: kube::Resource + ResourceExt + Send + Sync + 'static,
{
    async fn applied(&self, _obj: K) {}

    async fn deleted(&self, obj: K) {
        let name = obj.name_any();
        if self.namespaced {
            let namespace = obj.namespace().unwrap_or_default();
            if self.engine.exclusions.is_namespace_excluded(&namespace).await {
                return;
            }
            self.engine.handle_deletion(self.resource_type, &namespace, &name).await;
        } else {
            if self.engine.exclusions.is_namespace_excluded(&name).await {
                return;
            }
            self.engine.handle_deletion(self.resource_type, &name, &name).await;
        }
    }
}

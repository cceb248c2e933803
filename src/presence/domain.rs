// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cached aggregate state of one domain.

use crate::constants::POD_PHASE_FAILED;
use crate::crd::{Cluster, Domain};
use crate::events::EventItem;
use crate::labels::{is_flag_set, ANNOTATION_ROLL_REQUESTED, LABEL_CONFIG_PENDING_RESTART};
use k8s_openapi::api::core::v1::{Event, Pod, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A server the operator intends to run, with the cluster it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerStartupInfo {
    pub server_name: String,
    pub cluster_name: Option<String>,
    pub desired_state: String,
}

#[derive(Default)]
struct PresenceState {
    domain: Option<Arc<Domain>>,
    server_pods: BTreeMap<String, Arc<Pod>>,
    services: BTreeMap<String, Arc<Service>>,
    pdbs: BTreeMap<String, Arc<PodDisruptionBudget>>,
    introspector_job_pod: Option<Arc<Pod>>,
    clusters: BTreeMap<String, Arc<Cluster>>,
    events: BTreeMap<EventItem, Arc<Event>>,
    populated: bool,
    deleting: bool,
    admin_server_name: Option<String>,
    server_startup_info: Option<Vec<ServerStartupInfo>>,
    servers_to_roll: BTreeSet<String>,
    last_processed_generation: Option<i64>,
}

/// Everything the operator knows about one domain in one namespace.
///
/// Shared as `Arc<DomainPresenceInfo>` between the list reconciler, make-right
/// tasks and status timers. Each field is last-write-wins.
pub struct DomainPresenceInfo {
    namespace: String,
    domain_uid: String,
    state: RwLock<PresenceState>,
}

impl fmt::Debug for DomainPresenceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("DomainPresenceInfo")
            .field("namespace", &self.namespace)
            .field("domain_uid", &self.domain_uid)
            .field("has_domain", &state.domain.is_some())
            .field("server_pods", &state.server_pods.keys().collect::<Vec<_>>())
            .field("populated", &state.populated)
            .field("deleting", &state.deleting)
            .finish_non_exhaustive()
    }
}

impl DomainPresenceInfo {
    #[must_use]
    pub fn new(namespace: &str, domain_uid: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            domain_uid: domain_uid.to_string(),
            state: RwLock::new(PresenceState::default()),
        }
    }

    /// Creates an entry already holding its domain resource.
    #[must_use]
    pub fn with_domain(domain: Domain) -> Self {
        let namespace = domain.namespace().unwrap_or_default();
        let info = Self::new(&namespace, &domain.domain_uid());
        info.set_domain(Some(domain));
        info
    }

    fn read(&self) -> RwLockReadGuard<'_, PresenceState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PresenceState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn domain_uid(&self) -> &str {
        &self.domain_uid
    }

    // ------------------------------------------------------------------
    // Domain resource
    // ------------------------------------------------------------------

    /// Last-known domain resource. `None` once the domain is gone.
    #[must_use]
    pub fn domain(&self) -> Option<Arc<Domain>> {
        self.read().domain.clone()
    }

    pub fn set_domain(&self, domain: Option<Domain>) {
        self.write().domain = domain.map(Arc::new);
    }

    /// Name of the domain resource, falling back to the uid.
    #[must_use]
    pub fn domain_name(&self) -> String {
        self.read()
            .domain
            .as_ref()
            .and_then(|d| d.metadata.name.clone())
            .unwrap_or_else(|| self.domain_uid.clone())
    }

    /// Generation of the cached domain resource.
    #[must_use]
    pub fn domain_generation(&self) -> Option<i64> {
        self.read()
            .domain
            .as_ref()
            .and_then(|d| d.metadata.generation)
    }

    #[must_use]
    pub fn last_processed_generation(&self) -> Option<i64> {
        self.read().last_processed_generation
    }

    /// Records that a make-right ran against the cached generation.
    pub fn mark_generation_processed(&self) {
        let mut state = self.write();
        state.last_processed_generation = state
            .domain
            .as_ref()
            .and_then(|d| d.metadata.generation)
            .or(Some(0));
    }

    // ------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------

    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.read().populated
    }

    pub fn set_populated(&self, populated: bool) {
        self.write().populated = populated;
    }

    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.read().deleting
    }

    pub fn set_deleting(&self, deleting: bool) {
        self.write().deleting = deleting;
    }

    /// Returns `true` while any server pod, service, disruption budget or
    /// introspector job pod of the domain is still cached.
    #[must_use]
    pub fn has_owned_resources(&self) -> bool {
        let state = self.read();
        !state.server_pods.is_empty()
            || !state.services.is_empty()
            || !state.pdbs.is_empty()
            || state.introspector_job_pod.is_some()
    }

    // ------------------------------------------------------------------
    // Server pods
    // ------------------------------------------------------------------

    pub fn set_server_pod(&self, server_name: &str, pod: Pod) {
        self.write()
            .server_pods
            .insert(server_name.to_string(), Arc::new(pod));
    }

    /// Forgets a server pod, returning it if it was known.
    pub fn delete_server_pod(&self, server_name: &str) -> Option<Arc<Pod>> {
        self.write().server_pods.remove(server_name)
    }

    #[must_use]
    pub fn server_pod(&self, server_name: &str) -> Option<Arc<Pod>> {
        self.read().server_pods.get(server_name).cloned()
    }

    #[must_use]
    pub fn server_pods(&self) -> Vec<(String, Arc<Pod>)> {
        self.read()
            .server_pods
            .iter()
            .map(|(name, pod)| (name.clone(), Arc::clone(pod)))
            .collect()
    }

    /// Names of servers that currently have a pod.
    #[must_use]
    pub fn server_names(&self) -> BTreeSet<String> {
        self.read().server_pods.keys().cloned().collect()
    }

    /// Servers whose pod carries the pending-restart label.
    #[must_use]
    pub fn pending_restart_servers(&self) -> BTreeSet<String> {
        self.read()
            .server_pods
            .iter()
            .filter(|(_, pod)| is_flag_set(pod.metadata.labels.as_ref(), LABEL_CONFIG_PENDING_RESTART))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Servers whose pod is in the `Failed` phase.
    #[must_use]
    pub fn failed_servers(&self) -> BTreeSet<String> {
        self.read()
            .server_pods
            .iter()
            .filter(|(_, pod)| {
                pod.status
                    .as_ref()
                    .and_then(|s| s.phase.as_deref())
                    .is_some_and(|phase| phase == POD_PHASE_FAILED)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Services, disruption budgets, events
    // ------------------------------------------------------------------

    pub fn set_service(&self, name: &str, service: Service) {
        self.write()
            .services
            .insert(name.to_string(), Arc::new(service));
    }

    pub fn remove_service(&self, name: &str) -> Option<Arc<Service>> {
        self.write().services.remove(name)
    }

    #[must_use]
    pub fn service_names(&self) -> BTreeSet<String> {
        self.read().services.keys().cloned().collect()
    }

    pub fn set_pod_disruption_budget(&self, name: &str, pdb: PodDisruptionBudget) {
        self.write().pdbs.insert(name.to_string(), Arc::new(pdb));
    }

    pub fn remove_pod_disruption_budget(&self, name: &str) -> Option<Arc<PodDisruptionBudget>> {
        self.write().pdbs.remove(name)
    }

    #[must_use]
    pub fn pod_disruption_budget_names(&self) -> BTreeSet<String> {
        self.read().pdbs.keys().cloned().collect()
    }

    /// Remembers an observed Kubernetes event for an item, replacing the previous one.
    pub fn record_event(&self, item: EventItem, event: Event) {
        self.write().events.insert(item, Arc::new(event));
    }

    #[must_use]
    pub fn last_event(&self, item: EventItem) -> Option<Arc<Event>> {
        self.read().events.get(&item).cloned()
    }

    // ------------------------------------------------------------------
    // Introspector job
    // ------------------------------------------------------------------

    pub fn set_introspector_job_pod(&self, pod: Option<Pod>) {
        self.write().introspector_job_pod = pod.map(Arc::new);
    }

    #[must_use]
    pub fn introspector_job_pod(&self) -> Option<Arc<Pod>> {
        self.read().introspector_job_pod.clone()
    }

    // ------------------------------------------------------------------
    // Referenced clusters
    // ------------------------------------------------------------------

    /// Replaces the resolved set of live cluster resources this domain references.
    pub fn set_clusters(&self, clusters: Vec<Arc<Cluster>>) {
        self.write().clusters = clusters
            .into_iter()
            .map(|c| (c.name_any(), c))
            .collect();
    }

    /// Swaps in a newer copy of an already resolved cluster. Unresolved
    /// clusters are ignored.
    pub fn refresh_cluster(&self, cluster: Arc<Cluster>) {
        if let Some(slot) = self.write().clusters.get_mut(&cluster.name_any()) {
            *slot = cluster;
        }
    }

    /// Live cluster resources this domain references, keyed by resource name.
    #[must_use]
    pub fn clusters(&self) -> BTreeMap<String, Arc<Cluster>> {
        self.read().clusters.clone()
    }

    /// Returns `true` if the cached domain references the named cluster resource.
    #[must_use]
    pub fn references_cluster(&self, cluster_resource_name: &str) -> bool {
        self.read()
            .domain
            .as_ref()
            .is_some_and(|d| d.references_cluster(cluster_resource_name))
    }

    // ------------------------------------------------------------------
    // Derived server sets
    // ------------------------------------------------------------------

    /// Stores the servers the latest make-right decided to run.
    pub fn set_server_startup_info(
        &self,
        admin_server_name: Option<String>,
        startup: Vec<ServerStartupInfo>,
    ) {
        let mut state = self.write();
        state.admin_server_name = admin_server_name;
        state.server_startup_info = Some(startup);
    }

    /// Forgets the startup decision, e.g. when the topology is unknown.
    pub fn clear_server_startup_info(&self) {
        let mut state = self.write();
        state.admin_server_name = None;
        state.server_startup_info = None;
    }

    #[must_use]
    pub fn server_startup_info(&self) -> Option<Vec<ServerStartupInfo>> {
        self.read().server_startup_info.clone()
    }

    #[must_use]
    pub fn admin_server_name(&self) -> Option<String> {
        self.read().admin_server_name.clone()
    }

    /// The administration server plus every server in the startup decision.
    #[must_use]
    pub fn expected_running_servers(&self) -> BTreeSet<String> {
        let state = self.read();
        state
            .admin_server_name
            .iter()
            .cloned()
            .chain(
                state
                    .server_startup_info
                    .iter()
                    .flatten()
                    .map(|s| s.server_name.clone()),
            )
            .collect()
    }

    pub fn mark_for_roll(&self, server_name: &str) {
        self.write().servers_to_roll.insert(server_name.to_string());
    }

    pub fn clear_roll(&self, server_name: &str) {
        self.write().servers_to_roll.remove(server_name);
    }

    /// Servers waiting for a rolling restart: explicitly marked ones plus pods
    /// annotated with a roll request.
    #[must_use]
    pub fn servers_to_roll(&self) -> BTreeSet<String> {
        let state = self.read();
        let annotated = state.server_pods.iter().filter(|(_, pod)| {
            pod.metadata
                .annotations
                .as_ref()
                .is_some_and(|a| a.contains_key(ANNOTATION_ROLL_REQUESTED))
        });
        state
            .servers_to_roll
            .iter()
            .cloned()
            .chain(annotated.map(|(name, _)| name.clone()))
            .collect()
    }
}

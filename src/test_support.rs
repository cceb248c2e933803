// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Fixtures and in-memory fakes shared by unit tests.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc, dead_code)]

use crate::api_errors::{StepError, StoreError};
use crate::config::OperatorConfig;
use crate::context::Context;
use crate::crd::{Cluster, ClusterReference, ClusterSpec, Domain, DomainSpec, DomainStatus};
use crate::events::{EventData, EventItem, EventSink};
use crate::labels::{LABEL_DOMAIN_UID, LABEL_JOB_CONTROLLER_UID, LABEL_JOB_NAME, LABEL_SERVER_NAME};
use crate::presence::DomainPresenceInfo;
use crate::reconcilers::make_right::{
    MakeRightClusterOperation, MakeRightDomainOperation, MakeRightExecutor, ShouldProceed,
};
use crate::store::ResourceStore;
use crate::topology::{ReconcileInputs, TopologyProvider};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, ObjectReference, Pod, PodCondition, PodStatus, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Pod phases used by fixtures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl PodPhase {
    fn as_str(self) -> &'static str {
        match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
        }
    }
}

// ============================================================================
// Resource fixtures
// ============================================================================

/// A domain named `name` whose uid equals its name, with an empty status.
pub fn domain_resource(namespace: &str, name: &str, generation: i64) -> Domain {
    let mut domain = Domain::new(name, DomainSpec::default());
    domain.metadata.namespace = Some(namespace.to_string());
    domain.metadata.generation = Some(generation);
    domain.metadata.uid = Some(format!("{name}-uid"));
    domain.metadata.resource_version = Some("1".to_string());
    domain.status = Some(DomainStatus::default());
    domain
}

/// A domain referencing the given `Cluster` resources.
pub fn domain_with_clusters(namespace: &str, name: &str, generation: i64, clusters: &[&str]) -> Domain {
    let mut domain = domain_resource(namespace, name, generation);
    domain.spec.clusters = clusters
        .iter()
        .map(|c| ClusterReference { name: (*c).to_string() })
        .collect();
    domain
}

/// A cluster resource at generation 1.
pub fn cluster_resource(namespace: &str, name: &str, cluster_name: &str, replicas: i32) -> Cluster {
    let mut cluster = Cluster::new(
        name,
        ClusterSpec {
            cluster_name: cluster_name.to_string(),
            replicas: Some(replicas),
            ..ClusterSpec::default()
        },
    );
    cluster.metadata.namespace = Some(namespace.to_string());
    cluster.metadata.generation = Some(1);
    cluster.metadata.resource_version = Some("1".to_string());
    cluster
}

fn pod_status(phase: PodPhase, ready: bool) -> PodStatus {
    PodStatus {
        phase: Some(phase.as_str().to_string()),
        conditions: Some(vec![PodCondition {
            type_: "Ready".to_string(),
            status: if ready { "True" } else { "False" }.to_string(),
            ..PodCondition::default()
        }]),
        ..PodStatus::default()
    }
}

/// A server pod labelled with domain uid and server name.
pub fn server_pod(namespace: &str, domain_uid: &str, server_name: &str, phase: PodPhase, ready: bool) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(format!("{domain_uid}-{server_name}")),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("{domain_uid}-{server_name}-uid")),
            resource_version: Some("1".to_string()),
            labels: Some(BTreeMap::from([
                (LABEL_DOMAIN_UID.to_string(), domain_uid.to_string()),
                (LABEL_SERVER_NAME.to_string(), server_name.to_string()),
            ])),
            ..ObjectMeta::default()
        },
        status: Some(pod_status(phase, ready)),
        ..Pod::default()
    }
}

/// An introspector job pod named `name`, owned by job `job_uid`.
pub fn job_pod(namespace: &str, domain_uid: &str, name: &str, job_uid: &str, phase: PodPhase) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("{name}-uid")),
            resource_version: Some("1".to_string()),
            labels: Some(BTreeMap::from([
                (LABEL_DOMAIN_UID.to_string(), domain_uid.to_string()),
                (LABEL_JOB_NAME.to_string(), format!("{domain_uid}-introspector")),
                (LABEL_JOB_CONTROLLER_UID.to_string(), job_uid.to_string()),
            ])),
            ..ObjectMeta::default()
        },
        status: Some(pod_status(phase, false)),
        ..Pod::default()
    }
}

/// A core event about a `Domain`.
pub fn domain_event(namespace: &str, domain_name: &str, item: EventItem) -> Event {
    Event {
        metadata: ObjectMeta {
            name: Some(format!("{domain_name}.{}", item.reason().to_lowercase())),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        involved_object: ObjectReference {
            kind: Some("Domain".to_string()),
            name: Some(domain_name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectReference::default()
        },
        reason: Some(item.reason().to_string()),
        ..Event::default()
    }
}

fn bump_resource_version(meta: &mut ObjectMeta) {
    let next = meta
        .resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    meta.resource_version = Some(next.to_string());
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
struct StoreState {
    pods: BTreeMap<(String, String), Pod>,
    services: BTreeMap<(String, String), Service>,
    events: Vec<Event>,
    domains: BTreeMap<(String, String), Domain>,
    clusters: BTreeMap<(String, String), Cluster>,
    domain_replaces: usize,
    cluster_replaces: usize,
    get_domain_calls: usize,
    conflicts_remaining: usize,
    replace_error: Option<StoreError>,
}

/// A [`ResourceStore`] backed by maps.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

fn key<K: ResourceExt>(resource: &K) -> (String, String) {
    (resource.namespace().unwrap_or_default(), resource.name_any())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_domain(&self, domain: Domain) {
        self.state.lock().unwrap().domains.insert(key(&domain), domain);
    }

    pub fn remove_domain(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .domains
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn put_cluster(&self, cluster: Cluster) {
        self.state.lock().unwrap().clusters.insert(key(&cluster), cluster);
    }

    pub fn put_pod(&self, pod: Pod) {
        self.state.lock().unwrap().pods.insert(key(&pod), pod);
    }

    pub fn remove_pod(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .pods
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn put_service(&self, service: Service) {
        self.state.lock().unwrap().services.insert(key(&service), service);
    }

    pub fn put_event(&self, event: Event) {
        self.state.lock().unwrap().events.push(event);
    }

    /// The next `count` domain status replaces fail with a conflict.
    pub fn inject_conflicts(&self, count: usize) {
        self.state.lock().unwrap().conflicts_remaining = count;
    }

    /// Every domain status replace fails with `error`.
    pub fn fail_replaces_with(&self, error: StoreError) {
        self.state.lock().unwrap().replace_error = Some(error);
    }

    pub fn domain_replaces(&self) -> usize {
        self.state.lock().unwrap().domain_replaces
    }

    pub fn cluster_replaces(&self) -> usize {
        self.state.lock().unwrap().cluster_replaces
    }

    pub fn get_domain_calls(&self) -> usize {
        self.state.lock().unwrap().get_domain_calls
    }

    pub fn stored_domain(&self, namespace: &str, name: &str) -> Option<Domain> {
        self.state
            .lock()
            .unwrap()
            .domains
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn stored_cluster(&self, namespace: &str, name: &str) -> Option<Cluster> {
        self.state
            .lock()
            .unwrap()
            .clusters
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .pods
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, pod)| pod.clone())
            .collect())
    }

    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .services
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, service)| service.clone())
            .collect())
    }

    async fn list_pod_disruption_budgets(
        &self,
        _namespace: &str,
    ) -> Result<Vec<PodDisruptionBudget>, StoreError> {
        Ok(Vec::new())
    }

    async fn list_domains(&self, namespace: &str) -> Result<Vec<Domain>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .domains
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, d)| d.clone())
            .collect())
    }

    async fn list_clusters(&self, namespace: &str) -> Result<Vec<Cluster>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .clusters
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn list_events(&self, namespace: &str) -> Result<Vec<Event>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .events
            .iter()
            .filter(|e| e.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn get_domain(&self, namespace: &str, name: &str) -> Result<Option<Domain>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.get_domain_calls += 1;
        Ok(state
            .domains
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>, StoreError> {
        Ok(self.stored_cluster(namespace, name))
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .pods
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn replace_domain_status(&self, domain: &Domain) -> Result<Domain, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.domain_replaces += 1;
        let operation = format!("replace status of domain {}", domain.name_any());
        if let Some(error) = state.replace_error.clone() {
            return Err(error);
        }
        if state.conflicts_remaining > 0 {
            state.conflicts_remaining -= 1;
            return Err(StoreError::conflict(&operation));
        }

        let mut stored = state
            .domains
            .get(&key(domain))
            .cloned()
            .unwrap_or_else(|| domain.clone());
        stored.status.clone_from(&domain.status);
        bump_resource_version(&mut stored.metadata);
        state.domains.insert(key(&stored), stored.clone());
        Ok(stored)
    }

    async fn replace_cluster_status(&self, cluster: &Cluster) -> Result<Cluster, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.cluster_replaces += 1;
        if let Some(current) = state.clusters.get(&key(cluster)) {
            if current.metadata.resource_version != cluster.metadata.resource_version {
                let operation = format!("replace status of cluster {}", cluster.name_any());
                return Err(StoreError::conflict(&operation));
            }
        }
        let mut stored = cluster.clone();
        bump_resource_version(&mut stored.metadata);
        state.clusters.insert(key(&stored), stored.clone());
        Ok(stored)
    }
}

// ============================================================================
// Event sink and topology fakes
// ============================================================================

/// An [`EventSink`] that remembers every event.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<EventData>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventData> {
        self.events.lock().unwrap().clone()
    }

    pub fn items(&self) -> Vec<EventItem> {
        self.events().into_iter().map(|e| e.item).collect()
    }

    pub fn count(&self, item: EventItem) -> usize {
        self.items().into_iter().filter(|i| *i == item).count()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, event: &EventData) -> Result<(), StoreError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// A [`TopologyProvider`] returning whatever inputs were last set.
#[derive(Default)]
pub struct FixedTopologyProvider {
    inputs: Mutex<ReconcileInputs>,
}

impl FixedTopologyProvider {
    pub fn new(inputs: ReconcileInputs) -> Self {
        Self {
            inputs: Mutex::new(inputs),
        }
    }

    pub fn set(&self, inputs: ReconcileInputs) {
        *self.inputs.lock().unwrap() = inputs;
    }
}

#[async_trait]
impl TopologyProvider for FixedTopologyProvider {
    async fn inputs(&self, _info: &DomainPresenceInfo) -> Result<ReconcileInputs, StepError> {
        Ok(self.inputs.lock().unwrap().clone())
    }
}

// ============================================================================
// Executor fake
// ============================================================================

/// A domain operation as seen by [`RecordingExecutor`].
#[derive(Clone, Debug)]
pub struct RecordedDomainOp {
    pub domain_uid: String,
    pub event: Option<EventItem>,
    pub explicit_recheck: bool,
    pub interrupt: bool,
    pub deletion: bool,
    /// `should_proceed` evaluated against the operation's info on submission.
    pub proceed: bool,
}

/// A cluster operation as seen by [`RecordingExecutor`].
#[derive(Clone, Debug)]
pub struct RecordedClusterOp {
    pub cluster: String,
    pub domain_uid: Option<String>,
    pub event: Option<EventItem>,
    pub deletion: bool,
}

#[derive(Default)]
struct ExecutorState {
    domain_ops: Vec<RecordedDomainOp>,
    cluster_ops: Vec<RecordedClusterOp>,
    job_pod_updates: Vec<(String, String)>,
    scheduled: Vec<String>,
    ended: Vec<String>,
    in_flight: Vec<String>,
}

/// A [`MakeRightExecutor`] that records what it is asked to do.
#[derive(Default)]
pub struct RecordingExecutor {
    state: Mutex<ExecutorState>,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_in_flight(&self, domain_uid: &str) {
        self.state.lock().unwrap().in_flight.push(domain_uid.to_string());
    }

    pub fn domain_ops(&self) -> Vec<RecordedDomainOp> {
        self.state.lock().unwrap().domain_ops.clone()
    }

    pub fn domain_ops_for(&self, domain_uid: &str) -> Vec<RecordedDomainOp> {
        self.domain_ops()
            .into_iter()
            .filter(|op| op.domain_uid == domain_uid)
            .collect()
    }

    pub fn cluster_ops(&self) -> Vec<RecordedClusterOp> {
        self.state.lock().unwrap().cluster_ops.clone()
    }

    /// `(domain uid, job pod name)` of every job pod status update.
    pub fn job_pod_updates(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().job_pod_updates.clone()
    }

    pub fn scheduled(&self) -> Vec<String> {
        self.state.lock().unwrap().scheduled.clone()
    }

    pub fn ended(&self) -> Vec<String> {
        self.state.lock().unwrap().ended.clone()
    }
}

impl MakeRightExecutor for RecordingExecutor {
    fn run_make_right_domain(&self, op: MakeRightDomainOperation, should_proceed: ShouldProceed) {
        let recorded = RecordedDomainOp {
            domain_uid: op.info.domain_uid().to_string(),
            event: op.event.as_ref().map(|e| e.item),
            explicit_recheck: op.explicit_recheck,
            interrupt: op.interrupt,
            deletion: op.deletion,
            proceed: should_proceed(&op.info),
        };
        self.state.lock().unwrap().domain_ops.push(recorded);
    }

    fn run_make_right_cluster(&self, op: MakeRightClusterOperation) {
        let recorded = RecordedClusterOp {
            cluster: op.cluster.resource_name().to_string(),
            domain_uid: op.domain.as_ref().map(|d| d.domain_uid().to_string()),
            event: op.event.as_ref().map(|e| e.item),
            deletion: op.deletion,
        };
        self.state.lock().unwrap().cluster_ops.push(recorded);
    }

    fn update_domain_status_from_job_pod(&self, info: Arc<DomainPresenceInfo>, job_pod: Pod) {
        self.state
            .lock()
            .unwrap()
            .job_pod_updates
            .push((info.domain_uid().to_string(), job_pod.name_any()));
    }

    fn schedule_domain_status_updates(&self, info: Arc<DomainPresenceInfo>) {
        self.state.lock().unwrap().scheduled.push(info.domain_uid().to_string());
    }

    fn end_scheduled_domain_status_updates(&self, info: &DomainPresenceInfo) {
        self.state.lock().unwrap().ended.push(info.domain_uid().to_string());
    }

    fn register_domain_presence_info(&self, _info: Arc<DomainPresenceInfo>) {}

    fn unregister_domain_presence_info(&self, _info: &DomainPresenceInfo) {}

    fn is_domain_in_flight(&self, _namespace: &str, domain_uid: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .in_flight
            .iter()
            .any(|uid| uid == domain_uid)
    }
}

// ============================================================================
// Context
// ============================================================================

/// Configuration with short wait-for-ready pacing.
pub fn test_config() -> OperatorConfig {
    OperatorConfig {
        namespaces: vec!["apps".to_string()],
        failure_retry_max_count: 3,
        ready_recheck_count: 3,
        ready_recheck_interval_secs: 1,
        status_update_interval_secs: 10,
        ..OperatorConfig::default()
    }
}

/// Collaborators of a test [`Context`], kept for assertions.
pub struct Harness {
    pub ctx: Arc<Context>,
    pub store: Arc<InMemoryStore>,
    pub events: Arc<RecordingEventSink>,
    pub topology: Arc<FixedTopologyProvider>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: OperatorConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let events = Arc::new(RecordingEventSink::new());
        let topology = Arc::new(FixedTopologyProvider::default());
        let ctx = Arc::new(Context::new(
            config,
            store.clone(),
            events.clone(),
            topology.clone(),
        ));
        Self {
            ctx,
            store,
            events,
            topology,
        }
    }
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Full-list reconciliation of one namespace.
//!
//! A list pass feeds complete lists of pods, services, disruption budgets,
//! domains, clusters and events into a [`DomainResourcesValidation`], which
//! updates the presence cache as each list arrives. [`DomainResourcesValidation::complete`]
//! then derives the make-right operations the lists imply:
//!
//! 1. Domains that disappeared are marked deleting and made right for deletion
//! 2. Live domains get their referenced clusters resolved
//! 3. Deleted, new and changed clusters are made right once per referencing domain
//! 4. Live domains are made right, tagged created, changed or untagged

use crate::constants::KIND_DOMAIN;
use crate::context::Context;
use crate::crd::{Cluster, Domain};
use crate::events::{EventData, EventItem};
use crate::labels::{LABEL_CLUSTER_NAME, LABEL_DOMAIN_UID, LABEL_JOB_NAME, LABEL_SERVER_NAME};
use crate::metrics;
use crate::presence::{ClusterPresenceInfo, DomainPresenceInfo};
use crate::reconcilers::make_right::{
    should_continue, MakeRightClusterOperation, MakeRightDomainOperation, MakeRightExecutor,
};
use k8s_openapi::api::core::v1::{Event, Pod, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a completed list pass decided.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    pub new_domains: usize,
    pub modified_domains: usize,
    pub deleted_domains: usize,
    pub new_clusters: usize,
    pub modified_clusters: usize,
    pub deleted_clusters: usize,
}

/// Accumulates the lists of one namespace and reconciles them with the cache.
pub struct DomainResourcesValidation {
    namespace: String,
    ctx: Arc<Context>,
    executor: Arc<dyn MakeRightExecutor>,
    domain_list_seen: bool,
    new_domains: BTreeSet<String>,
    modified_domains: BTreeSet<String>,
    cluster_list_seen: bool,
    live_clusters: BTreeMap<String, Arc<Cluster>>,
    new_clusters: BTreeSet<String>,
    modified_clusters: BTreeSet<String>,
    events: Vec<Event>,
}

impl DomainResourcesValidation {
    #[must_use]
    pub fn new(namespace: &str, ctx: Arc<Context>, executor: Arc<dyn MakeRightExecutor>) -> Self {
        Self {
            namespace: namespace.to_string(),
            ctx,
            executor,
            domain_list_seen: false,
            new_domains: BTreeSet::new(),
            modified_domains: BTreeSet::new(),
            cluster_list_seen: false,
            live_clusters: BTreeMap::new(),
            new_clusters: BTreeSet::new(),
            modified_clusters: BTreeSet::new(),
            events: Vec::new(),
        }
    }

    /// Attaches server and introspector job pods to their domains.
    ///
    /// Cached server pods missing from `pods` are forgotten first. Pods
    /// without a domain uid label are ignored.
    pub fn add_pod_list(&mut self, pods: Vec<Pod>) {
        let mut server_pods: BTreeMap<String, BTreeMap<String, Pod>> = BTreeMap::new();
        let mut job_pods: BTreeMap<String, Pod> = BTreeMap::new();

        for pod in pods {
            let labels = pod.labels();
            let Some(domain_uid) = labels.get(LABEL_DOMAIN_UID).cloned() else {
                continue;
            };
            if let Some(server_name) = labels.get(LABEL_SERVER_NAME).cloned() {
                server_pods
                    .entry(domain_uid)
                    .or_default()
                    .insert(server_name, pod);
            } else if labels.contains_key(LABEL_JOB_NAME) {
                job_pods.insert(domain_uid, pod);
            }
        }

        for info in self.ctx.presence.domains(&self.namespace) {
            let live = server_pods.get(info.domain_uid());
            for server_name in info.server_names() {
                if !live.is_some_and(|pods| pods.contains_key(&server_name)) {
                    debug!(
                        namespace = %self.namespace,
                        domain_uid = %info.domain_uid(),
                        server = %server_name,
                        "Server pod no longer listed"
                    );
                    info.delete_server_pod(&server_name);
                }
            }
            if !job_pods.contains_key(info.domain_uid()) && info.introspector_job_pod().is_some() {
                info.set_introspector_job_pod(None);
            }
        }

        for (domain_uid, pods) in server_pods {
            let info = self.ctx.presence.domain_or_insert(&self.namespace, &domain_uid);
            for (server_name, pod) in pods {
                info.set_server_pod(&server_name, pod);
            }
        }

        for (domain_uid, pod) in job_pods {
            let info = self.ctx.presence.domain_or_insert(&self.namespace, &domain_uid);
            info.set_introspector_job_pod(Some(pod.clone()));
            self.executor.update_domain_status_from_job_pod(info, pod);
        }
    }

    /// Attaches services labelled with a domain uid and a server or cluster name.
    pub fn add_service_list(&mut self, services: Vec<Service>) {
        let mut live: BTreeMap<String, BTreeMap<String, Service>> = BTreeMap::new();
        for service in services {
            let labels = service.labels();
            let Some(domain_uid) = labels.get(LABEL_DOMAIN_UID).cloned() else {
                continue;
            };
            if !labels.contains_key(LABEL_SERVER_NAME) && !labels.contains_key(LABEL_CLUSTER_NAME) {
                continue;
            }
            live.entry(domain_uid)
                .or_default()
                .insert(service.name_any(), service);
        }

        for info in self.ctx.presence.domains(&self.namespace) {
            let listed = live.get(info.domain_uid());
            for name in info.service_names() {
                if !listed.is_some_and(|services| services.contains_key(&name)) {
                    info.remove_service(&name);
                }
            }
        }
        for (domain_uid, services) in live {
            let info = self.ctx.presence.domain_or_insert(&self.namespace, &domain_uid);
            for (name, service) in services {
                info.set_service(&name, service);
            }
        }
    }

    /// Attaches disruption budgets labelled with a domain uid and a cluster name.
    pub fn add_pdb_list(&mut self, pdbs: Vec<PodDisruptionBudget>) {
        let mut live: BTreeMap<String, BTreeMap<String, PodDisruptionBudget>> = BTreeMap::new();
        for pdb in pdbs {
            let labels = pdb.labels();
            let Some(domain_uid) = labels.get(LABEL_DOMAIN_UID).cloned() else {
                continue;
            };
            if !labels.contains_key(LABEL_CLUSTER_NAME) {
                continue;
            }
            live.entry(domain_uid).or_default().insert(pdb.name_any(), pdb);
        }

        for info in self.ctx.presence.domains(&self.namespace) {
            let listed = live.get(info.domain_uid());
            for name in info.pod_disruption_budget_names() {
                if !listed.is_some_and(|pdbs| pdbs.contains_key(&name)) {
                    info.remove_pod_disruption_budget(&name);
                }
            }
        }
        for (domain_uid, pdbs) in live {
            let info = self.ctx.presence.domain_or_insert(&self.namespace, &domain_uid);
            for (name, pdb) in pdbs {
                info.set_pod_disruption_budget(&name, pdb);
            }
        }
    }

    /// Keeps events for attachment once the domains are known.
    pub fn add_event_list(&mut self, events: Vec<Event>) {
        self.events.extend(events);
    }

    /// Caches the listed domains and classifies them as new or modified.
    ///
    /// Cached domains missing from the list lose their domain unless a
    /// make-right is running for them.
    pub fn add_domain_list(&mut self, domains: Vec<Domain>) {
        self.domain_list_seen = true;
        let listed: BTreeSet<String> = domains.iter().map(Domain::domain_uid).collect();

        for info in self.ctx.presence.domains(&self.namespace) {
            if listed.contains(info.domain_uid())
                || info.domain().is_none()
                || self
                    .executor
                    .is_domain_in_flight(&self.namespace, info.domain_uid())
            {
                continue;
            }
            debug!(
                namespace = %self.namespace,
                domain_uid = %info.domain_uid(),
                "Domain no longer listed"
            );
            info.set_domain(None);
        }

        for domain in domains {
            let domain_uid = domain.domain_uid();
            let info = self.ctx.presence.domain_or_insert(&self.namespace, &domain_uid);
            if info.is_deleting() && info.domain().is_none() {
                // Recreated under the uid of a domain still being released.
                info.set_deleting(false);
            }
            match info.domain() {
                None => {
                    self.new_domains.insert(domain_uid);
                }
                Some(cached) if cached.metadata.generation != domain.metadata.generation => {
                    self.modified_domains.insert(domain_uid);
                }
                Some(_) => {}
            }
            info.set_domain(Some(domain));
        }
    }

    /// Records the live clusters and classifies them as new or modified.
    pub fn add_cluster_list(&mut self, clusters: Vec<Cluster>) {
        self.cluster_list_seen = true;
        for cluster in clusters {
            let name = cluster.name_any();
            match self.ctx.presence.cluster(&self.namespace, &name) {
                None => {
                    self.new_clusters.insert(name.clone());
                }
                Some(existing) => {
                    if existing.generation() != cluster.metadata.generation {
                        self.modified_clusters.insert(name.clone());
                    }
                    existing.set_cluster(cluster.clone());
                }
            }
            self.live_clusters.insert(name, Arc::new(cluster));
        }
    }

    /// Issues the make-right operations implied by the lists.
    pub fn complete(self) -> ValidationSummary {
        let mut summary = ValidationSummary {
            new_domains: self.new_domains.len(),
            modified_domains: self.modified_domains.len(),
            new_clusters: self.new_clusters.len(),
            modified_clusters: self.modified_clusters.len(),
            ..ValidationSummary::default()
        };

        if self.domain_list_seen {
            self.release_deleted_domains();
            summary.deleted_domains = self.remove_stranded_domains();
        }
        let live = self.live_domains();
        self.resolve_clusters(&live);
        self.attach_events();
        if self.cluster_list_seen {
            summary.deleted_clusters = self.make_right_clusters(&live);
        }
        if self.domain_list_seen {
            self.make_right_domains(&live);
        }

        info!(
            namespace = %self.namespace,
            new_domains = summary.new_domains,
            modified_domains = summary.modified_domains,
            deleted_domains = summary.deleted_domains,
            new_clusters = summary.new_clusters,
            modified_clusters = summary.modified_clusters,
            deleted_clusters = summary.deleted_clusters,
            "Completed list pass"
        );
        metrics::record_list_pass(&self.namespace);
        summary
    }

    fn live_domains(&self) -> Vec<Arc<DomainPresenceInfo>> {
        self.ctx
            .presence
            .domains(&self.namespace)
            .into_iter()
            .filter(|info| info.domain().is_some() && !info.is_deleting())
            .collect()
    }

    /// Drops deleted domains whose pods, services and disruption budgets are
    /// no longer listed. Until then they stay cached as deleting, so their
    /// remaining resources do not bring them back as new stranded domains.
    fn release_deleted_domains(&self) {
        for info in self.ctx.presence.domains(&self.namespace) {
            if !info.is_deleting()
                || info.domain().is_some()
                || info.has_owned_resources()
                || self
                    .executor
                    .is_domain_in_flight(&self.namespace, info.domain_uid())
            {
                continue;
            }
            debug!(
                namespace = %self.namespace,
                domain_uid = %info.domain_uid(),
                "Released deleted domain"
            );
            self.ctx
                .presence
                .unregister_domain(&self.namespace, info.domain_uid());
        }
    }

    fn remove_stranded_domains(&self) -> usize {
        let mut count = 0;
        for info in self.ctx.presence.domains(&self.namespace) {
            if info.domain().is_some()
                || info.is_deleting()
                || self
                    .executor
                    .is_domain_in_flight(&self.namespace, info.domain_uid())
            {
                continue;
            }
            info!(
                namespace = %self.namespace,
                domain_uid = %info.domain_uid(),
                "Domain deleted"
            );
            info.set_deleting(true);
            info.set_populated(true);
            let op = MakeRightDomainOperation::new(info)
                .with_event(EventData::new(EventItem::DomainDeleted))
                .interrupt()
                .for_deletion();
            let proceed = should_continue(&op);
            self.executor.run_make_right_domain(op, proceed);
            count += 1;
        }
        count
    }

    fn resolve_clusters(&self, live: &[Arc<DomainPresenceInfo>]) {
        for info in live {
            let Some(domain) = info.domain() else {
                continue;
            };
            let clusters = domain
                .spec
                .clusters
                .iter()
                .filter_map(|reference| self.lookup_cluster(&reference.name))
                .collect();
            info.set_clusters(clusters);
        }
    }

    fn lookup_cluster(&self, name: &str) -> Option<Arc<Cluster>> {
        if self.cluster_list_seen {
            self.live_clusters.get(name).cloned()
        } else {
            self.ctx
                .presence
                .cluster(&self.namespace, name)
                .map(|info| info.cluster())
        }
    }

    /// Domains whose spec references the cluster resource `name`.
    fn referencing<'a>(
        live: &'a [Arc<DomainPresenceInfo>],
        name: &'a str,
    ) -> impl Iterator<Item = &'a Arc<DomainPresenceInfo>> + 'a {
        live.iter().filter(move |info| info.references_cluster(name))
    }

    fn run_cluster_ops(
        &self,
        live: &[Arc<DomainPresenceInfo>],
        cluster: &Arc<ClusterPresenceInfo>,
        item: Option<EventItem>,
        deletion: bool,
    ) {
        let build = |domain: Option<Arc<DomainPresenceInfo>>| {
            let mut op = MakeRightClusterOperation::new(Arc::clone(cluster), domain);
            if let Some(item) = item {
                op = op.with_event(EventData::new(item));
            }
            if deletion {
                op = op.for_deletion();
            }
            op
        };

        let mut any = false;
        for info in Self::referencing(live, cluster.resource_name()) {
            any = true;
            self.executor
                .run_make_right_cluster(build(Some(Arc::clone(info))));
        }
        if !any {
            self.executor.run_make_right_cluster(build(None));
        }
    }

    fn make_right_clusters(&self, live: &[Arc<DomainPresenceInfo>]) -> usize {
        let mut deleted = 0;
        for cached in self.ctx.presence.clusters(&self.namespace) {
            if self.live_clusters.contains_key(cached.resource_name()) {
                continue;
            }
            info!(
                namespace = %self.namespace,
                cluster = %cached.resource_name(),
                "Cluster deleted"
            );
            self.run_cluster_ops(live, &cached, Some(EventItem::ClusterDeleted), true);
            deleted += 1;
        }

        for (name, cluster) in &self.live_clusters {
            let (presence, item) = if self.new_clusters.contains(name) {
                (
                    Arc::new(ClusterPresenceInfo::new((**cluster).clone())),
                    Some(EventItem::ClusterCreated),
                )
            } else {
                let Some(existing) = self.ctx.presence.cluster(&self.namespace, name) else {
                    continue;
                };
                let item = self
                    .modified_clusters
                    .contains(name)
                    .then_some(EventItem::ClusterChanged);
                (existing, item)
            };
            self.run_cluster_ops(live, &presence, item, false);
        }
        deleted
    }

    fn make_right_domains(&self, live: &[Arc<DomainPresenceInfo>]) {
        for info in live {
            info.set_populated(true);
            let Some(domain) = info.domain() else {
                continue;
            };
            let item = if self.new_domains.contains(info.domain_uid()) || domain.status.is_none() {
                Some(EventItem::DomainCreated)
            } else if self.modified_domains.contains(info.domain_uid()) {
                Some(EventItem::DomainChanged)
            } else {
                None
            };

            let mut op = MakeRightDomainOperation::new(Arc::clone(info));
            if let Some(item) = item {
                op = op
                    .with_event(EventData::new(item))
                    .interrupt()
                    .with_explicit_recheck();
            }
            let proceed = should_continue(&op);
            self.executor.run_make_right_domain(op, proceed);
        }
    }

    /// Remembers the latest listed event per item on the domain it involves.
    fn attach_events(&self) {
        if self.events.is_empty() {
            return;
        }
        let by_name: BTreeMap<String, Arc<DomainPresenceInfo>> = self
            .ctx
            .presence
            .domains(&self.namespace)
            .into_iter()
            .filter(|info| info.domain().is_some())
            .map(|info| (info.domain_name(), info))
            .collect();

        for event in &self.events {
            let involved = &event.involved_object;
            if involved.kind.as_deref() != Some(KIND_DOMAIN) {
                continue;
            }
            let Some(item) = event.reason.as_deref().and_then(EventItem::from_reason) else {
                continue;
            };
            if let Some(info) = involved.name.as_ref().and_then(|name| by_name.get(name)) {
                info.record_event(item, event.clone());
            }
        }
    }
}

/// Lists every resource of `namespace` and reconciles it with the cache.
///
/// A failed list is logged and skipped; the remaining lists still apply.
pub async fn run_list_pass(
    ctx: &Arc<Context>,
    executor: &Arc<dyn MakeRightExecutor>,
    namespace: &str,
) -> ValidationSummary {
    let mut validation = DomainResourcesValidation::new(namespace, Arc::clone(ctx), Arc::clone(executor));

    match ctx.store.list_pods(namespace).await {
        Ok(pods) => validation.add_pod_list(pods),
        Err(e) => list_failed(namespace, "pods", &e),
    }
    match ctx.store.list_services(namespace).await {
        Ok(services) => validation.add_service_list(services),
        Err(e) => list_failed(namespace, "services", &e),
    }
    match ctx.store.list_pod_disruption_budgets(namespace).await {
        Ok(pdbs) => validation.add_pdb_list(pdbs),
        Err(e) => list_failed(namespace, "poddisruptionbudgets", &e),
    }
    match ctx.store.list_events(namespace).await {
        Ok(events) => validation.add_event_list(events),
        Err(e) => list_failed(namespace, "events", &e),
    }
    match ctx.store.list_clusters(namespace).await {
        Ok(clusters) => validation.add_cluster_list(clusters),
        Err(e) => list_failed(namespace, "clusters", &e),
    }
    match ctx.store.list_domains(namespace).await {
        Ok(domains) => validation.add_domain_list(domains),
        Err(e) => list_failed(namespace, "domains", &e),
    }

    validation.complete()
}

fn list_failed(namespace: &str, kind: &str, error: &crate::api_errors::StoreError) {
    warn!(namespace = %namespace, kind = kind, error = %error, "List failed; skipping it this pass");
    metrics::record_error("list_pass", kind);
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod validation_tests;

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Domain topology and per-pass reconcile inputs.
//!
//! A [`TopologyProvider`] turns a [`DomainPresenceInfo`] into the inputs the
//! status state machine needs: the configured topology, the observed state of
//! each server and its health. [`PodTopologyProvider`] reads the topology the
//! introspector reported on its job pod, falling back to the domain and cluster
//! specs, and derives server state from the cached server pods.

use crate::api_errors::StepError;
use crate::constants::{
    DEFAULT_ADMIN_SERVER_NAME, DEFAULT_REPLICAS, DEFAULT_SERVER_NAME_PREFIX_SUFFIX, HEALTH_NOT_READY,
    HEALTH_OK, POD_PHASE_FAILED, POD_PHASE_PENDING, POD_PHASE_RUNNING, POD_PHASE_SUCCEEDED,
    SERVER_STATE_FAILED, SERVER_STATE_RUNNING, SERVER_STATE_SHUTDOWN, SERVER_STATE_SHUTTING_DOWN,
    SERVER_STATE_STARTING, SERVER_STATE_UNKNOWN,
};
use crate::crd::{Cluster, Domain, ServerHealth};
use crate::labels::{ANNOTATION_ONLINE_UPDATE_RESULT, ANNOTATION_TOPOLOGY, ONLINE_UPDATE_RESTART_REQUIRED};
use crate::presence::DomainPresenceInfo;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Servers and clusters configured in a domain.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DomainTopology {
    #[serde(default)]
    pub name: String,
    pub admin_server_name: String,
    /// Servers outside any cluster, not including the administration server.
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default)]
    pub clusters: Vec<TopologyCluster>,
}

/// A configured cluster and its member servers, in start order.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TopologyCluster {
    pub name: String,
    #[serde(default)]
    pub servers: Vec<String>,
    /// Maximum size of a dynamic cluster. Absent for static clusters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_size: Option<i32>,
}

impl TopologyCluster {
    /// Largest replica count the cluster can honor.
    #[must_use]
    pub fn max_cluster_size(&self) -> i32 {
        self.dynamic_size
            .unwrap_or_else(|| i32::try_from(self.servers.len()).unwrap_or(i32::MAX))
    }
}

impl DomainTopology {
    #[must_use]
    pub fn cluster(&self, name: &str) -> Option<&TopologyCluster> {
        self.clusters.iter().find(|c| c.name == name)
    }

    /// Name of the cluster `server_name` belongs to, if any.
    #[must_use]
    pub fn cluster_of(&self, server_name: &str) -> Option<&str> {
        self.clusters
            .iter()
            .find(|c| c.servers.iter().any(|s| s == server_name))
            .map(|c| c.name.as_str())
    }

    /// Every configured server: administration server, standalone servers, cluster members.
    #[must_use]
    pub fn all_server_names(&self) -> Vec<String> {
        std::iter::once(self.admin_server_name.clone())
            .chain(self.servers.iter().cloned())
            .chain(self.clusters.iter().flat_map(|c| c.servers.iter().cloned()))
            .collect()
    }
}

/// Everything one status pass reads besides the presence info itself.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcileInputs {
    /// `None` until the topology is known.
    pub topology: Option<DomainTopology>,
    /// Observed state of each server that has a pod.
    pub server_state: BTreeMap<String, String>,
    pub server_health: BTreeMap<String, ServerHealth>,
    pub node_names: BTreeMap<String, String>,
    /// The last online update committed changes that need a restart.
    pub restart_required: bool,
}

/// Yields the per-pass reconcile inputs for a domain.
#[async_trait]
pub trait TopologyProvider: Send + Sync {
    /// Gathers topology, server state and health for `info`.
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs cannot be gathered.
    async fn inputs(&self, info: &DomainPresenceInfo) -> Result<ReconcileInputs, StepError>;
}

/// Derives reconcile inputs from cached pods and resource specs.
#[derive(Debug, Default, Clone, Copy)]
pub struct PodTopologyProvider;

#[async_trait]
impl TopologyProvider for PodTopologyProvider {
    async fn inputs(&self, info: &DomainPresenceInfo) -> Result<ReconcileInputs, StepError> {
        let Some(domain) = info.domain() else {
            return Ok(ReconcileInputs::default());
        };
        let job_pod = info.introspector_job_pod();

        let topology = job_pod
            .as_deref()
            .and_then(reported_topology)
            .unwrap_or_else(|| topology_from_specs(&domain, &info.clusters()));

        let mut inputs = ReconcileInputs {
            topology: Some(topology),
            restart_required: job_pod
                .as_deref()
                .and_then(|pod| annotation(pod, ANNOTATION_ONLINE_UPDATE_RESULT))
                .is_some_and(|value| value == ONLINE_UPDATE_RESTART_REQUIRED),
            ..ReconcileInputs::default()
        };

        for (server_name, pod) in info.server_pods() {
            inputs
                .server_state
                .insert(server_name.clone(), server_state(&pod).to_string());
            inputs.server_health.insert(
                server_name.clone(),
                ServerHealth {
                    overall_health: Some(
                        if is_pod_ready(&pod) { HEALTH_OK } else { HEALTH_NOT_READY }.to_string(),
                    ),
                    activation_time: None,
                },
            );
            if let Some(node) = pod.spec.as_ref().and_then(|s| s.node_name.clone()) {
                inputs.node_names.insert(server_name, node);
            }
        }

        Ok(inputs)
    }
}

fn annotation<'a>(pod: &'a Pod, key: &str) -> Option<&'a str> {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

fn reported_topology(pod: &Pod) -> Option<DomainTopology> {
    let raw = annotation(pod, ANNOTATION_TOPOLOGY)?;
    match serde_json::from_str(raw) {
        Ok(topology) => Some(topology),
        Err(e) => {
            warn!(
                pod = ?pod.metadata.name,
                error = %e,
                "Ignoring unparseable topology reported by introspector"
            );
            None
        }
    }
}

/// Builds a topology from the domain spec and the live cluster resources it references.
#[must_use]
pub fn topology_from_specs(domain: &Domain, clusters: &BTreeMap<String, Arc<Cluster>>) -> DomainTopology {
    let admin_server_name = domain
        .spec
        .admin_server
        .as_ref()
        .and_then(|a| a.server_name.clone())
        .unwrap_or_else(|| DEFAULT_ADMIN_SERVER_NAME.to_string());

    let clusters = domain
        .spec
        .clusters
        .iter()
        .filter_map(|reference| clusters.get(&reference.name))
        .map(|cluster| {
            let spec = &cluster.spec;
            let size = spec
                .max_cluster_size
                .or(spec.replicas)
                .or(domain.spec.replicas)
                .unwrap_or(DEFAULT_REPLICAS)
                .max(0);
            let prefix = spec.server_name_prefix.clone().unwrap_or_else(|| {
                format!("{}{DEFAULT_SERVER_NAME_PREFIX_SUFFIX}", spec.cluster_name)
            });
            TopologyCluster {
                name: spec.cluster_name.clone(),
                servers: (1..=size).map(|i| format!("{prefix}{i}")).collect(),
                dynamic_size: spec.max_cluster_size,
            }
        })
        .collect();

    DomainTopology {
        name: domain.domain_uid(),
        admin_server_name,
        servers: domain
            .spec
            .managed_servers
            .iter()
            .map(|s| s.server_name.clone())
            .collect(),
        clusters,
    }
}

/// Phase of a pod, if reported.
#[must_use]
pub fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|s| s.phase.as_deref())
}

/// Returns `true` if the pod's `Ready` condition is `True`.
#[must_use]
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Server state implied by a server pod.
#[must_use]
pub fn server_state(pod: &Pod) -> &'static str {
    if pod.metadata.deletion_timestamp.is_some() {
        return SERVER_STATE_SHUTTING_DOWN;
    }
    match pod_phase(pod) {
        Some(POD_PHASE_FAILED) => SERVER_STATE_FAILED,
        Some(POD_PHASE_RUNNING) if is_pod_ready(pod) => SERVER_STATE_RUNNING,
        Some(POD_PHASE_RUNNING | POD_PHASE_PENDING) => SERVER_STATE_STARTING,
        Some(POD_PHASE_SUCCEEDED) => SERVER_STATE_SHUTDOWN,
        _ => SERVER_STATE_UNKNOWN,
    }
}

#[cfg(test)]
#[path = "topology_tests.rs"]
mod topology_tests;

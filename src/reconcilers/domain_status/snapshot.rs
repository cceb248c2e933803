// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Point-in-time view of a domain used by one status pass.

#[allow(clippy::wildcard_imports)]
use super::types::*;
use crate::constants::DEFAULT_MAX_UNAVAILABLE;

/// Replica settings of one cluster resource, keyed by cluster name in a snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClusterSettings {
    pub replicas: Option<i32>,
    pub max_unavailable: Option<i32>,
}

/// Everything [`compute_new_status`](super::compute_new_status) reads.
///
/// Captured once per pass so the computation itself is a pure function.
#[derive(Clone, Debug, Default)]
pub struct StatusSnapshot {
    pub generation: Option<i64>,
    pub topology: Option<DomainTopology>,
    pub server_state: BTreeMap<String, String>,
    pub server_health: BTreeMap<String, ServerHealth>,
    pub node_names: BTreeMap<String, String>,
    /// `None` until a make-right has decided which servers to run.
    pub startup_info: Option<Vec<ServerStartupInfo>>,
    pub admin_server_name: Option<String>,
    pub servers_to_roll: BTreeSet<String>,
    pub failed_servers: BTreeSet<String>,
    pub pending_restart_servers: BTreeSet<String>,
    pub clusters: BTreeMap<String, ClusterSettings>,
    /// Domain-level replica count used when a cluster does not set one.
    pub default_replicas: Option<i32>,
    pub restart_required: bool,
    pub commit_update_only: bool,
}

impl StatusSnapshot {
    /// Captures the presence info of `domain` together with this pass's inputs.
    #[must_use]
    pub fn capture(info: &DomainPresenceInfo, domain: &Domain, inputs: &ReconcileInputs) -> Self {
        let clusters = info
            .clusters()
            .values()
            .map(|cluster| {
                (
                    cluster.spec.cluster_name.clone(),
                    ClusterSettings {
                        replicas: cluster.spec.replicas,
                        max_unavailable: cluster.spec.max_unavailable,
                    },
                )
            })
            .collect();

        Self {
            generation: domain.metadata.generation,
            topology: inputs.topology.clone(),
            server_state: inputs.server_state.clone(),
            server_health: inputs.server_health.clone(),
            node_names: inputs.node_names.clone(),
            startup_info: info.server_startup_info(),
            admin_server_name: info.admin_server_name(),
            servers_to_roll: info.servers_to_roll(),
            failed_servers: info.failed_servers(),
            pending_restart_servers: info.pending_restart_servers(),
            clusters,
            default_replicas: domain.spec.replicas,
            restart_required: inputs.restart_required,
            commit_update_only: domain.spec.commit_update_only(),
        }
    }

    /// The administration server plus every server in the startup decision.
    #[must_use]
    pub fn expected_running_servers(&self) -> BTreeSet<String> {
        self.admin_server_name
            .iter()
            .cloned()
            .chain(
                self.startup_info
                    .iter()
                    .flatten()
                    .map(|s| s.server_name.clone()),
            )
            .collect()
    }

    /// Cluster a server belongs to, from the startup decision or the topology.
    #[must_use]
    pub fn cluster_of(&self, server_name: &str) -> Option<String> {
        self.startup_info
            .iter()
            .flatten()
            .find(|s| s.server_name == server_name)
            .and_then(|s| s.cluster_name.clone())
            .or_else(|| {
                self.topology
                    .as_ref()
                    .and_then(|t| t.cluster_of(server_name))
                    .map(str::to_string)
            })
    }

    /// Requested replicas of a cluster, falling back to the domain setting.
    #[must_use]
    pub fn replicas_for(&self, cluster_name: &str) -> Option<i32> {
        self.clusters
            .get(cluster_name)
            .and_then(|c| c.replicas)
            .or(self.default_replicas)
    }

    #[must_use]
    pub fn max_unavailable_for(&self, cluster_name: &str) -> i32 {
        self.clusters
            .get(cluster_name)
            .and_then(|c| c.max_unavailable)
            .unwrap_or(DEFAULT_MAX_UNAVAILABLE)
    }

    #[must_use]
    pub fn is_running(&self, server_name: &str) -> bool {
        self.server_state
            .get(server_name)
            .is_some_and(|state| state == SERVER_STATE_RUNNING)
    }
}

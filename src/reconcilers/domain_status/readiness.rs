// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Readiness predicates behind the `Completed` and `Available` conditions.

#[allow(clippy::wildcard_imports)]
use super::types::*;
use super::StatusSnapshot;
use crate::status_reasons::too_many_replicas_message;

impl StatusSnapshot {
    /// One message per dynamic cluster whose requested replicas exceed its
    /// maximum size.
    #[must_use]
    pub fn too_many_replicas_messages(&self) -> Vec<String> {
        let Some(topology) = &self.topology else {
            return Vec::new();
        };
        topology
            .clusters
            .iter()
            .filter_map(|cluster| {
                let max = cluster.dynamic_size.filter(|size| *size > 0)?;
                let replicas = self.replicas_for(&cluster.name)?;
                (replicas > max).then(|| too_many_replicas_message(&cluster.name, replicas, max))
            })
            .collect()
    }

    /// Returns `true` when every server the operator intends to run is running
    /// and nothing else is.
    ///
    /// False until a startup decision exists, while any server waits for a
    /// roll, or while the status reports too many replicas.
    #[must_use]
    pub fn all_intended_servers_running(&self, status: &DomainStatus) -> bool {
        if self.startup_info.is_none()
            || !self.servers_to_roll.is_empty()
            || status.has_failure_reason(DomainFailureReason::ReplicasTooHigh)
        {
            return false;
        }

        let expected = self.expected_running_servers();
        let observed: BTreeSet<String> = self.server_state.keys().cloned().collect();

        !expected.is_empty()
            && expected.iter().all(|server| self.is_running(server))
            && expected == observed
    }

    /// Returns `true` when enough servers run for the domain to serve.
    ///
    /// Every expected standalone server must run. Each cluster with expected
    /// members needs at least one running and no more than its
    /// `maxUnavailable` not running.
    #[must_use]
    pub fn sufficient_servers_running(&self) -> bool {
        let expected = self.expected_running_servers();
        if !expected.iter().any(|server| self.is_running(server)) {
            return false;
        }

        let mut per_cluster: BTreeMap<String, Vec<&String>> = BTreeMap::new();
        for server in &expected {
            match self.cluster_of(server) {
                Some(cluster) => per_cluster.entry(cluster).or_default().push(server),
                None if !self.is_running(server) => return false,
                None => {}
            }
        }

        per_cluster.iter().all(|(cluster, members)| {
            let running = members.iter().filter(|s| self.is_running(s)).count();
            let not_ready = members.len() - running;
            running > 0
                && i32::try_from(not_ready).unwrap_or(i32::MAX) <= self.max_unavailable_for(cluster)
        })
    }
}

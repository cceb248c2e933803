// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-server and per-cluster status details.

#[allow(clippy::wildcard_imports)]
use super::types::*;
use super::StatusSnapshot;

/// Rewrites `servers`, `clusters` and `replicas` from the snapshot.
///
/// Leaves the details untouched while the topology is unknown.
pub(super) fn apply_details(status: &mut DomainStatus, snapshot: &StatusSnapshot) {
    let Some(topology) = &snapshot.topology else {
        return;
    };

    status.servers = server_statuses(topology, snapshot);
    status.clusters = cluster_statuses(topology, snapshot);
    status.replicas = Some(status.clusters.iter().filter_map(|c| c.replicas).sum());
}

fn server_statuses(topology: &DomainTopology, snapshot: &StatusSnapshot) -> Vec<ServerStatus> {
    let expected = snapshot.expected_running_servers();

    let mut names: BTreeSet<String> = topology.all_server_names().into_iter().collect();
    names.extend(snapshot.server_state.keys().cloned());

    let mut servers: Vec<ServerStatus> = names
        .into_iter()
        .map(|name| ServerStatus {
            state: Some(
                snapshot
                    .server_state
                    .get(&name)
                    .cloned()
                    .unwrap_or_else(|| SERVER_STATE_SHUTDOWN.to_string()),
            ),
            desired_state: Some(
                if expected.contains(&name) {
                    SERVER_STATE_RUNNING
                } else {
                    SERVER_STATE_SHUTDOWN
                }
                .to_string(),
            ),
            health: snapshot.server_health.get(&name).cloned(),
            cluster_name: snapshot.cluster_of(&name),
            node_name: snapshot.node_names.get(&name).cloned(),
            is_admin_server: name == topology.admin_server_name,
            server_name: name,
        })
        .collect();

    servers.sort_by(|a, b| {
        b.is_admin_server
            .cmp(&a.is_admin_server)
            .then_with(|| a.server_name.cmp(&b.server_name))
    });
    servers
}

fn cluster_statuses(topology: &DomainTopology, snapshot: &StatusSnapshot) -> Vec<ClusterStatus> {
    let mut clusters: Vec<ClusterStatus> = topology
        .clusters
        .iter()
        .map(|cluster| {
            let with_pods = cluster
                .servers
                .iter()
                .filter(|s| snapshot.server_state.contains_key(*s))
                .count();
            let ready = cluster
                .servers
                .iter()
                .filter(|s| snapshot.is_running(s))
                .count();
            ClusterStatus {
                cluster_name: cluster.name.clone(),
                replicas: Some(count(with_pods)),
                ready_replicas: Some(count(ready)),
                minimum_replicas: Some(0),
                maximum_replicas: Some(cluster.max_cluster_size()),
                replicas_goal: snapshot.replicas_for(&cluster.name),
            }
        })
        .collect();

    clusters.sort_by(|a, b| a.cluster_name.cmp(&b.cluster_name));
    clusters
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

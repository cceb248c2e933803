// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Domain status state machine.
//!
//! Computes the next `Domain` status from a [`StatusSnapshot`] and persists it
//! with optimistic concurrency, emitting the events each transition implies.
//!
//! ## Module Structure
//!
//! - [`conditions`] - Condition bookkeeping on `DomainStatus`
//! - [`details`] - Per-server and per-cluster details
//! - [`events`] - Events implied by a status transition
//! - [`failure_count`] - Introspection failure counting
//! - [`readiness`] - `Completed` and `Available` predicates
//! - [`snapshot`] - Point-in-time inputs of one pass
//! - [`types`] - Shared types and imports

// Submodules
pub mod conditions;
pub mod details;
pub mod events;
pub mod failure_count;
pub mod readiness;
pub mod snapshot;
pub mod types;

// Re-export public APIs for external use
pub use events::{is_fatal, status_change_events};
pub use failure_count::{record_introspection_failure, reset_introspection_failures, retries_exhausted};
pub use snapshot::{ClusterSettings, StatusSnapshot};

#[allow(clippy::wildcard_imports)]
use types::*;

use crate::api_errors::StoreError;
use crate::crd::{Cluster, ClusterResourceStatus};
use crate::metrics;
use crate::reconcilers::retry::status_backoff;
use crate::status_reasons::{join_messages, pending_restart_message, server_pod_failed_message};
use kube::ResourceExt;
use std::collections::HashSet;
use std::time::Duration;

/// Result of one [`update_domain_status`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusUpdateOutcome {
    /// The computed status equals the stored one; nothing was written.
    Unchanged,
    /// A new status was written and cached.
    Written,
    /// The domain is no longer cached or no longer exists.
    DomainGone,
}

/// Computes the next status from the current one.
///
/// Pure: the same `current` and `snapshot` always yield the same status, and
/// applying it to its own output changes nothing.
#[must_use]
pub fn compute_new_status(current: &DomainStatus, snapshot: &StatusSnapshot) -> DomainStatus {
    let mut status = current.clone();
    status.strip_obsolete_conditions();
    if snapshot.generation.is_some() {
        status.observed_generation = snapshot.generation;
    }
    details::apply_details(&mut status, snapshot);

    let too_many_replicas = snapshot.too_many_replicas_messages();
    if too_many_replicas.is_empty() {
        status.remove_failures_with_reason(DomainFailureReason::ReplicasTooHigh);
    } else {
        status.add_failure(
            DomainFailureReason::ReplicasTooHigh,
            join_messages(&too_many_replicas),
            Some(FailureSeverity::Severe),
        );
    }

    if snapshot.failed_servers.is_empty() {
        status.remove_failures_with_reason(DomainFailureReason::ServerPod);
    } else if too_many_replicas.is_empty() {
        let failed: Vec<String> = snapshot.failed_servers.iter().cloned().collect();
        status.add_failure(
            DomainFailureReason::ServerPod,
            server_pod_failed_message(&failed),
            Some(FailureSeverity::Severe),
        );
    }

    let completed = snapshot.all_intended_servers_running(&status);
    status.set_condition(DomainConditionType::Completed, completed);
    if completed {
        status.remove_conditions_of_type(DomainConditionType::Failed);
    }

    let available = too_many_replicas.is_empty() && snapshot.sufficient_servers_running();
    if available || status.has_condition(DomainConditionType::Available) {
        status.set_condition(DomainConditionType::Available, available);
    }

    if snapshot.restart_required && snapshot.commit_update_only {
        status.set_condition_with_message(
            DomainConditionType::ConfigChangesPendingRestart,
            true,
            Some(pending_restart_message()),
        );
    } else if snapshot.pending_restart_servers.is_empty() {
        status.remove_conditions_of_type(DomainConditionType::ConfigChangesPendingRestart);
    }

    status
}

/// Applies `modify` to the cached domain's status and persists the result.
///
/// Events implied by the transition are emitted before the replace, once per
/// call. A conflicting or transient failure re-reads the domain and retries
/// with backoff until it succeeds or hits an unrecoverable error. After a
/// successful write the per-cluster statuses are mirrored to the `Cluster`
/// resources on a best-effort basis.
///
/// # Errors
///
/// Returns the store error when the replace or re-read fails unrecoverably.
pub async fn update_domain_status<F>(
    ctx: &Context,
    info: &DomainPresenceInfo,
    mut modify: F,
) -> Result<StatusUpdateOutcome, StoreError>
where
    F: FnMut(&Domain, &mut DomainStatus) + Send,
{
    let mut backoff = status_backoff();
    // Two DomainFailed events with different reasons or messages are distinct.
    let mut emitted: HashSet<(EventItem, Option<DomainFailureReason>, Option<String>)> = HashSet::new();

    loop {
        let Some(domain) = info.domain() else {
            return Ok(StatusUpdateOutcome::DomainGone);
        };
        let current = domain.status.clone().unwrap_or_default();
        let mut new_status = current.clone();
        new_status.strip_obsolete_conditions();
        modify(&domain, &mut new_status);

        if domain.status.is_some() && new_status == current {
            debug!(
                namespace = %info.namespace(),
                domain_uid = %info.domain_uid(),
                "Domain status unchanged"
            );
            metrics::record_status_update("unchanged");
            return Ok(StatusUpdateOutcome::Unchanged);
        }

        for event in status_change_events(&current, &new_status, ctx.config.failure_retry_max_count) {
            if emitted.insert((event.item, event.failure_reason, event.message.clone())) {
                emit(ctx, info, &domain, event).await;
            }
        }

        let mut replacement = (*domain).clone();
        replacement.status = Some(new_status.clone());

        match ctx.store.replace_domain_status(&replacement).await {
            Ok(stored) => {
                info!(
                    namespace = %info.namespace(),
                    domain_uid = %info.domain_uid(),
                    "Updated domain status"
                );
                metrics::record_status_update("written");
                info.set_domain(Some(stored));
                mirror_cluster_statuses(ctx, info, &new_status).await;
                return Ok(StatusUpdateOutcome::Written);
            }
            Err(e) if e.is_unrecoverable() => {
                warn!(
                    namespace = %info.namespace(),
                    domain_uid = %info.domain_uid(),
                    error = %e,
                    "Domain status replace failed"
                );
                metrics::record_status_update("failed");
                metrics::record_error("domain_status", "unrecoverable");
                return Err(e);
            }
            Err(e) => {
                metrics::record_status_update("retried");
                let delay = backoff
                    .next_backoff()
                    .unwrap_or_else(|| Duration::from_secs(5));
                debug!(
                    namespace = %info.namespace(),
                    domain_uid = %info.domain_uid(),
                    error = %e,
                    retry_after_ms = delay.as_millis(),
                    "Retrying domain status replace"
                );
                tokio::time::sleep(delay).await;

                if !reread_domain(ctx, info, &domain.name_any()).await? {
                    return Ok(StatusUpdateOutcome::DomainGone);
                }
            }
        }
    }
}

/// Recomputes the status from presence and `inputs` and persists it.
///
/// # Errors
///
/// Returns the store error when the status cannot be written.
pub async fn recompute_domain_status(
    ctx: &Context,
    info: &DomainPresenceInfo,
    inputs: &ReconcileInputs,
) -> Result<StatusUpdateOutcome, StoreError> {
    update_domain_status(ctx, info, |domain, status| {
        let snapshot = StatusSnapshot::capture(info, domain, inputs);
        *status = compute_new_status(status, &snapshot);
    })
    .await
}

/// Refreshes the cached domain after a failed replace. Returns `false` once
/// the domain no longer exists.
async fn reread_domain(ctx: &Context, info: &DomainPresenceInfo, name: &str) -> Result<bool, StoreError> {
    match ctx.store.get_domain(info.namespace(), name).await {
        Ok(Some(fresh)) => {
            info.set_domain(Some(fresh));
            Ok(true)
        }
        Ok(None) => Ok(false),
        Err(e) if e.is_unrecoverable() => Err(e),
        Err(e) => {
            warn!(
                namespace = %info.namespace(),
                domain = %name,
                error = %e,
                "Failed to re-read domain; retrying with cached copy"
            );
            Ok(true)
        }
    }
}

async fn emit(ctx: &Context, info: &DomainPresenceInfo, domain: &Domain, event: EventData) {
    let event = event
        .with_resource(info.namespace(), &domain.name_any())
        .with_domain_uid(info.domain_uid());
    match ctx.events.emit(&event).await {
        Ok(()) => metrics::record_event_emitted(event.item.reason()),
        Err(e) => {
            warn!(
                namespace = %info.namespace(),
                domain_uid = %info.domain_uid(),
                reason = event.item.reason(),
                error = %e,
                "Failed to emit event"
            );
            metrics::record_error("events", "emit");
        }
    }
}

/// Copies each cluster's status onto its `Cluster` resource when it changed.
///
/// Works from the newest cached copy of each cluster and stores the
/// returned object in both the cluster presence and the domain's resolved
/// clusters, so the next write carries the current resource version.
async fn mirror_cluster_statuses(ctx: &Context, info: &DomainPresenceInfo, status: &DomainStatus) {
    for (name, resolved) in info.clusters() {
        let presence = ctx.presence.cluster(info.namespace(), &name);
        let cluster = presence.as_ref().map_or(resolved, |p| p.cluster());
        let Some(cluster_status) = status
            .clusters
            .iter()
            .find(|c| c.cluster_name == cluster.spec.cluster_name)
        else {
            continue;
        };

        let desired = ClusterResourceStatus {
            observed_generation: cluster.metadata.generation,
            replicas: cluster_status.replicas,
            ready_replicas: cluster_status.ready_replicas,
            maximum_replicas: cluster_status.maximum_replicas,
        };
        if cluster.status.as_ref() == Some(&desired) {
            continue;
        }

        let mut replacement: Cluster = (*cluster).clone();
        replacement.status = Some(desired);
        let stored = match ctx.store.replace_cluster_status(&replacement).await {
            Ok(stored) => stored,
            Err(e) if e.is_conflict() => {
                // Picked up again on the next status pass.
                debug!(namespace = %info.namespace(), cluster = %name, "Cluster status conflict, re-reading");
                match ctx.store.get_cluster(info.namespace(), &name).await {
                    Ok(Some(fresh)) => fresh,
                    _ => continue,
                }
            }
            Err(e) => {
                warn!(
                    namespace = %info.namespace(),
                    cluster = %name,
                    error = %e,
                    "Failed to update cluster status"
                );
                metrics::record_error("cluster_status", "replace");
                continue;
            }
        };
        if let Some(presence) = &presence {
            presence.set_cluster(stored.clone());
        }
        info.refresh_cluster(Arc::new(stored));
    }
}

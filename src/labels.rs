// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all reconcilers.
//!
//! The reconciler attaches pods, services, disruption budgets and events to a
//! domain purely by these labels. Resources missing the required labels are
//! skipped.

// ============================================================================
// Domain Labels
// ============================================================================

/// Label carrying the uid of the domain a resource belongs to
pub const LABEL_DOMAIN_UID: &str = "domainkeeper.firestoned.io/domain-uid";

/// Label carrying the server name on server pods and per-server services
pub const LABEL_SERVER_NAME: &str = "domainkeeper.firestoned.io/server-name";

/// Label carrying the cluster name on cluster services and disruption budgets
pub const LABEL_CLUSTER_NAME: &str = "domainkeeper.firestoned.io/cluster-name";

/// Label carrying the job name on introspector job pods
pub const LABEL_JOB_NAME: &str = "job-name";

/// Label set on a server pod whose configuration changed but needs a restart to apply
pub const LABEL_CONFIG_PENDING_RESTART: &str = "domainkeeper.firestoned.io/config-pending-restart";

/// Label set by the job controller with the uid of the owning job
pub const LABEL_JOB_CONTROLLER_UID: &str = "batch.kubernetes.io/controller-uid";

// ============================================================================
// Annotations
// ============================================================================

/// Annotation on the introspector job pod holding the reported domain topology (JSON)
pub const ANNOTATION_TOPOLOGY: &str = "domainkeeper.firestoned.io/topology";

/// Annotation on the introspector job pod holding the online update result
pub const ANNOTATION_ONLINE_UPDATE_RESULT: &str = "domainkeeper.firestoned.io/online-update-result";

/// Value of [`ANNOTATION_ONLINE_UPDATE_RESULT`] when non-dynamic changes need a restart
pub const ONLINE_UPDATE_RESTART_REQUIRED: &str = "RESTART_REQUIRED";

/// Annotation on a server pod marking it for a rolling restart
pub const ANNOTATION_ROLL_REQUESTED: &str = "domainkeeper.firestoned.io/roll-requested";

/// Returns `true` if the label map carries `key` set to `"true"`.
#[must_use]
pub fn is_flag_set(labels: Option<&std::collections::BTreeMap<String, String>>, key: &str) -> bool {
    labels
        .and_then(|labels| labels.get(key))
        .is_some_and(|value| value.eq_ignore_ascii_case("true"))
}

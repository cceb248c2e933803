// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Condition messages and message fragments for `Domain` status.
//!
//! Failure reasons themselves are the closed set in
//! [`DomainFailureReason`](crate::crd::DomainFailureReason); this module owns
//! the human-readable text that accompanies them.
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   message: "Introspection attempt 2 of 5 failed. Introspector job pod sample-introspector-x7k2 failed: bad model"
//!   introspectJobFailureCount: 2
//!   conditions:
//!     - type: Failed
//!       status: "True"
//!       reason: Introspection
//!       message: "Introspector job pod sample-introspector-x7k2 failed: bad model"
//!     - type: Completed
//!       status: "False"
//! ```

// ============================================================================
// Markers
// ============================================================================

/// Marker the introspector writes into its termination message for errors that
/// must not be retried.
pub const FATAL_INTROSPECTOR_ERROR: &str = "FatalIntrospectorError";

// ============================================================================
// Message Prefixes
// ============================================================================

/// Prefix written ahead of the failure message once the retry limit is reached.
pub const RETRIES_EXCEEDED_PREFIX: &str = "Stopping retries:";

/// Prefix written ahead of the failure message for a fatal introspection error.
pub const FATAL_ERROR_PREFIX: &str = "Introspection failed with a fatal error and will not be retried.";

// ============================================================================
// Condition Messages
// ============================================================================

/// Message of a `Failed`/`ReplicasTooHigh` condition for one cluster.
#[must_use]
pub fn too_many_replicas_message(cluster_name: &str, replicas: i32, max_cluster_size: i32) -> String {
    format!(
        "Replica count {replicas} for cluster '{cluster_name}' exceeds the maximum cluster size of {max_cluster_size}"
    )
}

/// Message of a `Failed`/`ServerPod` condition.
#[must_use]
pub fn server_pod_failed_message(servers: &[String]) -> String {
    format!("Server pods failed: {}", servers.join(", "))
}

/// Message of a `Failed`/`Introspection` condition raised from a failed job pod.
#[must_use]
pub fn introspector_failed_message(pod_name: &str, detail: Option<&str>) -> String {
    match detail.map(str::trim).filter(|d| !d.is_empty()) {
        Some(detail) => format!("Introspector job pod {pod_name} failed: {detail}"),
        None => format!("Introspector job pod {pod_name} failed"),
    }
}

/// Prefix written ahead of the failure message while retries remain.
#[must_use]
pub fn retry_attempt_prefix(attempt: i32, max: i32) -> String {
    format!("Introspection attempt {attempt} of {max} failed.")
}

/// Message carried by the retries-exceeded event.
#[must_use]
pub fn retries_exceeded_message(max: i32) -> String {
    format!("{RETRIES_EXCEEDED_PREFIX} introspection failed {max} times")
}

/// Message of the `ConfigChangesPendingRestart` condition.
#[must_use]
pub fn pending_restart_message() -> String {
    "Online update applied; non-dynamic configuration changes take effect after the servers restart"
        .to_string()
}

/// Joins several condition messages into one.
#[must_use]
pub fn join_messages(messages: &[String]) -> String {
    messages.join("; ")
}

/// Returns `true` if a free-text message carries the fatal introspector marker.
#[must_use]
pub fn is_fatal_message(message: &str) -> bool {
    message.contains(FATAL_INTROSPECTOR_ERROR)
}

#[cfg(test)]
#[path = "status_reasons_tests.rs"]
mod status_reasons_tests;

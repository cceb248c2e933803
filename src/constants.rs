// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the domainkeeper operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "domainkeeper.firestoned.io/v1alpha1";

/// Kind name for `Domain` resource
pub const KIND_DOMAIN: &str = "Domain";

/// Kind name for `Cluster` resource
pub const KIND_CLUSTER: &str = "Cluster";

/// Reporting controller name used on emitted Kubernetes events
pub const CONTROLLER_NAME: &str = "domainkeeper";

// ============================================================================
// Server State Constants
// ============================================================================

/// Server is up and serving requests
pub const SERVER_STATE_RUNNING: &str = "RUNNING";

/// Server pod exists but the server has not reported ready yet
pub const SERVER_STATE_STARTING: &str = "STARTING";

/// Server pod is being torn down
pub const SERVER_STATE_SHUTTING_DOWN: &str = "SHUTTING_DOWN";

/// Server is configured but has no pod
pub const SERVER_STATE_SHUTDOWN: &str = "SHUTDOWN";

/// Server pod terminated with a failure
pub const SERVER_STATE_FAILED: &str = "FAILED";

/// Server state could not be determined
pub const SERVER_STATE_UNKNOWN: &str = "UNKNOWN";

/// Overall health reported for a ready server
pub const HEALTH_OK: &str = "ok";

/// Overall health reported for a server that is not ready
pub const HEALTH_NOT_READY: &str = "not-ready";

// ============================================================================
// Topology Defaults
// ============================================================================

/// Server name used for the administration server when the spec omits one
pub const DEFAULT_ADMIN_SERVER_NAME: &str = "admin-server";

/// Suffix appended to a cluster name to build its managed-server name prefix
pub const DEFAULT_SERVER_NAME_PREFIX_SUFFIX: &str = "-ms-";

/// Replica count assumed when neither the cluster nor the domain sets one
pub const DEFAULT_REPLICAS: i32 = 1;

/// Number of cluster members that may be not ready while the cluster counts as available
pub const DEFAULT_MAX_UNAVAILABLE: i32 = 1;

// ============================================================================
// Operator Configuration Defaults
// ============================================================================

/// Default namespace watched when none is configured
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default maximum number of introspection failures before giving up
pub const DEFAULT_FAILURE_RETRY_MAX_COUNT: i32 = 5;

/// Default number of backstop re-reads a wait-for-ready step performs
pub const DEFAULT_READY_RECHECK_COUNT: u32 = 10;

/// Default interval between backstop re-reads (seconds)
pub const DEFAULT_READY_RECHECK_INTERVAL_SECS: u64 = 5;

/// Default interval of the recurring domain status recompute (seconds)
pub const DEFAULT_STATUS_UPDATE_INTERVAL_SECS: u64 = 10;

/// Default interval between full resource list passes (seconds)
pub const DEFAULT_LIST_RESYNC_INTERVAL_SECS: u64 = 60;

/// Default bind address of the metrics endpoint
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Path where Prometheus metrics are served
pub const METRICS_SERVER_PATH: &str = "/metrics";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for the Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Pause between status replace attempts after a recoverable failure (milliseconds)
pub const STATUS_RETRY_PAUSE_MILLIS: u64 = 250;

// ============================================================================
// Pod Phase Constants
// ============================================================================

/// Pod phase for a pod whose containers all terminated successfully
pub const POD_PHASE_SUCCEEDED: &str = "Succeeded";

/// Pod phase for a pod with at least one failed container
pub const POD_PHASE_FAILED: &str = "Failed";

/// Pod phase for a running pod
pub const POD_PHASE_RUNNING: &str = "Running";

/// Pod phase for a pod waiting to be scheduled or started
pub const POD_PHASE_PENDING: &str = "Pending";

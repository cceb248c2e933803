// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for application-server domains.
//!
//! # Resource Types
//!
//! - [`Domain`] - An application-server domain: an administration server plus
//!   managed servers, optionally grouped into clusters
//! - [`Cluster`] - A cluster of managed servers referenced by one or more domains
//!
//! Both resources expose a `status` subresource that the operator owns. The
//! `Domain` status carries the condition state machine computed by
//! [`crate::reconcilers::domain_status`].
//!
//! # Example: A Domain With One Cluster
//!
//! ```rust,no_run
//! use domainkeeper::crd::{ClusterReference, DomainSpec};
//!
//! let spec = DomainSpec {
//!     domain_uid: Some("sample".to_string()),
//!     clusters: vec![ClusterReference { name: "sample-cluster-1".to_string() }],
//!     replicas: Some(2),
//!     ..DomainSpec::default()
//! };
//! assert_eq!(spec.clusters.len(), 1);
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ============================================================================
// Domain
// ============================================================================

/// `Domain` declares an application-server domain managed by the operator.
///
/// # Example
///
/// ```yaml
/// apiVersion: domainkeeper.firestoned.io/v1alpha1
/// kind: Domain
/// metadata:
///   name: sample
///   namespace: apps
/// spec:
///   domainUid: sample
///   replicas: 2
///   adminServer:
///     serverName: admin-server
///   clusters:
///     - name: sample-cluster-1
/// ```
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "domainkeeper.firestoned.io",
    version = "v1alpha1",
    kind = "Domain",
    namespaced,
    shortname = "dom",
    doc = "Domain represents an application-server domain. The operator tracks its pods, services and disruption budgets and reports server and cluster readiness through status conditions."
)]
#[kube(status = "DomainStatus")]
#[serde(rename_all = "camelCase")]
pub struct DomainSpec {
    /// Unique identifier of the domain. Defaults to `metadata.name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_uid: Option<String>,

    /// Default replica count for every referenced cluster that does not set its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Administration server settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_server: Option<AdminServerSpec>,

    /// Managed servers that do not belong to any cluster.
    #[serde(default)]
    pub managed_servers: Vec<ManagedServerSpec>,

    /// Names of the `Cluster` resources this domain includes.
    #[serde(default)]
    pub clusters: Vec<ClusterReference>,

    /// Which servers the operator should run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_start_policy: Option<ServerStartPolicy>,

    /// Model-in-image configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<DomainConfiguration>,

    /// Changing this value requests a new introspection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introspect_version: Option<String>,

    /// Changing this value requests a rolling restart of all servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_version: Option<String>,
}

/// Administration server settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdminServerSpec {
    /// Server name of the administration server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
}

/// A managed server outside any cluster.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedServerSpec {
    /// Server name.
    pub server_name: String,

    /// Overrides the domain-level start policy for this server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_start_policy: Option<ServerStartPolicy>,
}

/// Reference to a `Cluster` resource in the same namespace.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterReference {
    /// Name of the `Cluster` resource.
    pub name: String,
}

/// Which servers the operator should keep running.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ServerStartPolicy {
    /// Run the administration server and the replicas each cluster asks for.
    #[default]
    IfNeeded,
    /// Run only the administration server.
    AdminOnly,
    /// Run nothing.
    Never,
}

/// Domain configuration block.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainConfiguration {
    /// Model-in-image settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfiguration>,
}

/// Model-in-image settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfiguration {
    /// Online update behavior for model changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online_update: Option<OnlineUpdate>,
}

/// Online update settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUpdate {
    /// Apply model changes to running servers without a restart when possible.
    #[serde(default)]
    pub enabled: bool,

    /// What to do when an update contains non-dynamic changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_non_dynamic_changes: Option<OnNonDynamicChanges>,
}

/// Policy for non-dynamic configuration changes applied by an online update.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum OnNonDynamicChanges {
    /// Commit the change and leave restarting to the user.
    #[default]
    CommitUpdateOnly,
    /// Commit the change and roll the affected servers.
    CommitUpdateAndRoll,
}

impl DomainSpec {
    /// Returns `true` when non-dynamic online updates are committed without a roll.
    #[must_use]
    pub fn commit_update_only(&self) -> bool {
        self.configuration
            .as_ref()
            .and_then(|c| c.model.as_ref())
            .and_then(|m| m.online_update.as_ref())
            .filter(|u| u.enabled)
            .map(|u| u.on_non_dynamic_changes.unwrap_or_default())
            == Some(OnNonDynamicChanges::CommitUpdateOnly)
    }

    /// Effective start policy for the domain.
    #[must_use]
    pub fn start_policy(&self) -> ServerStartPolicy {
        self.server_start_policy.unwrap_or_default()
    }
}

impl Domain {
    /// Effective domain uid: the spec value, falling back to the resource name.
    #[must_use]
    pub fn domain_uid(&self) -> String {
        self.spec
            .domain_uid
            .clone()
            .or_else(|| self.metadata.name.clone())
            .unwrap_or_default()
    }

    /// Names of the `Cluster` resources referenced by this domain.
    #[must_use]
    pub fn cluster_names(&self) -> Vec<String> {
        self.spec.clusters.iter().map(|c| c.name.clone()).collect()
    }

    /// Returns `true` if this domain references the named `Cluster` resource.
    #[must_use]
    pub fn references_cluster(&self, cluster_resource_name: &str) -> bool {
        self.spec
            .clusters
            .iter()
            .any(|c| c.name == cluster_resource_name)
    }
}

// ============================================================================
// Cluster
// ============================================================================

/// `Cluster` declares the desired size of a cluster of managed servers.
///
/// # Example
///
/// ```yaml
/// apiVersion: domainkeeper.firestoned.io/v1alpha1
/// kind: Cluster
/// metadata:
///   name: sample-cluster-1
/// spec:
///   clusterName: cluster-1
///   replicas: 3
///   maxUnavailable: 1
/// ```
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "domainkeeper.firestoned.io",
    version = "v1alpha1",
    kind = "Cluster",
    namespaced,
    shortname = "clu",
    doc = "Cluster represents a group of managed servers in a domain. Its replica count controls how many members the operator starts."
)]
#[kube(status = "ClusterResourceStatus")]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Name of the cluster inside the domain configuration.
    pub cluster_name: String,

    /// Number of members to run. Falls back to the domain's `replicas`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Members that may be not ready while the cluster still counts as available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<i32>,

    /// Configured dynamic cluster size, as reported by introspection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cluster_size: Option<i32>,

    /// Prefix of generated member server names. Defaults to `<clusterName>-ms-`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name_prefix: Option<String>,
}

/// `Cluster` status, mirrored from the owning domain's cluster status.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResourceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_replicas: Option<i32>,
}

// ============================================================================
// Domain Status
// ============================================================================

/// `Domain` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainStatus {
    /// At most one condition per type, ordered by [`DomainConditionType`].
    #[serde(default)]
    pub conditions: Vec<DomainCondition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DomainFailureReason>,

    #[serde(default)]
    pub servers: Vec<ServerStatus>,

    #[serde(default)]
    pub clusters: Vec<ClusterStatus>,

    /// Total replicas across all clusters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Consecutive failed introspection attempts.
    #[serde(default)]
    pub introspect_job_failure_count: i32,

    /// Uid of the job whose failure was last counted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_introspection_uid: Option<String>,
}

/// Per-server status.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub server_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<ServerHealth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default)]
    pub is_admin_server: bool,
}

/// Health reported for one server.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerHealth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_health: Option<String>,
    /// RFC3339 time the server became ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_time: Option<String>,
}

/// Per-cluster status.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    pub cluster_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas_goal: Option<i32>,
}

/// Condition types, in the order they are kept in the status.
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub enum DomainConditionType {
    Failed,
    Available,
    Completed,
    ConfigChangesPendingRestart,
    /// No longer produced; stripped whenever a status is read.
    Progressing,
}

/// Status of a condition.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum ConditionStatus {
    True,
    False,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// Why a domain failed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum DomainFailureReason {
    Aborted,
    Internal,
    TopologyMismatch,
    ReplicasTooHigh,
    ServerPod,
    Kubernetes,
    Introspection,
    DomainInvalid,
}

/// How serious a failure is.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum FailureSeverity {
    /// Retrying cannot help.
    Fatal,
    Severe,
    Warning,
}

/// A status condition on a `Domain`.
///
/// Two conditions compare equal regardless of `last_transition_time`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DomainCondition {
    pub r#type: DomainConditionType,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DomainFailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<FailureSeverity>,
    /// RFC3339 time of the last status change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl PartialEq for DomainCondition {
    fn eq(&self, other: &Self) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
            && self.severity == other.severity
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Make-right operations and their executor.
//!
//! A make-right brings the operator's view of one domain (or of one cluster
//! as seen from a domain) in line with the cluster state: it registers the
//! presence info, waits for a running introspection, records its outcome and
//! recomputes the domain status.
//!
//! ## Module Structure
//!
//! - [`plan`] - Steps of domain and cluster plans
//! - [`processor`] - [`DomainProcessor`], the tokio-backed executor

pub mod plan;
pub mod processor;

pub use processor::DomainProcessor;

use crate::events::EventData;
use crate::presence::{ClusterPresenceInfo, DomainPresenceInfo};
use k8s_openapi::api::core::v1::Pod;
use std::fmt;
use std::sync::Arc;

/// Decides at execution time whether a queued operation still needs to run.
pub type ShouldProceed = Box<dyn Fn(&DomainPresenceInfo) -> bool + Send + Sync>;

/// Identity under which at most one operation runs at a time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKey {
    Domain {
        namespace: String,
        domain_uid: String,
    },
    Cluster {
        namespace: String,
        /// Empty when no domain references the cluster.
        domain_uid: String,
        cluster: String,
    },
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKey::Domain {
                namespace,
                domain_uid,
            } => write!(f, "domain {namespace}/{domain_uid}"),
            OperationKey::Cluster {
                namespace,
                domain_uid,
                cluster,
            } => write!(f, "cluster {namespace}/{cluster} of domain '{domain_uid}'"),
        }
    }
}

/// A make-right of one domain.
pub struct MakeRightDomainOperation {
    pub info: Arc<DomainPresenceInfo>,
    pub explicit_recheck: bool,
    pub interrupt: bool,
    pub deletion: bool,
    pub event: Option<EventData>,
    /// Generation of the domain when the operation was created.
    pub generation: Option<i64>,
}

impl MakeRightDomainOperation {
    #[must_use]
    pub fn new(info: Arc<DomainPresenceInfo>) -> Self {
        let generation = info.domain_generation();
        Self {
            info,
            explicit_recheck: false,
            interrupt: false,
            deletion: false,
            event: None,
            generation,
        }
    }

    /// Runs even when the generation did not change.
    #[must_use]
    pub fn with_explicit_recheck(mut self) -> Self {
        self.explicit_recheck = true;
        self
    }

    #[must_use]
    pub fn with_event(mut self, event: EventData) -> Self {
        self.event = Some(event);
        self
    }

    /// Aborts a running operation for the same domain instead of queueing.
    #[must_use]
    pub fn interrupt(mut self) -> Self {
        self.interrupt = true;
        self
    }

    #[must_use]
    pub fn for_deletion(mut self) -> Self {
        self.deletion = true;
        self
    }

    #[must_use]
    pub fn key(&self) -> OperationKey {
        OperationKey::Domain {
            namespace: self.info.namespace().to_string(),
            domain_uid: self.info.domain_uid().to_string(),
        }
    }
}

impl fmt::Debug for MakeRightDomainOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MakeRightDomainOperation")
            .field("key", &self.key())
            .field("explicit_recheck", &self.explicit_recheck)
            .field("interrupt", &self.interrupt)
            .field("deletion", &self.deletion)
            .field("event", &self.event.as_ref().map(|e| e.item))
            .field("generation", &self.generation)
            .finish()
    }
}

/// A make-right of one cluster, on behalf of a referencing domain if any.
pub struct MakeRightClusterOperation {
    pub cluster: Arc<ClusterPresenceInfo>,
    pub domain: Option<Arc<DomainPresenceInfo>>,
    pub deletion: bool,
    pub event: Option<EventData>,
}

impl MakeRightClusterOperation {
    #[must_use]
    pub fn new(cluster: Arc<ClusterPresenceInfo>, domain: Option<Arc<DomainPresenceInfo>>) -> Self {
        Self {
            cluster,
            domain,
            deletion: false,
            event: None,
        }
    }

    #[must_use]
    pub fn with_event(mut self, event: EventData) -> Self {
        self.event = Some(event);
        self
    }

    #[must_use]
    pub fn for_deletion(mut self) -> Self {
        self.deletion = true;
        self
    }

    #[must_use]
    pub fn key(&self) -> OperationKey {
        OperationKey::Cluster {
            namespace: self.cluster.namespace().to_string(),
            domain_uid: self
                .domain
                .as_ref()
                .map(|d| d.domain_uid().to_string())
                .unwrap_or_default(),
            cluster: self.cluster.resource_name().to_string(),
        }
    }
}

impl fmt::Debug for MakeRightClusterOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MakeRightClusterOperation")
            .field("key", &self.key())
            .field("deletion", &self.deletion)
            .field("event", &self.event.as_ref().map(|e| e.item))
            .finish()
    }
}

/// The default proceed policy for `op`.
///
/// Deletions always run. Otherwise a domain never made right runs, an
/// operation older than the cached generation is skipped, and an explicit
/// recheck or a generation change since the last make-right runs.
#[must_use]
pub fn should_continue(op: &MakeRightDomainOperation) -> ShouldProceed {
    let deletion = op.deletion;
    let explicit_recheck = op.explicit_recheck;
    let op_generation = op.generation;
    Box::new(move |info: &DomainPresenceInfo| {
        if deletion {
            return true;
        }
        let Some(last_processed) = info.last_processed_generation() else {
            return true;
        };
        let cached = info.domain_generation();
        if let (Some(op_generation), Some(cached)) = (op_generation, cached) {
            if op_generation < cached {
                return false;
            }
        }
        explicit_recheck || cached != Some(last_processed)
    })
}

/// Runs make-right operations and status timers.
pub trait MakeRightExecutor: Send + Sync {
    /// Runs `op` once no other operation for its key is active.
    ///
    /// `should_proceed` is evaluated against the cached presence info right
    /// before execution.
    fn run_make_right_domain(&self, op: MakeRightDomainOperation, should_proceed: ShouldProceed);

    fn run_make_right_cluster(&self, op: MakeRightClusterOperation);

    /// Recomputes a domain's status after its introspector job pod changed.
    fn update_domain_status_from_job_pod(&self, info: Arc<DomainPresenceInfo>, job_pod: Pod);

    /// Starts recurring status recomputes for a domain. No-op if already running.
    fn schedule_domain_status_updates(&self, info: Arc<DomainPresenceInfo>);

    fn end_scheduled_domain_status_updates(&self, info: &DomainPresenceInfo);

    fn register_domain_presence_info(&self, info: Arc<DomainPresenceInfo>);

    fn unregister_domain_presence_info(&self, info: &DomainPresenceInfo);

    /// Returns `true` while an operation for the domain runs or is queued.
    fn is_domain_in_flight(&self, namespace: &str, domain_uid: &str) -> bool;
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the reconciliation core.
//!
//! Every component receives an `Arc<Context>` that contains:
//! - Operator configuration
//! - The resource store used for all API reads and status replaces
//! - The event sink
//! - The topology provider
//! - The presence cache
//! - The pod watch registry used by wait-for-ready steps
//!
//! Nothing in the core reaches for process-wide state; tests build a
//! `Context` around in-memory fakes.

use crate::config::OperatorConfig;
use crate::events::EventSink;
use crate::presence::PresenceCache;
use crate::store::ResourceStore;
use crate::topology::TopologyProvider;
use crate::watch::WatchRegistry;
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;

/// Shared context passed to the list reconciler, make-right tasks and status timers.
pub struct Context {
    /// Operator configuration
    pub config: OperatorConfig,

    /// Resource reads and status replaces
    pub store: Arc<dyn ResourceStore>,

    /// Kubernetes event publication
    pub events: Arc<dyn EventSink>,

    /// Per-pass topology, server state and health
    pub topology: Arc<dyn TopologyProvider>,

    /// Cached per-domain and per-cluster state
    pub presence: PresenceCache,

    /// Callbacks waiting on pod updates
    pub pod_watches: WatchRegistry<Pod>,
}

impl Context {
    #[must_use]
    pub fn new(
        config: OperatorConfig,
        store: Arc<dyn ResourceStore>,
        events: Arc<dyn EventSink>,
        topology: Arc<dyn TopologyProvider>,
    ) -> Self {
        Self {
            config,
            store,
            events,
            topology,
            presence: PresenceCache::new(),
            pod_watches: WatchRegistry::new(),
        }
    }
}

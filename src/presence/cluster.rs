// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cached state of one `Cluster` resource.

use crate::crd::Cluster;
use kube::ResourceExt;
use std::sync::{Arc, PoisonError, RwLock};

/// Last known `Cluster` resource, keyed by namespace and resource name.
#[derive(Debug)]
pub struct ClusterPresenceInfo {
    namespace: String,
    resource_name: String,
    cluster: RwLock<Arc<Cluster>>,
}

impl ClusterPresenceInfo {
    #[must_use]
    pub fn new(cluster: Cluster) -> Self {
        Self {
            namespace: cluster.namespace().unwrap_or_default(),
            resource_name: cluster.name_any(),
            cluster: RwLock::new(Arc::new(cluster)),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    #[must_use]
    pub fn cluster(&self) -> Arc<Cluster> {
        Arc::clone(&self.cluster.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn set_cluster(&self, cluster: Cluster) {
        *self.cluster.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(cluster);
    }

    /// Generation of the cached resource.
    #[must_use]
    pub fn generation(&self) -> Option<i64> {
        self.cluster().metadata.generation
    }

    /// Cluster name inside the domain configuration.
    #[must_use]
    pub fn cluster_name(&self) -> String {
        self.cluster().spec.cluster_name.clone()
    }
}

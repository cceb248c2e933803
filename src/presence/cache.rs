// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Namespace-sharded presence cache.
//!
//! The outer lock only guards the shard map; each namespace shard has its own
//! locks for domains and clusters, and each [`DomainPresenceInfo`] locks itself.

use super::{ClusterPresenceInfo, DomainPresenceInfo};
use crate::metrics::record_presence_entries;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Default)]
struct NamespaceShard {
    domains: RwLock<BTreeMap<String, Arc<DomainPresenceInfo>>>,
    clusters: RwLock<BTreeMap<String, Arc<ClusterPresenceInfo>>>,
}

/// Per-namespace mapping of domain uids and cluster resource names to cached state.
#[derive(Default)]
pub struct PresenceCache {
    shards: RwLock<HashMap<String, Arc<NamespaceShard>>>,
}

impl PresenceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn existing_shard(&self, namespace: &str) -> Option<Arc<NamespaceShard>> {
        self.shards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .cloned()
    }

    fn shard(&self, namespace: &str) -> Arc<NamespaceShard> {
        if let Some(shard) = self.existing_shard(namespace) {
            return shard;
        }
        Arc::clone(
            self.shards
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(namespace.to_string())
                .or_default(),
        )
    }

    /// Namespaces that have (or had) entries.
    #[must_use]
    pub fn namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self
            .shards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        namespaces.sort();
        namespaces
    }

    // ------------------------------------------------------------------
    // Domains
    // ------------------------------------------------------------------

    #[must_use]
    pub fn domain(&self, namespace: &str, domain_uid: &str) -> Option<Arc<DomainPresenceInfo>> {
        self.existing_shard(namespace)?
            .domains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(domain_uid)
            .cloned()
    }

    /// Returns the cached entry, creating an empty one if none exists.
    pub fn domain_or_insert(&self, namespace: &str, domain_uid: &str) -> Arc<DomainPresenceInfo> {
        let shard = self.shard(namespace);
        let mut domains = shard.domains.write().unwrap_or_else(PoisonError::into_inner);
        let info = domains
            .entry(domain_uid.to_string())
            .or_insert_with(|| Arc::new(DomainPresenceInfo::new(namespace, domain_uid)));
        let info = Arc::clone(info);
        record_presence_entries(namespace, "domain", domains.len());
        info
    }

    /// Stores `info`, replacing any entry with the same uid.
    pub fn register_domain(&self, info: Arc<DomainPresenceInfo>) {
        let namespace = info.namespace().to_string();
        let shard = self.shard(&namespace);
        let mut domains = shard.domains.write().unwrap_or_else(PoisonError::into_inner);
        domains.insert(info.domain_uid().to_string(), info);
        record_presence_entries(&namespace, "domain", domains.len());
    }

    pub fn unregister_domain(
        &self,
        namespace: &str,
        domain_uid: &str,
    ) -> Option<Arc<DomainPresenceInfo>> {
        let shard = self.existing_shard(namespace)?;
        let mut domains = shard.domains.write().unwrap_or_else(PoisonError::into_inner);
        let removed = domains.remove(domain_uid);
        record_presence_entries(namespace, "domain", domains.len());
        removed
    }

    /// Snapshot of every cached domain in a namespace, ordered by uid.
    #[must_use]
    pub fn domains(&self, namespace: &str) -> Vec<Arc<DomainPresenceInfo>> {
        self.existing_shard(namespace)
            .map(|shard| {
                shard
                    .domains
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .values()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Clusters
    // ------------------------------------------------------------------

    #[must_use]
    pub fn cluster(&self, namespace: &str, resource_name: &str) -> Option<Arc<ClusterPresenceInfo>> {
        self.existing_shard(namespace)?
            .clusters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource_name)
            .cloned()
    }

    pub fn register_cluster(&self, info: Arc<ClusterPresenceInfo>) {
        let namespace = info.namespace().to_string();
        let shard = self.shard(&namespace);
        let mut clusters = shard.clusters.write().unwrap_or_else(PoisonError::into_inner);
        clusters.insert(info.resource_name().to_string(), info);
        record_presence_entries(&namespace, "cluster", clusters.len());
    }

    pub fn unregister_cluster(
        &self,
        namespace: &str,
        resource_name: &str,
    ) -> Option<Arc<ClusterPresenceInfo>> {
        let shard = self.existing_shard(namespace)?;
        let mut clusters = shard.clusters.write().unwrap_or_else(PoisonError::into_inner);
        let removed = clusters.remove(resource_name);
        record_presence_entries(namespace, "cluster", clusters.len());
        removed
    }

    /// Snapshot of every cached cluster in a namespace, ordered by resource name.
    #[must_use]
    pub fn clusters(&self, namespace: &str) -> Vec<Arc<ClusterPresenceInfo>> {
        self.existing_shard(namespace)
            .map(|shard| {
                shard
                    .clusters
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .values()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

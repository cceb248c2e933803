// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Presence tracking for domains and clusters.
//!
//! - [`DomainPresenceInfo`] - pods, services, disruption budgets and the domain
//!   resource itself for one domain uid
//! - [`ClusterPresenceInfo`] - the last known `Cluster` resource
//! - [`PresenceCache`] - both of the above, sharded by namespace

mod cache;
mod cluster;
mod domain;

pub use cache::PresenceCache;
pub use cluster::ClusterPresenceInfo;
pub use domain::{DomainPresenceInfo, ServerStartupInfo};

#[cfg(test)]
#[path = "presence_tests.rs"]
mod presence_tests;

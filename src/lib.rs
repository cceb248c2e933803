// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # Domainkeeper - Domain Resource Reconciliation for Kubernetes
//!
//! Domainkeeper is the reconciliation core of a Kubernetes operator that runs
//! clustered application-server domains. A `Domain` custom resource describes
//! an admin server, managed servers and clusters; the operator keeps the pods,
//! services and status of each domain in line with that description.
//!
//! ## Overview
//!
//! - A **presence cache** holds the last known state of every domain and
//!   cluster, keyed by namespace
//! - A periodic **list pass** rebuilds that state from full resource lists and
//!   decides what to make right
//! - The **make-right engine** runs one keyed operation at a time per domain or
//!   cluster, as an ordered plan of steps
//! - The **status updater** derives conditions, server status and events from
//!   the observed topology and persists them
//!
//! ## Modules
//!
//! - [`crd`] - `Domain` and `Cluster` custom resource types
//! - [`presence`] - Per-namespace cache of domain and cluster state
//! - [`reconcilers`] - List pass, make-right plans and status computation
//! - [`context`] - Shared context handed to every component
//! - [`store`] - Resource reads and status replaces against the API server
//! - [`events`] - Kubernetes event publication
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use domainkeeper::crd::{Domain, DomainSpec};
//!
//! let domain = Domain::new(
//!     "sample",
//!     DomainSpec {
//!         domain_uid: Some("sample".to_string()),
//!         replicas: Some(2),
//!         ..DomainSpec::default()
//!     },
//! );
//! assert_eq!(domain.domain_uid(), "sample");
//! ```

pub mod api_errors;
pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod events;
pub mod labels;
pub mod metrics;
pub mod presence;
pub mod reconcilers;
pub mod status_reasons;
pub mod store;
pub mod topology;
pub mod watch;

#[cfg(test)]
mod test_support;

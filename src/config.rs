// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Operator configuration.
//!
//! Every setting is a command-line flag with an environment variable fallback.

use crate::constants::{
    DEFAULT_FAILURE_RETRY_MAX_COUNT, DEFAULT_LIST_RESYNC_INTERVAL_SECS,
    DEFAULT_METRICS_BIND_ADDRESS, DEFAULT_NAMESPACE, DEFAULT_READY_RECHECK_COUNT,
    DEFAULT_READY_RECHECK_INTERVAL_SECS, DEFAULT_STATUS_UPDATE_INTERVAL_SECS,
};
use clap::Parser;
use std::time::Duration;

/// Settings for one operator process.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "domainkeeper", version, about = "Reconciles application-server domains")]
pub struct OperatorConfig {
    /// Namespaces to manage (comma separated)
    #[arg(
        long = "namespaces",
        env = "DOMAINKEEPER_NAMESPACES",
        value_delimiter = ',',
        default_value = DEFAULT_NAMESPACE
    )]
    pub namespaces: Vec<String>,

    /// Introspection failures tolerated before retries stop
    #[arg(long, env = "DOMAINKEEPER_FAILURE_RETRY_MAX_COUNT", default_value_t = DEFAULT_FAILURE_RETRY_MAX_COUNT)]
    pub failure_retry_max_count: i32,

    /// Backstop re-reads a waiting step performs before giving up
    #[arg(long, env = "DOMAINKEEPER_READY_RECHECK_COUNT", default_value_t = DEFAULT_READY_RECHECK_COUNT)]
    pub ready_recheck_count: u32,

    /// Seconds between backstop re-reads
    #[arg(long, env = "DOMAINKEEPER_READY_RECHECK_INTERVAL_SECS", default_value_t = DEFAULT_READY_RECHECK_INTERVAL_SECS)]
    pub ready_recheck_interval_secs: u64,

    /// Seconds between recurring status recomputes of a running domain
    #[arg(long, env = "DOMAINKEEPER_STATUS_UPDATE_INTERVAL_SECS", default_value_t = DEFAULT_STATUS_UPDATE_INTERVAL_SECS)]
    pub status_update_interval_secs: u64,

    /// Seconds between full resource list passes
    #[arg(long, env = "DOMAINKEEPER_LIST_RESYNC_INTERVAL_SECS", default_value_t = DEFAULT_LIST_RESYNC_INTERVAL_SECS)]
    pub list_resync_interval_secs: u64,

    /// Address the metrics endpoint binds to
    #[arg(long, env = "DOMAINKEEPER_METRICS_ADDRESS", default_value = DEFAULT_METRICS_BIND_ADDRESS)]
    pub metrics_address: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespaces: vec![DEFAULT_NAMESPACE.to_string()],
            failure_retry_max_count: DEFAULT_FAILURE_RETRY_MAX_COUNT,
            ready_recheck_count: DEFAULT_READY_RECHECK_COUNT,
            ready_recheck_interval_secs: DEFAULT_READY_RECHECK_INTERVAL_SECS,
            status_update_interval_secs: DEFAULT_STATUS_UPDATE_INTERVAL_SECS,
            list_resync_interval_secs: DEFAULT_LIST_RESYNC_INTERVAL_SECS,
            metrics_address: DEFAULT_METRICS_BIND_ADDRESS.to_string(),
        }
    }
}

impl OperatorConfig {
    #[must_use]
    pub fn ready_recheck_interval(&self) -> Duration {
        Duration::from_secs(self.ready_recheck_interval_secs)
    }

    #[must_use]
    pub fn status_update_interval(&self) -> Duration {
        Duration::from_secs(self.status_update_interval_secs)
    }

    #[must_use]
    pub fn list_resync_interval(&self) -> Duration {
        Duration::from_secs(self.list_resync_interval_secs)
    }
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the domainkeeper operator.
//!
//! This module provides metrics collection with the namespace prefix
//! `domainkeeper_firestoned_io_` (prometheus-safe version of "domainkeeper.firestoned.io").
//!
//! # Metrics Categories
//!
//! - **Make-Right Metrics** - Operations started, skipped, interrupted and their duration
//! - **Status Metrics** - Status replace outcomes
//! - **Event Metrics** - Kubernetes events emitted per reason
//! - **Presence Metrics** - Size of the presence cache and list passes run
//! - **Error Metrics** - Errors by component
//!
//! # Example
//!
//! ```rust,no_run
//! use domainkeeper::metrics::record_make_right_completed;
//!
//! record_make_right_completed("domain", std::time::Duration::from_millis(250));
//! ```

use prometheus::core::Collector;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

/// Prefix of every metric name.
const METRICS_NAMESPACE: &str = "domainkeeper_firestoned_io";

/// Registry served on the metrics endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Registers `collector` and hands it back.
///
/// Metric names are static, so a failure here is a programming error.
fn registered<C: Collector + Clone + 'static>(collector: C) -> C {
    METRICS_REGISTRY
        .register(Box::new(collector.clone()))
        .expect("metric registered twice");
    collector
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let opts = Opts::new(format!("{METRICS_NAMESPACE}_{name}"), help);
    registered(CounterVec::new(opts, labels).expect("valid counter definition"))
}

// ----------------------------------------------------------------------------
// Make-right
// ----------------------------------------------------------------------------

/// Make-right operations by `kind` (`domain`, `cluster`) and `outcome`
/// (`started`, `completed`, `failed`, `skipped`, `queued`, `interrupted`, `dropped`).
pub static MAKE_RIGHT_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "make_right_operations_total",
        "Total number of make-right operations by target kind and outcome",
        &["kind", "outcome"],
    )
});

/// Seconds from the first to the last step of a make-right, by `kind`.
pub static MAKE_RIGHT_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_make_right_duration_seconds"),
        "Duration of make-right operations in seconds by target kind",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 300.0]);
    registered(HistogramVec::new(opts, &["kind"]).expect("valid histogram definition"))
});

// ----------------------------------------------------------------------------
// Status and events
// ----------------------------------------------------------------------------

/// Domain status update attempts by `outcome` (`written`, `unchanged`, `retried`, `failed`).
pub static STATUS_UPDATES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "status_updates_total",
        "Total number of domain status update attempts by outcome",
        &["outcome"],
    )
});

/// Events emitted by `reason`.
pub static EVENTS_EMITTED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "events_emitted_total",
        "Total number of Kubernetes events emitted by reason",
        &["reason"],
    )
});

// ----------------------------------------------------------------------------
// Presence
// ----------------------------------------------------------------------------

/// Presence cache entries by `namespace` and `kind`.
pub static PRESENCE_ENTRIES: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_presence_entries"),
        "Number of entries in the presence cache by namespace and kind",
    );
    registered(GaugeVec::new(opts, &["namespace", "kind"]).expect("valid gauge definition"))
});

pub static LIST_PASSES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "list_passes_total",
        "Total number of resource list passes completed by namespace",
        &["namespace"],
    )
});

/// Errors by `component` and `error_type`.
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "errors_total",
        "Total number of errors by component and error category",
        &["component", "error_type"],
    )
});

// ----------------------------------------------------------------------------
// Recording
// ----------------------------------------------------------------------------

/// Counts a make-right outcome that carries no duration.
pub fn record_make_right(kind: &str, outcome: &str) {
    MAKE_RIGHT_TOTAL.with_label_values(&[kind, outcome]).inc();
}

/// Records a make-right that ran all of its steps.
pub fn record_make_right_completed(kind: &str, duration: Duration) {
    record_make_right_finished(kind, "completed", duration);
}

/// Records a make-right that stopped on a step error.
pub fn record_make_right_failed(kind: &str, duration: Duration) {
    record_make_right_finished(kind, "failed", duration);
}

fn record_make_right_finished(kind: &str, outcome: &str, elapsed: Duration) {
    record_make_right(kind, outcome);
    MAKE_RIGHT_DURATION_SECONDS
        .with_label_values(&[kind])
        .observe(elapsed.as_secs_f64());
}

/// Record a status update outcome
pub fn record_status_update(outcome: &str) {
    STATUS_UPDATES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record an emitted event
pub fn record_event_emitted(reason: &str) {
    EVENTS_EMITTED_TOTAL.with_label_values(&[reason]).inc();
}

/// Record the current number of presence entries in a namespace
pub fn record_presence_entries(namespace: &str, kind: &str, count: usize) {
    #[allow(clippy::cast_precision_loss)]
    PRESENCE_ENTRIES
        .with_label_values(&[namespace, kind])
        .set(count as f64);
}

/// Record a completed list pass
pub fn record_list_pass(namespace: &str) {
    LIST_PASSES_TOTAL.with_label_values(&[namespace]).inc();
}

pub fn record_error(component: &str, error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[component, error_type]).inc();
}

/// Renders the registry in the Prometheus text exposition format.
///
/// # Errors
///
/// Returns an error if encoding fails or produces invalid UTF-8.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let mut rendered = Vec::new();
    TextEncoder::new().encode(&METRICS_REGISTRY.gather(), &mut rendered)?;
    String::from_utf8(rendered).map_err(|e| prometheus::Error::Msg(format!("metrics are not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_make_right_completed() {
        record_make_right_completed("test-kind", Duration::from_millis(500));

        assert!(MAKE_RIGHT_TOTAL.with_label_values(&["test-kind", "completed"]).get() >= 1.0);

        let histogram = MAKE_RIGHT_DURATION_SECONDS.with_label_values(&["test-kind"]);
        assert!(histogram.get_sample_count() > 0);
    }

    #[test]
    fn test_record_presence_entries_sets_gauge() {
        record_presence_entries("metrics-test", "domain", 3);
        let gauge = PRESENCE_ENTRIES.with_label_values(&["metrics-test", "domain"]);
        #[allow(clippy::float_cmp)]
        {
            assert_eq!(gauge.get(), 3.0);
        }
    }

    #[test]
    fn test_gather_metrics_renders_prefixed_names() {
        record_status_update("written");
        record_error("metrics_test", "recoverable");

        let rendered = gather_metrics().unwrap();
        assert!(rendered.contains("domainkeeper_firestoned_io_status_updates_total"));
        assert!(rendered.contains("component=\"metrics_test\""));
    }
}

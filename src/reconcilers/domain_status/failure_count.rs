// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Introspection failure counting.

#[allow(clippy::wildcard_imports)]
use super::types::*;
use super::events::is_fatal;
use crate::status_reasons::{retry_attempt_prefix, FATAL_ERROR_PREFIX, RETRIES_EXCEEDED_PREFIX};

/// Counts a failed introspection and prefixes the status message.
///
/// A job whose uid was already counted does not bump the count again. The
/// prefix is rebuilt from the `Failed` condition message each time, so it
/// never accumulates.
pub fn record_introspection_failure(
    status: &mut DomainStatus,
    job_uid: Option<&str>,
    failure_retry_max_count: i32,
) {
    let already_counted =
        job_uid.is_some() && status.failed_introspection_uid.as_deref() == job_uid;
    if !already_counted {
        status.introspect_job_failure_count = status.introspect_job_failure_count.saturating_add(1);
        status.failed_introspection_uid = job_uid.map(str::to_string);
    }

    let base = status
        .failure()
        .and_then(|f| f.message.clone())
        .unwrap_or_default();
    let attempt = retry_attempt_prefix(status.introspect_job_failure_count, failure_retry_max_count);
    let prefix = if is_fatal(status) {
        FATAL_ERROR_PREFIX.to_string()
    } else if status.introspect_job_failure_count >= failure_retry_max_count {
        format!("{RETRIES_EXCEEDED_PREFIX} {attempt}")
    } else {
        attempt
    };
    status.message = Some(format!("{prefix} {base}").trim_end().to_string());
}

/// Clears the failure count after a successful introspection.
pub fn reset_introspection_failures(status: &mut DomainStatus) {
    status.introspect_job_failure_count = 0;
    status.failed_introspection_uid = None;
}

/// Returns `true` once introspection must not be retried.
#[must_use]
pub fn retries_exhausted(status: &DomainStatus, failure_retry_max_count: i32) -> bool {
    is_fatal(status) || status.introspect_job_failure_count >= failure_retry_max_count
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Backoff schedules for store reads and domain status replaces.
//!
//! Reads retry transient failures (429, 5xx, transport) for a bounded time
//! and fail fast on anything else. Status replaces retry for as long as the
//! failure stays recoverable; the caller re-reads the domain between attempts.

use crate::api_errors::StoreError;
use crate::constants::STATUS_RETRY_PAUSE_MILLIS;
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Shape of a backoff schedule.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    pub first_pause: Duration,
    pub max_pause: Duration,
    /// Give up once this much time has passed; `None` never gives up.
    pub give_up_after: Option<Duration>,
    pub growth: f64,
    /// Fraction of each pause randomized in both directions.
    pub jitter: f64,
}

/// Schedule for list and get calls.
pub const READ_POLICY: BackoffPolicy = BackoffPolicy {
    first_pause: Duration::from_millis(100),
    max_pause: Duration::from_secs(30),
    give_up_after: Some(Duration::from_secs(300)),
    growth: 2.0,
    jitter: 0.1,
};

/// Schedule between domain status replace attempts.
pub const STATUS_REPLACE_POLICY: BackoffPolicy = BackoffPolicy {
    first_pause: Duration::from_millis(STATUS_RETRY_PAUSE_MILLIS),
    max_pause: Duration::from_secs(5),
    give_up_after: None,
    growth: 2.0,
    jitter: 0.1,
};

/// A running backoff schedule.
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    next_pause: Duration,
    started: Instant,
}

impl Backoff {
    #[must_use]
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            next_pause: policy.first_pause,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }

    /// The un-jittered pause the next call will be based on.
    #[must_use]
    pub fn upcoming_pause(&self) -> Duration {
        self.next_pause
    }

    /// Returns the next pause, or `None` once the schedule gave up.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self
            .policy
            .give_up_after
            .is_some_and(|limit| self.started.elapsed() >= limit)
        {
            return None;
        }

        let pause = self.next_pause;
        let grown = Duration::from_secs_f64(pause.as_secs_f64() * self.policy.growth);
        self.next_pause = grown.min(self.policy.max_pause);
        Some(jittered(pause, self.policy.jitter))
    }

    /// Starts over from the first pause.
    pub fn reset(&mut self) {
        self.next_pause = self.policy.first_pause;
        self.started = Instant::now();
    }
}

fn jittered(pause: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return pause;
    }
    let secs = pause.as_secs_f64();
    let spread = secs * jitter;
    let picked = rand::rng().random_range((secs - spread)..=(secs + spread));
    Duration::from_secs_f64(picked.max(0.0))
}

/// Backoff for list and get calls.
#[must_use]
pub fn read_backoff() -> Backoff {
    Backoff::new(READ_POLICY)
}

/// Backoff for domain status replaces; never gives up on its own.
#[must_use]
pub fn status_backoff() -> Backoff {
    Backoff::new(STATUS_REPLACE_POLICY)
}

/// Returns `true` if a read failing with `err` may succeed when repeated.
#[must_use]
pub fn is_transient(err: &StoreError) -> bool {
    match err {
        StoreError::Transport { .. } => true,
        StoreError::Api { code, .. } => *code == 429 || (500..600).contains(code),
        StoreError::Serialization { .. } => false,
    }
}

/// Runs a read against the API server, retrying transient failures.
///
/// `operation_name` names the call in logs and errors, e.g. "list pods in apps".
///
/// # Errors
///
/// Returns the failure as a [`StoreError`] when it is not transient or the
/// read schedule gives up.
pub async fn retry_api_call<T, F, Fut>(mut operation: F, operation_name: &str) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, kube::Error>>,
{
    let mut backoff = read_backoff();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "API call succeeded after retries");
                }
                return Ok(value);
            }
            Err(e) => StoreError::from_kube(operation_name, &e),
        };

        if !is_transient(&err) {
            debug!(operation = operation_name, error = %err, "API call failed permanently");
            return Err(err);
        }

        let Some(pause) = backoff.next_backoff() else {
            error!(operation = operation_name, attempt, error = %err, "Giving up on API call");
            return Err(err);
        };
        warn!(
            operation = operation_name,
            attempt,
            retry_after = ?pause,
            error = %err,
            "Transient API failure, retrying"
        );
        tokio::time::sleep(pause).await;
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;

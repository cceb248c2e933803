// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Events implied by a status transition.

#[allow(clippy::wildcard_imports)]
use super::types::*;
use crate::status_reasons::{is_fatal_message, retries_exceeded_message};

/// Events to emit when the status goes from `old` to `new`, ordered by item.
///
/// `failure_retry_max_count` decides when the introspection failure count
/// crosses into "retries exceeded".
#[must_use]
pub fn status_change_events(
    old: &DomainStatus,
    new: &DomainStatus,
    failure_retry_max_count: i32,
) -> Vec<EventData> {
    let mut events = Vec::new();

    if old.failure().is_some() && new.failure().is_none() {
        events.push(EventData::new(EventItem::DomainFailureResolved));
    }

    match (
        old.condition(DomainConditionType::Available).map(|c| c.status),
        new.condition(DomainConditionType::Available).map(|c| c.status),
    ) {
        (Some(ConditionStatus::True), Some(ConditionStatus::True)) => {}
        (_, Some(ConditionStatus::True)) => events.push(EventData::new(EventItem::DomainAvailable)),
        (Some(ConditionStatus::True), _) => events.push(EventData::new(EventItem::DomainUnavailable)),
        _ => {}
    }

    let was_completed = old.is_condition_true(DomainConditionType::Completed);
    let is_completed = new.is_condition_true(DomainConditionType::Completed);
    if !was_completed && is_completed {
        events.push(EventData::new(EventItem::DomainCompleted));
    } else if was_completed && !is_completed {
        events.push(EventData::new(EventItem::DomainIncomplete));
    }

    if let Some(failure) = new.failure() {
        if failure.reason == Some(DomainFailureReason::ReplicasTooHigh) && old.failure() != Some(failure) {
            let mut event = EventData::new(EventItem::DomainFailed)
                .with_failure_reason(DomainFailureReason::ReplicasTooHigh);
            if let Some(message) = &failure.message {
                event = event.with_message(message.clone());
            }
            events.push(event);
        }
    }

    if is_fatal(new) && !is_fatal(old) {
        let message = new
            .failure()
            .and_then(|f| f.message.clone())
            .unwrap_or_default();
        events.push(
            EventData::new(EventItem::DomainFailed)
                .with_message(message)
                .with_failure_reason(DomainFailureReason::Aborted),
        );
    } else if old.introspect_job_failure_count < failure_retry_max_count
        && new.introspect_job_failure_count >= failure_retry_max_count
    {
        events.push(
            EventData::new(EventItem::DomainFailed)
                .with_message(retries_exceeded_message(failure_retry_max_count))
                .with_failure_reason(DomainFailureReason::Aborted),
        );
    }

    events.sort_by_key(|e| e.item);
    events
}

/// Returns `true` if the status carries a failure that must not be retried.
#[must_use]
pub fn is_fatal(status: &DomainStatus) -> bool {
    status.failure().is_some_and(|failure| {
        failure.severity == Some(FailureSeverity::Fatal)
            || failure.message.as_deref().is_some_and(is_fatal_message)
    })
}

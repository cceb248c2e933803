// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `conditions.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{
        ConditionStatus, DomainCondition, DomainConditionType, DomainFailureReason, DomainStatus,
        FailureSeverity,
    };

    fn condition(r#type: DomainConditionType, status: ConditionStatus, time: &str) -> DomainCondition {
        DomainCondition {
            r#type,
            status,
            reason: None,
            message: None,
            severity: None,
            last_transition_time: Some(time.to_string()),
        }
    }

    #[test]
    fn test_add_condition_keeps_one_per_type_in_order() {
        let mut status = DomainStatus::default();
        status.set_condition(DomainConditionType::Completed, false);
        status.set_condition(DomainConditionType::Available, true);
        status.set_condition(DomainConditionType::Completed, true);

        let types: Vec<_> = status.conditions.iter().map(|c| c.r#type).collect();
        assert_eq!(
            types,
            vec![DomainConditionType::Available, DomainConditionType::Completed]
        );
        assert!(status.is_condition_true(DomainConditionType::Completed));
    }

    #[test]
    fn test_unchanged_status_keeps_transition_time() {
        let mut status = DomainStatus {
            conditions: vec![condition(
                DomainConditionType::Available,
                ConditionStatus::True,
                "2025-01-01T00:00:00+00:00",
            )],
            ..DomainStatus::default()
        };

        status.add_condition(DomainCondition {
            message: Some("still up".to_string()),
            last_transition_time: None,
            ..condition(DomainConditionType::Available, ConditionStatus::True, "")
        });

        let available = status.condition(DomainConditionType::Available).unwrap();
        assert_eq!(available.message.as_deref(), Some("still up"));
        assert_eq!(
            available.last_transition_time.as_deref(),
            Some("2025-01-01T00:00:00+00:00")
        );
    }

    #[test]
    fn test_flipped_status_gets_new_transition_time() {
        let mut status = DomainStatus {
            conditions: vec![condition(
                DomainConditionType::Available,
                ConditionStatus::True,
                "2025-01-01T00:00:00+00:00",
            )],
            ..DomainStatus::default()
        };

        status.set_condition(DomainConditionType::Available, false);

        let available = status.condition(DomainConditionType::Available).unwrap();
        assert_eq!(available.status, ConditionStatus::False);
        assert_ne!(
            available.last_transition_time.as_deref(),
            Some("2025-01-01T00:00:00+00:00")
        );
    }

    #[test]
    fn test_add_failure_sets_message_and_reason() {
        let mut status = DomainStatus::default();
        status.add_failure(
            DomainFailureReason::ServerPod,
            "Server pods failed: ms-1",
            Some(FailureSeverity::Severe),
        );

        assert!(status.has_failure_reason(DomainFailureReason::ServerPod));
        assert_eq!(status.message.as_deref(), Some("Server pods failed: ms-1"));
        assert_eq!(status.reason, Some(DomainFailureReason::ServerPod));
    }

    #[test]
    fn test_repeated_failure_leaves_prefixed_message_alone() {
        let mut status = DomainStatus::default();
        status.add_failure(DomainFailureReason::Introspection, "job failed", None);
        status.message = Some("Introspection attempt 1 of 5 failed. job failed".to_string());

        status.add_failure(DomainFailureReason::Introspection, "job failed", None);

        assert_eq!(
            status.message.as_deref(),
            Some("Introspection attempt 1 of 5 failed. job failed")
        );
    }

    #[test]
    fn test_failure_replaces_previous_failure() {
        let mut status = DomainStatus::default();
        status.add_failure(DomainFailureReason::Introspection, "job failed", None);
        status.add_failure(DomainFailureReason::ReplicasTooHigh, "too many", None);

        let failures: Vec<_> = status
            .conditions
            .iter()
            .filter(|c| c.r#type == DomainConditionType::Failed)
            .collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].reason, Some(DomainFailureReason::ReplicasTooHigh));
    }

    #[test]
    fn test_remove_failures_with_reason_only_matches_reason() {
        let mut status = DomainStatus::default();
        status.add_failure(DomainFailureReason::Introspection, "job failed", None);

        status.remove_failures_with_reason(DomainFailureReason::ServerPod);
        assert!(status.failure().is_some());
        assert!(status.message.is_some());

        status.remove_failures_with_reason(DomainFailureReason::Introspection);
        assert!(status.failure().is_none());
        assert!(status.message.is_none());
        assert!(status.reason.is_none());
    }

    #[test]
    fn test_strip_obsolete_conditions_drops_progressing() {
        let mut status = DomainStatus {
            conditions: vec![
                condition(DomainConditionType::Available, ConditionStatus::True, "t"),
                condition(DomainConditionType::Progressing, ConditionStatus::True, "t"),
            ],
            ..DomainStatus::default()
        };

        status.strip_obsolete_conditions();

        assert!(!status.has_condition(DomainConditionType::Progressing));
        assert!(status.has_condition(DomainConditionType::Available));
    }
}

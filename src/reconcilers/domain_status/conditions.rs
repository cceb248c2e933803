// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Condition bookkeeping on [`DomainStatus`].
//!
//! All mutations keep at most one condition per type, ordered by type, and
//! keep the previous `lastTransitionTime` when a condition's status does not
//! change.

#[allow(clippy::wildcard_imports)]
use super::types::*;
use chrono::Utc;

impl DomainStatus {
    /// The condition of `condition_type`, if present.
    #[must_use]
    pub fn condition(&self, condition_type: DomainConditionType) -> Option<&DomainCondition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }

    #[must_use]
    pub fn has_condition(&self, condition_type: DomainConditionType) -> bool {
        self.condition(condition_type).is_some()
    }

    /// Returns `true` if the condition is present with status `True`.
    #[must_use]
    pub fn is_condition_true(&self, condition_type: DomainConditionType) -> bool {
        self.condition(condition_type)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// The `Failed` condition, if present.
    #[must_use]
    pub fn failure(&self) -> Option<&DomainCondition> {
        self.condition(DomainConditionType::Failed)
    }

    #[must_use]
    pub fn has_failure_reason(&self, reason: DomainFailureReason) -> bool {
        self.failure().is_some_and(|c| c.reason == Some(reason))
    }

    /// Drops conditions of types that are no longer produced.
    pub fn strip_obsolete_conditions(&mut self) {
        self.conditions
            .retain(|c| c.r#type != DomainConditionType::Progressing);
    }

    /// Inserts or replaces the condition of the same type.
    pub fn add_condition(&mut self, mut condition: DomainCondition) {
        let previous = self
            .conditions
            .iter()
            .position(|c| c.r#type == condition.r#type)
            .map(|i| self.conditions.remove(i));

        condition.last_transition_time = match previous {
            Some(prev) if prev.status == condition.status && prev.last_transition_time.is_some() => {
                prev.last_transition_time
            }
            _ => condition
                .last_transition_time
                .or_else(|| Some(Utc::now().to_rfc3339())),
        };

        self.conditions.push(condition);
        self.conditions.sort_by_key(|c| c.r#type);
    }

    /// Sets a plain `True`/`False` condition without reason or message.
    pub fn set_condition(&mut self, condition_type: DomainConditionType, value: bool) {
        self.set_condition_with_message(condition_type, value, None);
    }

    pub fn set_condition_with_message(
        &mut self,
        condition_type: DomainConditionType,
        value: bool,
        message: Option<String>,
    ) {
        let condition = DomainCondition {
            r#type: condition_type,
            status: value.into(),
            reason: None,
            message,
            severity: None,
            last_transition_time: None,
        };
        if self.condition(condition_type) != Some(&condition) {
            self.add_condition(condition);
        }
    }

    /// Records a failure as the single `Failed` condition.
    ///
    /// The status message and reason follow the failure only when the
    /// condition actually changes, so prefixes written by failure counting
    /// survive repeated recomputes.
    pub fn add_failure(
        &mut self,
        reason: DomainFailureReason,
        message: impl Into<String>,
        severity: Option<FailureSeverity>,
    ) {
        let message = message.into();
        let condition = DomainCondition {
            r#type: DomainConditionType::Failed,
            status: ConditionStatus::True,
            reason: Some(reason),
            message: Some(message.clone()),
            severity,
            last_transition_time: None,
        };
        if self.failure() == Some(&condition) {
            return;
        }
        self.message = Some(message);
        self.reason = Some(reason);
        self.add_condition(condition);
    }

    /// Removes every condition of a type. Removing `Failed` also clears the
    /// failure message and reason.
    pub fn remove_conditions_of_type(&mut self, condition_type: DomainConditionType) {
        let before = self.conditions.len();
        self.conditions.retain(|c| c.r#type != condition_type);
        if condition_type == DomainConditionType::Failed && self.conditions.len() != before {
            self.message = None;
            self.reason = None;
        }
    }

    /// Removes the `Failed` condition only if it carries `reason`.
    pub fn remove_failures_with_reason(&mut self, reason: DomainFailureReason) {
        if self.has_failure_reason(reason) {
            self.remove_conditions_of_type(DomainConditionType::Failed);
        }
    }
}

#[cfg(test)]
#[path = "conditions_tests.rs"]
mod conditions_tests;

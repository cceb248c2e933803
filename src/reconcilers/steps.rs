// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Step composition for make-right operations.
//!
//! A make-right plan is an ordered list of [`Step`]s run by [`run_steps`]
//! against one [`Packet`]. A step either continues to the next one, stops the
//! plan, or suspends it on a `oneshot` channel until a watch callback or a
//! backstop read resumes it.

use crate::crd::{DomainFailureReason, FailureSeverity};
use crate::presence::DomainPresenceInfo;
use crate::topology::ReconcileInputs;
use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// A failure raised while running a plan, recorded on the domain status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepFailure {
    pub reason: DomainFailureReason,
    pub message: String,
    pub severity: Option<FailureSeverity>,
    /// Uid of the introspector job that failed, used to count each job once.
    pub job_uid: Option<String>,
}

impl StepFailure {
    #[must_use]
    pub fn new(reason: DomainFailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            severity: None,
            job_uid: None,
        }
    }

    #[must_use]
    pub fn with_severity(mut self, severity: FailureSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    #[must_use]
    pub fn with_job_uid(mut self, job_uid: Option<String>) -> Self {
        self.job_uid = job_uid;
        self
    }
}

/// State shared by the steps of one plan.
pub struct Packet {
    pub info: Arc<DomainPresenceInfo>,
    pub inputs: ReconcileInputs,
    /// Set when a wait ends with a failure for a later step to record.
    pub failure: Option<StepFailure>,
    /// The introspector job pod once it finished successfully.
    pub job_pod: Option<Pod>,
}

impl Packet {
    #[must_use]
    pub fn new(info: Arc<DomainPresenceInfo>) -> Self {
        Self {
            info,
            inputs: ReconcileInputs::default(),
            failure: None,
            job_pod: None,
        }
    }
}

/// Deferred packet mutation delivered with a resumption.
pub type PacketUpdate = Box<dyn FnOnce(&mut Packet) + Send>;

/// How a suspended plan continues.
pub enum Resumption {
    /// Continue with the next step, applying the update first.
    Proceed(Option<PacketUpdate>),
    /// End the wait with a failure; later steps see it in [`Packet::failure`].
    Terminate(StepFailure),
}

/// What the driver does after a step.
pub enum StepResult {
    Continue,
    Suspend(oneshot::Receiver<Resumption>),
    Stop,
}

/// How a plan ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanOutcome {
    Completed,
    Stopped,
    /// A suspension channel closed without a resumption.
    Abandoned,
}

/// One unit of a make-right plan.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs the step.
    ///
    /// # Errors
    ///
    /// Returns an error if the step cannot complete; the driver stops the plan.
    async fn apply(&self, packet: &mut Packet) -> Result<StepResult>;
}

/// Runs `steps` in order against `packet`.
///
/// # Errors
///
/// Returns the first step error.
pub async fn run_steps(steps: &[Box<dyn Step>], packet: &mut Packet) -> Result<PlanOutcome> {
    for step in steps {
        debug!(
            namespace = %packet.info.namespace(),
            domain_uid = %packet.info.domain_uid(),
            step = step.name(),
            "Running step"
        );
        match step.apply(packet).await? {
            StepResult::Continue => {}
            StepResult::Stop => return Ok(PlanOutcome::Stopped),
            StepResult::Suspend(receiver) => match receiver.await {
                Ok(Resumption::Proceed(update)) => {
                    if let Some(update) = update {
                        update(packet);
                    }
                }
                Ok(Resumption::Terminate(failure)) => packet.failure = Some(failure),
                Err(_) => {
                    debug!(
                        namespace = %packet.info.namespace(),
                        domain_uid = %packet.info.domain_uid(),
                        step = step.name(),
                        "Suspended step abandoned"
                    );
                    return Ok(PlanOutcome::Abandoned);
                }
            },
        }
    }
    Ok(PlanOutcome::Completed)
}

#[cfg(test)]
#[path = "steps_tests.rs"]
mod steps_tests;

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Steps of domain and cluster make-right plans.
//!
//! A domain plan is:
//!
//! 1. Emit the operation's event, if any
//! 2. Deletion: stop status timers and unregister, then stop
//! 3. Otherwise register the presence info and gather reconcile inputs
//! 4. Decide which servers to start
//! 5. Wait for a running introspector job
//! 6. Record the job's failure (and stop) or its success
//! 7. Recompute and persist the status
//! 8. Schedule recurring status updates
//!
//! A cluster plan emits its event, registers or unregisters the cluster
//! presence and then makes the referencing domain right, as an explicit
//! recheck when the cluster operation carries an event.

use super::{should_continue, MakeRightClusterOperation, MakeRightDomainOperation, MakeRightExecutor};
use crate::constants::{DEFAULT_REPLICAS, SERVER_STATE_RUNNING};
use crate::context::Context;
use crate::crd::{Cluster, Domain, DomainFailureReason, DomainStatus, FailureSeverity, ServerStartPolicy};
use crate::events::EventData;
use crate::metrics;
use crate::presence::{ClusterPresenceInfo, DomainPresenceInfo, ServerStartupInfo};
use crate::reconcilers::domain_status::{
    record_introspection_failure, recompute_domain_status, reset_introspection_failures,
    update_domain_status,
};
use crate::reconcilers::steps::{Packet, Step, StepFailure, StepResult};
use crate::reconcilers::wait_for_ready::{ForceMakeRight, IntrospectorJobCheck, WaitForReadyStep};
use crate::topology::DomainTopology;
use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds the steps of a domain operation.
#[must_use]
pub fn domain_plan(
    ctx: &Arc<Context>,
    executor: &Arc<dyn MakeRightExecutor>,
    op: &MakeRightDomainOperation,
) -> Vec<Box<dyn Step>> {
    let mut steps: Vec<Box<dyn Step>> = Vec::new();

    if let Some(event) = &op.event {
        let event = event
            .clone()
            .with_resource(op.info.namespace(), &op.info.domain_name())
            .with_domain_uid(op.info.domain_uid());
        steps.push(Box::new(EmitEventStep {
            ctx: Arc::clone(ctx),
            event,
        }));
    }

    if op.deletion {
        steps.push(Box::new(DeleteDomainStep {
            executor: Arc::clone(executor),
        }));
        return steps;
    }

    steps.push(Box::new(RegisterDomainStep {
        executor: Arc::clone(executor),
    }));
    steps.push(Box::new(GatherInputsStep { ctx: Arc::clone(ctx) }));
    steps.push(Box::new(ServerStartupStep));
    steps.push(Box::new(WaitForReadyStep::<Pod, _>::new(
        Arc::clone(ctx),
        IntrospectorJobCheck,
        force_make_right(executor, &op.info),
    )));
    steps.push(Box::new(JobOutcomeStep { ctx: Arc::clone(ctx) }));
    steps.push(Box::new(StatusUpdateStep { ctx: Arc::clone(ctx) }));
    steps.push(Box::new(ScheduleStatusUpdatesStep {
        executor: Arc::clone(executor),
    }));
    steps
}

/// Builds the steps of a cluster operation.
#[must_use]
pub fn cluster_plan(
    ctx: &Arc<Context>,
    executor: &Arc<dyn MakeRightExecutor>,
    op: &MakeRightClusterOperation,
) -> Vec<Box<dyn Step>> {
    let mut steps: Vec<Box<dyn Step>> = Vec::new();

    if let Some(event) = &op.event {
        let mut event = event
            .clone()
            .with_resource(op.cluster.namespace(), op.cluster.resource_name());
        if let Some(domain) = &op.domain {
            event = event.with_domain_uid(domain.domain_uid());
        }
        steps.push(Box::new(EmitEventStep {
            ctx: Arc::clone(ctx),
            event,
        }));
    }

    steps.push(Box::new(ClusterPresenceStep {
        ctx: Arc::clone(ctx),
        cluster: Arc::clone(&op.cluster),
        deletion: op.deletion,
    }));

    if let Some(domain) = &op.domain {
        steps.push(Box::new(RecheckDomainStep {
            executor: Arc::clone(executor),
            domain: Arc::clone(domain),
            explicit: op.event.is_some(),
        }));
    }
    steps
}

fn force_make_right(executor: &Arc<dyn MakeRightExecutor>, info: &Arc<DomainPresenceInfo>) -> ForceMakeRight {
    let executor = Arc::downgrade(executor);
    let info = Arc::clone(info);
    Arc::new(move || {
        if let Some(executor) = executor.upgrade() {
            let op = MakeRightDomainOperation::new(Arc::clone(&info)).with_explicit_recheck();
            let proceed = should_continue(&op);
            executor.run_make_right_domain(op, proceed);
        }
    })
}

/// Writes a failure onto `status`, counting introspection and API failures.
pub fn apply_failure(status: &mut DomainStatus, failure: &StepFailure, failure_retry_max_count: i32) {
    status.add_failure(failure.reason, failure.message.clone(), failure.severity);
    if matches!(
        failure.reason,
        DomainFailureReason::Introspection | DomainFailureReason::Kubernetes
    ) {
        record_introspection_failure(status, failure.job_uid.as_deref(), failure_retry_max_count);
    }
}

/// Records a failed plan on the domain status. Failures to do so are logged.
pub async fn record_plan_failure(ctx: &Context, info: &DomainPresenceInfo, error: &anyhow::Error) {
    let failure = StepFailure::new(DomainFailureReason::Kubernetes, error.to_string())
        .with_severity(FailureSeverity::Severe);
    let max = ctx.config.failure_retry_max_count;
    if let Err(e) = update_domain_status(ctx, info, |_, status| apply_failure(status, &failure, max)).await {
        warn!(
            namespace = %info.namespace(),
            domain_uid = %info.domain_uid(),
            error = %e,
            "Failed to record make-right failure on domain status"
        );
    }
}

/// Servers to start for `domain`, in topology order.
///
/// The administration server runs unless the policy is `Never`. Standalone
/// servers and cluster members run only under `IfNeeded`; each cluster starts
/// its first `replicas` members.
#[must_use]
pub fn desired_servers(
    domain: &Domain,
    topology: &DomainTopology,
    clusters: &BTreeMap<String, Arc<Cluster>>,
) -> (Option<String>, Vec<ServerStartupInfo>) {
    let policy = domain.spec.start_policy();
    let admin = (policy != ServerStartPolicy::Never).then(|| topology.admin_server_name.clone());
    if policy != ServerStartPolicy::IfNeeded {
        return (admin, Vec::new());
    }

    let running = |server_name: &str, cluster_name: Option<&str>| ServerStartupInfo {
        server_name: server_name.to_string(),
        cluster_name: cluster_name.map(str::to_string),
        desired_state: SERVER_STATE_RUNNING.to_string(),
    };

    let mut startup: Vec<ServerStartupInfo> = topology
        .servers
        .iter()
        .filter(|name| {
            !domain
                .spec
                .managed_servers
                .iter()
                .any(|s| &s.server_name == *name && s.server_start_policy == Some(ServerStartPolicy::Never))
        })
        .map(|name| running(name, None))
        .collect();

    for cluster in &topology.clusters {
        let replicas = clusters
            .values()
            .find(|c| c.spec.cluster_name == cluster.name)
            .and_then(|c| c.spec.replicas)
            .or(domain.spec.replicas)
            .unwrap_or(DEFAULT_REPLICAS);
        let count = usize::try_from(replicas.max(0)).unwrap_or_default();
        startup.extend(
            cluster
                .servers
                .iter()
                .take(count)
                .map(|name| running(name, Some(&cluster.name))),
        );
    }

    (admin, startup)
}

// ============================================================================
// Steps
// ============================================================================

struct EmitEventStep {
    ctx: Arc<Context>,
    event: EventData,
}

#[async_trait]
impl Step for EmitEventStep {
    fn name(&self) -> &'static str {
        "emit_event"
    }

    async fn apply(&self, _packet: &mut Packet) -> Result<StepResult> {
        match self.ctx.events.emit(&self.event).await {
            Ok(()) => metrics::record_event_emitted(self.event.item.reason()),
            Err(e) => {
                warn!(
                    reason = self.event.item.reason(),
                    resource = ?self.event.resource_name,
                    error = %e,
                    "Failed to emit event"
                );
                metrics::record_error("events", "emit");
            }
        }
        Ok(StepResult::Continue)
    }
}

struct DeleteDomainStep {
    executor: Arc<dyn MakeRightExecutor>,
}

#[async_trait]
impl Step for DeleteDomainStep {
    fn name(&self) -> &'static str {
        "delete_domain"
    }

    async fn apply(&self, packet: &mut Packet) -> Result<StepResult> {
        info!(
            namespace = %packet.info.namespace(),
            domain_uid = %packet.info.domain_uid(),
            "Domain deleted; releasing presence"
        );
        self.executor.end_scheduled_domain_status_updates(&packet.info);
        self.executor.unregister_domain_presence_info(&packet.info);
        packet.info.clear_server_startup_info();
        Ok(StepResult::Stop)
    }
}

struct RegisterDomainStep {
    executor: Arc<dyn MakeRightExecutor>,
}

#[async_trait]
impl Step for RegisterDomainStep {
    fn name(&self) -> &'static str {
        "register_domain"
    }

    async fn apply(&self, packet: &mut Packet) -> Result<StepResult> {
        if packet.info.domain().is_none() {
            debug!(
                namespace = %packet.info.namespace(),
                domain_uid = %packet.info.domain_uid(),
                "Domain no longer cached; nothing to make right"
            );
            return Ok(StepResult::Stop);
        }
        self.executor
            .register_domain_presence_info(Arc::clone(&packet.info));
        Ok(StepResult::Continue)
    }
}

struct GatherInputsStep {
    ctx: Arc<Context>,
}

#[async_trait]
impl Step for GatherInputsStep {
    fn name(&self) -> &'static str {
        "gather_inputs"
    }

    async fn apply(&self, packet: &mut Packet) -> Result<StepResult> {
        packet.inputs = self.ctx.topology.inputs(&packet.info).await?;
        Ok(StepResult::Continue)
    }
}

struct ServerStartupStep;

#[async_trait]
impl Step for ServerStartupStep {
    fn name(&self) -> &'static str {
        "server_startup"
    }

    async fn apply(&self, packet: &mut Packet) -> Result<StepResult> {
        match (packet.info.domain(), packet.inputs.topology.as_ref()) {
            (Some(domain), Some(topology)) => {
                let (admin, startup) = desired_servers(&domain, topology, &packet.info.clusters());
                packet.info.set_server_startup_info(admin, startup);
            }
            _ => packet.info.clear_server_startup_info(),
        }
        Ok(StepResult::Continue)
    }
}

struct JobOutcomeStep {
    ctx: Arc<Context>,
}

#[async_trait]
impl Step for JobOutcomeStep {
    fn name(&self) -> &'static str {
        "job_outcome"
    }

    async fn apply(&self, packet: &mut Packet) -> Result<StepResult> {
        let max = self.ctx.config.failure_retry_max_count;

        if let Some(failure) = packet.failure.clone() {
            warn!(
                namespace = %packet.info.namespace(),
                domain_uid = %packet.info.domain_uid(),
                reason = ?failure.reason,
                message = %failure.message,
                "Introspection failed"
            );
            update_domain_status(&self.ctx, &packet.info, |_, status| {
                apply_failure(status, &failure, max);
            })
            .await?;
            return Ok(StepResult::Stop);
        }

        if packet.job_pod.is_some() {
            update_domain_status(&self.ctx, &packet.info, |_, status| {
                reset_introspection_failures(status);
                status.remove_failures_with_reason(DomainFailureReason::Introspection);
            })
            .await?;
        }
        Ok(StepResult::Continue)
    }
}

struct StatusUpdateStep {
    ctx: Arc<Context>,
}

#[async_trait]
impl Step for StatusUpdateStep {
    fn name(&self) -> &'static str {
        "status_update"
    }

    async fn apply(&self, packet: &mut Packet) -> Result<StepResult> {
        if packet.job_pod.is_some() {
            packet.inputs = self.ctx.topology.inputs(&packet.info).await?;
        }
        recompute_domain_status(&self.ctx, &packet.info, &packet.inputs).await?;
        packet.info.mark_generation_processed();
        Ok(StepResult::Continue)
    }
}

struct ScheduleStatusUpdatesStep {
    executor: Arc<dyn MakeRightExecutor>,
}

#[async_trait]
impl Step for ScheduleStatusUpdatesStep {
    fn name(&self) -> &'static str {
        "schedule_status_updates"
    }

    async fn apply(&self, packet: &mut Packet) -> Result<StepResult> {
        self.executor
            .schedule_domain_status_updates(Arc::clone(&packet.info));
        Ok(StepResult::Continue)
    }
}

struct ClusterPresenceStep {
    ctx: Arc<Context>,
    cluster: Arc<ClusterPresenceInfo>,
    deletion: bool,
}

#[async_trait]
impl Step for ClusterPresenceStep {
    fn name(&self) -> &'static str {
        "cluster_presence"
    }

    async fn apply(&self, _packet: &mut Packet) -> Result<StepResult> {
        if self.deletion {
            self.ctx
                .presence
                .unregister_cluster(self.cluster.namespace(), self.cluster.resource_name());
        } else {
            self.ctx.presence.register_cluster(Arc::clone(&self.cluster));
        }
        Ok(StepResult::Continue)
    }
}

/// Makes the referencing domain right. Only a created, changed or deleted
/// cluster forces it past the generation check.
struct RecheckDomainStep {
    executor: Arc<dyn MakeRightExecutor>,
    domain: Arc<DomainPresenceInfo>,
    explicit: bool,
}

#[async_trait]
impl Step for RecheckDomainStep {
    fn name(&self) -> &'static str {
        "recheck_domain"
    }

    async fn apply(&self, _packet: &mut Packet) -> Result<StepResult> {
        if self.domain.is_deleting() || self.domain.domain().is_none() {
            return Ok(StepResult::Continue);
        }
        let mut op = MakeRightDomainOperation::new(Arc::clone(&self.domain));
        if self.explicit {
            op = op.with_explicit_recheck();
        }
        let proceed = should_continue(&op);
        self.executor.run_make_right_domain(op, proceed);
        Ok(StepResult::Continue)
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod plan_tests;

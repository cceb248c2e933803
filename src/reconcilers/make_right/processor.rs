// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tokio-backed make-right executor.
//!
//! Every operation runs as a spawned task keyed by its [`OperationKey`]. While
//! a key is busy, later operations wait in a single-entry queue (the newest
//! replaces the older) unless they interrupt, in which case the running task is
//! aborted and the new operation starts at once.

use super::plan::{self, apply_failure, record_plan_failure};
use super::{
    MakeRightClusterOperation, MakeRightDomainOperation, MakeRightExecutor, OperationKey, ShouldProceed,
};
use crate::context::Context;
use crate::metrics;
use crate::presence::DomainPresenceInfo;
use crate::reconcilers::domain_status::{recompute_domain_status, update_domain_status};
use crate::reconcilers::steps::{run_steps, Packet, PlanOutcome};
use crate::reconcilers::wait_for_ready::{IntrospectorJobCheck, ReadyCheck};
use k8s_openapi::api::core::v1::Pod;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

enum QueuedOp {
    Domain(MakeRightDomainOperation, ShouldProceed),
    Cluster(MakeRightClusterOperation),
}

impl QueuedOp {
    fn kind(&self) -> &'static str {
        match self {
            QueuedOp::Domain(..) => "domain",
            QueuedOp::Cluster(..) => "cluster",
        }
    }
}

/// The active task of a key and the operation waiting behind it.
struct Slot {
    token: u64,
    handle: Option<JoinHandle<()>>,
    queued: Option<QueuedOp>,
}

type TimerKey = (String, String);

/// Runs make-right operations and per-domain status timers.
pub struct DomainProcessor {
    ctx: Arc<Context>,
    me: Weak<DomainProcessor>,
    in_flight: Mutex<HashMap<OperationKey, Slot>>,
    status_timers: Mutex<HashMap<TimerKey, JoinHandle<()>>>,
    next_token: AtomicU64,
}

impl DomainProcessor {
    #[must_use]
    pub fn new(ctx: Arc<Context>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            ctx,
            me: me.clone(),
            in_flight: Mutex::new(HashMap::new()),
            status_timers: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        })
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<OperationKey, Slot>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status_timers(&self) -> MutexGuard<'_, HashMap<TimerKey, JoinHandle<()>>> {
        self.status_timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of keys with a running operation.
    #[must_use]
    pub fn active_operations(&self) -> usize {
        self.in_flight().len()
    }

    /// Returns `true` while a status timer runs for the domain.
    #[must_use]
    pub fn has_status_timer(&self, namespace: &str, domain_uid: &str) -> bool {
        self.status_timers()
            .get(&(namespace.to_string(), domain_uid.to_string()))
            .is_some_and(|handle| !handle.is_finished())
    }

    fn submit(&self, key: OperationKey, op: QueuedOp, interrupt: bool) {
        let kind = op.kind();
        let mut in_flight = self.in_flight();

        match in_flight.get_mut(&key) {
            Some(slot) if interrupt => {
                if let Some(handle) = slot.handle.take() {
                    handle.abort();
                }
                info!(key = %key, "Interrupting running make-right");
                metrics::record_make_right(kind, "interrupted");
                let token = self.next_token.fetch_add(1, Ordering::SeqCst);
                slot.token = token;
                slot.queued = None;
                slot.handle = self.spawn(key.clone(), token, op);
            }
            Some(slot) => {
                if slot.queued.replace(op).is_some() {
                    debug!(key = %key, "Replaced queued make-right with a newer one");
                }
                metrics::record_make_right(kind, "queued");
            }
            None => {
                let token = self.next_token.fetch_add(1, Ordering::SeqCst);
                let handle = self.spawn(key.clone(), token, op);
                in_flight.insert(
                    key,
                    Slot {
                        token,
                        handle,
                        queued: None,
                    },
                );
            }
        }
    }

    /// Spawns `op`. Callers hold the in-flight lock, so the task cannot
    /// finish before its slot is recorded.
    fn spawn(&self, key: OperationKey, token: u64, op: QueuedOp) -> Option<JoinHandle<()>> {
        let this = self.me.upgrade()?;
        metrics::record_make_right(op.kind(), "started");
        Some(tokio::spawn(async move {
            match op {
                QueuedOp::Domain(op, should_proceed) => {
                    Arc::clone(&this).execute_domain(op, should_proceed).await;
                }
                QueuedOp::Cluster(op) => Arc::clone(&this).execute_cluster(op).await,
            }
            this.finish(&key, token);
        }))
    }

    /// Releases the key, or starts the operation queued behind it.
    fn finish(&self, key: &OperationKey, token: u64) {
        let mut in_flight = self.in_flight();
        let Some(slot) = in_flight.get_mut(key) else {
            return;
        };
        if slot.token != token {
            return;
        }
        match slot.queued.take() {
            Some(next) => {
                let token = self.next_token.fetch_add(1, Ordering::SeqCst);
                slot.token = token;
                slot.handle = self.spawn(key.clone(), token, next);
                if slot.handle.is_none() {
                    in_flight.remove(key);
                }
            }
            None => {
                in_flight.remove(key);
            }
        }
    }

    async fn execute_domain(self: Arc<Self>, op: MakeRightDomainOperation, should_proceed: ShouldProceed) {
        let started = Instant::now();
        let key = op.key();

        if op.info.is_deleting() && !op.deletion {
            debug!(key = %key, "Domain is being deleted; dropping make-right");
            metrics::record_make_right("domain", "dropped");
            return;
        }

        let cached = self
            .ctx
            .presence
            .domain(op.info.namespace(), op.info.domain_uid())
            .unwrap_or_else(|| Arc::clone(&op.info));
        if !should_proceed(&cached) {
            debug!(key = %key, "Make-right not needed");
            metrics::record_make_right("domain", "skipped");
            return;
        }

        debug!(key = %key, operation = ?op, "Running make-right");
        let executor: Arc<dyn MakeRightExecutor> = Arc::clone(&self) as Arc<dyn MakeRightExecutor>;
        let steps = plan::domain_plan(&self.ctx, &executor, &op);
        let mut packet = Packet::new(Arc::clone(&op.info));

        match run_steps(&steps, &mut packet).await {
            Ok(outcome) => {
                metrics::record_make_right("domain", outcome_label(outcome));
                metrics::record_make_right_completed("domain", started.elapsed());
            }
            Err(e) => {
                error!(key = %key, error = %e, "Make-right failed");
                metrics::record_make_right_failed("domain", started.elapsed());
                record_plan_failure(&self.ctx, &op.info, &e).await;
            }
        }
    }

    async fn execute_cluster(self: Arc<Self>, op: MakeRightClusterOperation) {
        let started = Instant::now();
        let key = op.key();
        debug!(key = %key, operation = ?op, "Running cluster make-right");

        let executor: Arc<dyn MakeRightExecutor> = Arc::clone(&self) as Arc<dyn MakeRightExecutor>;
        let steps = plan::cluster_plan(&self.ctx, &executor, &op);
        let info = op
            .domain
            .clone()
            .unwrap_or_else(|| Arc::new(DomainPresenceInfo::new(op.cluster.namespace(), "")));
        let mut packet = Packet::new(info);

        match run_steps(&steps, &mut packet).await {
            Ok(outcome) => {
                metrics::record_make_right("cluster", outcome_label(outcome));
                metrics::record_make_right_completed("cluster", started.elapsed());
            }
            Err(e) => {
                error!(key = %key, error = %e, "Cluster make-right failed");
                metrics::record_make_right_failed("cluster", started.elapsed());
            }
        }
    }
}

fn outcome_label(outcome: PlanOutcome) -> &'static str {
    match outcome {
        PlanOutcome::Completed => "completed",
        PlanOutcome::Stopped => "stopped",
        PlanOutcome::Abandoned => "abandoned",
    }
}

/// Recomputes the status from freshly gathered inputs. Failures are logged.
async fn refresh_status(ctx: &Context, info: &DomainPresenceInfo) {
    let inputs = match ctx.topology.inputs(info).await {
        Ok(inputs) => inputs,
        Err(e) => {
            warn!(
                namespace = %info.namespace(),
                domain_uid = %info.domain_uid(),
                error = %e,
                "Failed to gather status inputs"
            );
            metrics::record_error("status_timer", "inputs");
            return;
        }
    };
    if let Err(e) = recompute_domain_status(ctx, info, &inputs).await {
        warn!(
            namespace = %info.namespace(),
            domain_uid = %info.domain_uid(),
            error = %e,
            "Scheduled status update failed"
        );
        metrics::record_error("status_timer", "update");
    }
}

impl MakeRightExecutor for DomainProcessor {
    fn run_make_right_domain(&self, op: MakeRightDomainOperation, should_proceed: ShouldProceed) {
        if op.info.is_deleting() && !op.deletion {
            debug!(key = %op.key(), "Domain is being deleted; dropping make-right");
            metrics::record_make_right("domain", "dropped");
            return;
        }
        let interrupt = op.interrupt;
        self.submit(op.key(), QueuedOp::Domain(op, should_proceed), interrupt);
    }

    fn run_make_right_cluster(&self, op: MakeRightClusterOperation) {
        self.submit(op.key(), QueuedOp::Cluster(op), false);
    }

    fn update_domain_status_from_job_pod(&self, info: Arc<DomainPresenceInfo>, job_pod: Pod) {
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            match IntrospectorJobCheck.should_terminate(&job_pod) {
                Some(failure) => {
                    let max = ctx.config.failure_retry_max_count;
                    if let Err(e) =
                        update_domain_status(&ctx, &info, |_, status| apply_failure(status, &failure, max)).await
                    {
                        warn!(
                            namespace = %info.namespace(),
                            domain_uid = %info.domain_uid(),
                            error = %e,
                            "Failed to record introspector failure"
                        );
                    }
                }
                None => refresh_status(&ctx, &info).await,
            }
        });
    }

    fn schedule_domain_status_updates(&self, info: Arc<DomainPresenceInfo>) {
        let key = (info.namespace().to_string(), info.domain_uid().to_string());
        let mut timers = self.status_timers();
        if timers.get(&key).is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let ctx = Arc::clone(&self.ctx);
        let weak = self.me.clone();
        let period = ctx.config.status_update_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if info.is_deleting() || info.domain().is_none() {
                    break;
                }
                let Some(processor) = weak.upgrade() else {
                    break;
                };
                if processor.is_domain_in_flight(info.namespace(), info.domain_uid()) {
                    continue;
                }
                drop(processor);
                refresh_status(&ctx, &info).await;
            }
        });
        debug!(namespace = %key.0, domain_uid = %key.1, "Scheduled domain status updates");
        timers.insert(key, handle);
    }

    fn end_scheduled_domain_status_updates(&self, info: &DomainPresenceInfo) {
        let key = (info.namespace().to_string(), info.domain_uid().to_string());
        if let Some(handle) = self.status_timers().remove(&key) {
            handle.abort();
            debug!(namespace = %key.0, domain_uid = %key.1, "Ended domain status updates");
        }
    }

    fn register_domain_presence_info(&self, info: Arc<DomainPresenceInfo>) {
        self.ctx.presence.register_domain(info);
    }

    fn unregister_domain_presence_info(&self, info: &DomainPresenceInfo) {
        if info.has_owned_resources() {
            // Released by the list pass that no longer sees its resources.
            debug!(
                namespace = %info.namespace(),
                domain_uid = %info.domain_uid(),
                "Keeping deleted domain until its resources are gone"
            );
            return;
        }
        self.ctx
            .presence
            .unregister_domain(info.namespace(), info.domain_uid());
    }

    fn is_domain_in_flight(&self, namespace: &str, domain_uid: &str) -> bool {
        self.in_flight().contains_key(&OperationKey::Domain {
            namespace: namespace.to_string(),
            domain_uid: domain_uid.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod processor_tests;

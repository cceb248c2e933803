// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Suspend a plan until a watched resource is ready.
//!
//! [`WaitForReadyStep`] checks the resource once. When it is neither ready nor
//! failed the step registers a watch callback keyed by the resource's name and
//! starts a backstop task that re-reads the resource on a fixed schedule. The
//! first of the two that sees a ready or failed resource resumes the plan;
//! later deliveries are ignored.
//!
//! A backstop read that finds an updated, ready resource also forces a full
//! make-right of the owning domain, since the watch event that should have
//! carried the update was evidently missed. Exhausting the rechecks resumes
//! the plan and forces a make-right as well.

use crate::api_errors::StoreError;
use crate::constants::{POD_PHASE_FAILED, POD_PHASE_SUCCEEDED};
use crate::context::Context;
use crate::crd::{DomainFailureReason, FailureSeverity};
use crate::labels::LABEL_JOB_CONTROLLER_UID;
use crate::metrics;
use crate::reconcilers::steps::{Packet, PacketUpdate, Resumption, Step, StepFailure, StepResult};
use crate::status_reasons::{introspector_failed_message, is_fatal_message};
use crate::topology::pod_phase;
use crate::watch::{CallbackId, WatchRegistry};
use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Requests a full make-right of the domain that owns a wait.
pub type ForceMakeRight = Arc<dyn Fn() + Send + Sync>;

/// A resource kind a step can wait on.
#[async_trait]
pub trait WatchedResource: ResourceExt + Clone + Send + Sync + 'static {
    /// Registry the watch loop notifies for this kind.
    fn registry(ctx: &Context) -> &WatchRegistry<Self>;

    /// Reads the current resource.
    ///
    /// # Errors
    ///
    /// Returns the store error when the read fails.
    async fn read(ctx: &Context, namespace: &str, name: &str) -> Result<Option<Self>, StoreError>;
}

#[async_trait]
impl WatchedResource for Pod {
    fn registry(ctx: &Context) -> &WatchRegistry<Self> {
        &ctx.pod_watches
    }

    async fn read(ctx: &Context, namespace: &str, name: &str) -> Result<Option<Self>, StoreError> {
        ctx.store.get_pod(namespace, name).await
    }
}

/// What a [`WaitForReadyStep`] waits for.
pub trait ReadyCheck<K>: Send + Sync + 'static {
    /// The resource to wait on, as known when the step runs.
    fn current(&self, packet: &Packet) -> Option<K>;

    fn is_ready(&self, resource: &K) -> bool;

    /// A failure that ends the wait, if the resource is in one.
    fn should_terminate(&self, resource: &K) -> Option<StepFailure>;

    /// Whether a delivered update should resume the wait.
    fn should_process_callback(&self, resource: &K) -> bool {
        self.is_ready(resource) || self.should_terminate(resource).is_some()
    }

    /// Copies what later steps need from the ready resource.
    fn update_packet(&self, packet: &mut Packet, resource: &K);
}

/// Single-use resumption of a suspended plan.
pub struct ResumeHandle {
    sender: Mutex<Option<oneshot::Sender<Resumption>>>,
    resumed: AtomicBool,
}

impl ResumeHandle {
    fn new(sender: oneshot::Sender<Resumption>) -> Self {
        Self {
            sender: Mutex::new(Some(sender)),
            resumed: AtomicBool::new(false),
        }
    }

    /// Resumes the plan. Returns `false` if it was already resumed.
    pub fn resume(&self, resumption: Resumption) -> bool {
        let Some(sender) = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return false;
        };
        self.resumed.store(true, Ordering::SeqCst);
        // A dropped receiver means the plan was cancelled.
        let _ = sender.send(resumption);
        true
    }

    /// Returns `true` once a delivery has resumed the plan.
    #[must_use]
    pub fn did_resume_fiber(&self) -> bool {
        self.resumed.load(Ordering::SeqCst)
    }

    /// Returns `true` if the suspended plan went away.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(oneshot::Sender::is_closed)
    }
}

/// Removes a watch callback exactly once.
struct Registration<K: WatchedResource> {
    ctx: Weak<Context>,
    namespace: String,
    name: String,
    id: OnceLock<CallbackId>,
    _kind: std::marker::PhantomData<fn(K)>,
}

impl<K: WatchedResource> Registration<K> {
    fn release(&self) {
        if let (Some(ctx), Some(id)) = (self.ctx.upgrade(), self.id.get()) {
            K::registry(&ctx).unregister(&self.namespace, &self.name, *id);
        }
    }
}

/// Suspends the plan until the resource chosen by `check` is ready.
pub struct WaitForReadyStep<K, C> {
    ctx: Arc<Context>,
    check: Arc<C>,
    force_make_right: ForceMakeRight,
    _kind: std::marker::PhantomData<fn(K)>,
}

impl<K, C> WaitForReadyStep<K, C>
where
    K: WatchedResource,
    C: ReadyCheck<K>,
{
    #[must_use]
    pub fn new(ctx: Arc<Context>, check: C, force_make_right: ForceMakeRight) -> Self {
        Self {
            ctx,
            check: Arc::new(check),
            force_make_right,
            _kind: std::marker::PhantomData,
        }
    }

    fn proceed_with(check: &Arc<C>, resource: K) -> Resumption {
        let check = Arc::clone(check);
        let update: PacketUpdate = Box::new(move |packet: &mut Packet| {
            check.update_packet(packet, &resource);
        });
        Resumption::Proceed(Some(update))
    }

    /// Resumption for a resource that satisfies the waiter, if it does.
    fn resolve(check: &Arc<C>, resource: &K) -> Option<Resumption> {
        if let Some(failure) = check.should_terminate(resource) {
            return Some(Resumption::Terminate(failure));
        }
        check
            .is_ready(resource)
            .then(|| Self::proceed_with(check, resource.clone()))
    }

    fn suspend(&self, resource: &K) -> oneshot::Receiver<Resumption> {
        let (sender, receiver) = oneshot::channel();
        let handle = Arc::new(ResumeHandle::new(sender));
        let namespace = resource.namespace().unwrap_or_default();
        let name = resource.name_any();

        let registration = Arc::new(Registration::<K> {
            ctx: Arc::downgrade(&self.ctx),
            namespace: namespace.clone(),
            name: name.clone(),
            id: OnceLock::new(),
            _kind: std::marker::PhantomData,
        });

        let callback = {
            let handle = Arc::clone(&handle);
            let check = Arc::clone(&self.check);
            let registration = Arc::clone(&registration);
            Arc::new(move |update: &K| {
                if handle.did_resume_fiber() || !check.should_process_callback(update) {
                    return;
                }
                registration.release();
                if let Some(resumption) = Self::resolve(&check, update) {
                    handle.resume(resumption);
                }
            })
        };
        let id = K::registry(&self.ctx).register(&namespace, &name, callback);
        let _ = registration.id.set(id);

        tokio::spawn(backstop(
            Arc::clone(&self.ctx),
            Arc::clone(&self.check),
            handle,
            registration,
            resource.resource_version(),
            Arc::clone(&self.force_make_right),
        ));

        receiver
    }
}

#[async_trait]
impl<K, C> Step for WaitForReadyStep<K, C>
where
    K: WatchedResource,
    C: ReadyCheck<K>,
{
    fn name(&self) -> &'static str {
        "wait_for_ready"
    }

    async fn apply(&self, packet: &mut Packet) -> Result<StepResult> {
        let Some(resource) = self.check.current(packet) else {
            return Ok(StepResult::Continue);
        };

        if let Some(failure) = self.check.should_terminate(&resource) {
            packet.failure = Some(failure);
            return Ok(StepResult::Continue);
        }
        if self.check.is_ready(&resource) {
            self.check.update_packet(packet, &resource);
            return Ok(StepResult::Continue);
        }

        debug!(
            namespace = %packet.info.namespace(),
            domain_uid = %packet.info.domain_uid(),
            resource = %resource.name_any(),
            "Waiting for resource to become ready"
        );
        Ok(StepResult::Suspend(self.suspend(&resource)))
    }
}

/// Periodically re-reads the resource until a delivery resumes the plan.
async fn backstop<K, C>(
    ctx: Arc<Context>,
    check: Arc<C>,
    handle: Arc<ResumeHandle>,
    registration: Arc<Registration<K>>,
    initial_version: Option<String>,
    force_make_right: ForceMakeRight,
) where
    K: WatchedResource,
    C: ReadyCheck<K>,
{
    let interval = ctx.config.ready_recheck_interval();
    let namespace = registration.namespace.clone();
    let name = registration.name.clone();

    for attempt in 0..=ctx.config.ready_recheck_count {
        if attempt > 0 {
            tokio::time::sleep(interval).await;
        }
        if handle.did_resume_fiber() || handle.is_cancelled() {
            registration.release();
            return;
        }

        match K::read(&ctx, &namespace, &name).await {
            Ok(Some(resource)) => {
                let Some(resumption) = WaitForReadyStep::<K, C>::resolve(&check, &resource) else {
                    continue;
                };
                registration.release();
                let updated = resource.resource_version() != initial_version;
                if handle.resume(resumption) && updated {
                    info!(
                        namespace = %namespace,
                        resource = %name,
                        "Backstop read found an update the watch missed; forcing make-right"
                    );
                    force_make_right();
                }
                return;
            }
            Ok(None) => {
                registration.release();
                if handle.resume(Resumption::Proceed(None)) {
                    debug!(namespace = %namespace, resource = %name, "Waited-on resource is gone");
                    force_make_right();
                }
                return;
            }
            Err(e) => {
                warn!(
                    namespace = %namespace,
                    resource = %name,
                    attempt,
                    error = %e,
                    "Backstop read failed"
                );
                metrics::record_error("wait_for_ready", "read");
            }
        }
    }

    registration.release();
    if handle.resume(Resumption::Proceed(None)) {
        warn!(
            namespace = %namespace,
            resource = %name,
            rechecks = ctx.config.ready_recheck_count,
            "Resource not ready after all rechecks; forcing make-right"
        );
        force_make_right();
    }
}

// ============================================================================
// Introspector job pod
// ============================================================================

/// Waits for the domain's introspector job pod to finish.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntrospectorJobCheck;

impl IntrospectorJobCheck {
    fn termination_detail(pod: &Pod) -> Option<String> {
        let status = pod.status.as_ref()?;
        status
            .container_statuses
            .iter()
            .flatten()
            .filter_map(|c| c.state.as_ref()?.terminated.as_ref()?.message.clone())
            .find(|m| !m.trim().is_empty())
            .or_else(|| status.message.clone())
    }

    fn job_uid(pod: &Pod) -> Option<String> {
        pod.labels()
            .get(LABEL_JOB_CONTROLLER_UID)
            .cloned()
            .or_else(|| pod.uid())
    }
}

impl ReadyCheck<Pod> for IntrospectorJobCheck {
    fn current(&self, packet: &Packet) -> Option<Pod> {
        packet.info.introspector_job_pod().map(|pod| (*pod).clone())
    }

    fn is_ready(&self, pod: &Pod) -> bool {
        pod_phase(pod) == Some(POD_PHASE_SUCCEEDED)
    }

    fn should_terminate(&self, pod: &Pod) -> Option<StepFailure> {
        if pod_phase(pod) != Some(POD_PHASE_FAILED) {
            return None;
        }
        let detail = Self::termination_detail(pod);
        let severity = if detail.as_deref().is_some_and(is_fatal_message) {
            FailureSeverity::Fatal
        } else {
            FailureSeverity::Severe
        };
        Some(
            StepFailure::new(
                DomainFailureReason::Introspection,
                introspector_failed_message(&pod.name_any(), detail.as_deref()),
            )
            .with_severity(severity)
            .with_job_uid(Self::job_uid(pod)),
        )
    }

    fn update_packet(&self, packet: &mut Packet, pod: &Pod) {
        packet.info.set_introspector_job_pod(Some(pod.clone()));
        packet.job_pod = Some(pod.clone());
    }
}

#[cfg(test)]
#[path = "wait_for_ready_tests.rs"]
mod wait_for_ready_tests;

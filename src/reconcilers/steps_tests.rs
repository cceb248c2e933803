// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `steps.rs`

#[cfg(test)]
mod tests {
    use super::super::{
        run_steps, Packet, PacketUpdate, PlanOutcome, Resumption, Step, StepFailure, StepResult,
    };
    use crate::crd::DomainFailureReason;
    use crate::presence::DomainPresenceInfo;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    type Trace = Arc<Mutex<Vec<&'static str>>>;

    struct Record(&'static str, Trace);

    #[async_trait]
    impl Step for Record {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn apply(&self, _packet: &mut Packet) -> Result<StepResult> {
            self.1.lock().unwrap().push(self.0);
            Ok(StepResult::Continue)
        }
    }

    struct StopHere;

    #[async_trait]
    impl Step for StopHere {
        fn name(&self) -> &'static str {
            "stop"
        }

        async fn apply(&self, _packet: &mut Packet) -> Result<StepResult> {
            Ok(StepResult::Stop)
        }
    }

    struct Fail;

    #[async_trait]
    impl Step for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }

        async fn apply(&self, _packet: &mut Packet) -> Result<StepResult> {
            anyhow::bail!("store unavailable")
        }
    }

    /// Suspends and immediately resumes with the given resumption.
    struct SuspendWith(Mutex<Option<Resumption>>);

    #[async_trait]
    impl Step for SuspendWith {
        fn name(&self) -> &'static str {
            "suspend"
        }

        async fn apply(&self, _packet: &mut Packet) -> Result<StepResult> {
            let (tx, rx) = oneshot::channel();
            if let Some(resumption) = self.0.lock().unwrap().take() {
                let _ = tx.send(resumption);
            }
            Ok(StepResult::Suspend(rx))
        }
    }

    fn packet() -> Packet {
        Packet::new(Arc::new(DomainPresenceInfo::new("apps", "sample")))
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let trace: Trace = Arc::default();
        let steps: Vec<Box<dyn Step>> = vec![
            Box::new(Record("first", trace.clone())),
            Box::new(Record("second", trace.clone())),
        ];

        let outcome = run_steps(&steps, &mut packet()).await.unwrap();

        assert_eq!(outcome, PlanOutcome::Completed);
        assert_eq!(*trace.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_stop_skips_remaining_steps() {
        let trace: Trace = Arc::default();
        let steps: Vec<Box<dyn Step>> = vec![
            Box::new(StopHere),
            Box::new(Record("after", trace.clone())),
        ];

        let outcome = run_steps(&steps, &mut packet()).await.unwrap();

        assert_eq!(outcome, PlanOutcome::Stopped);
        assert!(trace.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_ends_plan() {
        let trace: Trace = Arc::default();
        let steps: Vec<Box<dyn Step>> = vec![
            Box::new(Fail),
            Box::new(Record("after", trace.clone())),
        ];

        let err = run_steps(&steps, &mut packet()).await.unwrap_err();

        assert!(err.to_string().contains("store unavailable"));
        assert!(trace.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_applies_packet_update() {
        let trace: Trace = Arc::default();
        let update: PacketUpdate = Box::new(|p: &mut Packet| {
            p.failure = Some(StepFailure::new(DomainFailureReason::Internal, "marker"));
        });
        let steps: Vec<Box<dyn Step>> = vec![
            Box::new(SuspendWith(Mutex::new(Some(Resumption::Proceed(Some(update)))))),
            Box::new(Record("after", trace.clone())),
        ];
        let mut packet = packet();

        let outcome = run_steps(&steps, &mut packet).await.unwrap();

        assert_eq!(outcome, PlanOutcome::Completed);
        assert_eq!(packet.failure.unwrap().message, "marker");
        assert_eq!(*trace.lock().unwrap(), vec!["after"]);
    }

    #[tokio::test]
    async fn test_terminate_sets_failure_for_later_steps() {
        let failure = StepFailure::new(DomainFailureReason::Introspection, "job failed");
        let steps: Vec<Box<dyn Step>> = vec![Box::new(SuspendWith(Mutex::new(Some(
            Resumption::Terminate(failure.clone()),
        ))))];
        let mut packet = packet();

        run_steps(&steps, &mut packet).await.unwrap();

        assert_eq!(packet.failure, Some(failure));
    }

    #[tokio::test]
    async fn test_closed_channel_abandons_plan_quietly() {
        let trace: Trace = Arc::default();
        let steps: Vec<Box<dyn Step>> = vec![
            Box::new(SuspendWith(Mutex::new(None))),
            Box::new(Record("after", trace.clone())),
        ];

        let outcome = run_steps(&steps, &mut packet()).await.unwrap();

        assert_eq!(outcome, PlanOutcome::Abandoned);
        assert!(trace.lock().unwrap().is_empty());
    }
}

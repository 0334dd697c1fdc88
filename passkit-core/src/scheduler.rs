//! Drip campaign scheduler: advances due enrollments, mutates pass
//! content, and wakes registered devices.
//!
//! Invoked periodically by an external trigger (the server spawns an
//! interval task). Each due enrollment is processed at most once per
//! invocation, and one enrollment's failure never aborts the batch.

use crate::credentials::CredentialPool;
use crate::notifier::UpdateNotifier;
use crate::store::models::{EnrollmentStatus, Pass, SequenceEnrollment, SequenceStep};
use crate::store::sequences::StepAdvance;
use crate::store::{Store, StoreError};
use std::sync::Arc;

/// Per-run counts, logged by the periodic trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub processed: usize,
    pub advanced: usize,
    pub completed: usize,
    pub failed: usize,
}

enum StepOutcome {
    Advanced,
    Completed,
    Failed,
}

pub struct DripScheduler {
    store: Store,
    credentials: CredentialPool,
    notifier: Arc<UpdateNotifier>,
}

impl DripScheduler {
    pub fn new(store: Store, credentials: CredentialPool, notifier: Arc<UpdateNotifier>) -> Self {
        Self {
            store,
            credentials,
            notifier,
        }
    }

    /// Process every ACTIVE enrollment whose execution time has arrived.
    pub async fn run_due(&self, now: i64) -> Result<SchedulerReport, StoreError> {
        let due = self.store.due_enrollments(now)?;
        let mut report = SchedulerReport {
            processed: due.len(),
            ..SchedulerReport::default()
        };

        for enrollment in &due {
            match self.process_enrollment(enrollment, now).await {
                Ok(StepOutcome::Advanced) => report.advanced += 1,
                Ok(StepOutcome::Completed) => report.completed += 1,
                Ok(StepOutcome::Failed) => report.failed += 1,
                Err(e) => {
                    tracing::error!(
                        enrollment_id = %enrollment.id,
                        "campaign step failed: {}",
                        e
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn process_enrollment(
        &self,
        enrollment: &SequenceEnrollment,
        now: i64,
    ) -> Result<StepOutcome, StoreError> {
        let steps = self.store.steps_for_sequence(&enrollment.sequence_id)?;

        // Step numbering must be contiguous from 1. A malformed sequence
        // fails only its own enrollments; PAUSED keeps it from hot-looping
        // every run until an operator repairs the sequence.
        if !is_contiguous(&steps) {
            tracing::error!(
                enrollment_id = %enrollment.id,
                sequence_id = %enrollment.sequence_id,
                "sequence steps are not contiguous from 1; pausing enrollment"
            );
            self.store
                .set_enrollment_status(&enrollment.id, EnrollmentStatus::Paused)?;
            return Ok(StepOutcome::Failed);
        }

        let Some(step) = steps
            .iter()
            .find(|s| s.step_number == enrollment.current_step)
        else {
            // Past the last defined step: nothing left to send.
            self.store
                .set_enrollment_status(&enrollment.id, EnrollmentStatus::Completed)?;
            return Ok(StepOutcome::Completed);
        };

        let Some(pass) = self.store.pass_by_id(&enrollment.pass_id)? else {
            tracing::error!(
                enrollment_id = %enrollment.id,
                pass_id = %enrollment.pass_id,
                "enrollment references a missing pass; pausing"
            );
            self.store
                .set_enrollment_status(&enrollment.id, EnrollmentStatus::Paused)?;
            return Ok(StepOutcome::Failed);
        };

        let message = render_template(&step.message_template, &pass);
        let advance = match steps
            .iter()
            .find(|s| s.step_number == enrollment.current_step + 1)
        {
            Some(next) => StepAdvance::Next {
                step: next.step_number,
                run_at: now + next.delay_hours * 3600,
            },
            None => StepAdvance::Complete,
        };

        // Mutate and advance atomically; the push happens after commit and
        // is best-effort.
        self.store
            .apply_step(&enrollment.id, &pass.id, &message, advance)?;

        self.notify_pass_devices(&pass).await;

        Ok(match advance {
            StepAdvance::Next { .. } => StepOutcome::Advanced,
            StepAdvance::Complete => StepOutcome::Completed,
        })
    }

    async fn notify_pass_devices(&self, pass: &Pass) {
        let tokens = match self.store.push_tokens_for_pass(&pass.id) {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(pass_id = %pass.id, "failed to load push tokens: {}", e);
                return;
            }
        };
        if tokens.is_empty() {
            return;
        }
        let identity = match self.credentials.by_id(&pass.signing_identity_id) {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                tracing::warn!(
                    pass_id = %pass.id,
                    identity_id = %pass.signing_identity_id,
                    "pass references an unknown signing identity; skipping push"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(pass_id = %pass.id, "failed to load signing identity: {}", e);
                return;
            }
        };

        let summary = self.notifier.notify(&tokens, &identity).await;
        tracing::info!(
            pass_id = %pass.id,
            success = summary.success,
            failed = summary.failed,
            "campaign push fan-out"
        );
    }
}

fn is_contiguous(steps: &[SequenceStep]) -> bool {
    steps
        .iter()
        .enumerate()
        .all(|(i, step)| step.step_number == (i + 1) as i64)
}

/// Substitute the pass serial into the step template. Templates use
/// `{serial_number}` as the only placeholder.
fn render_template(template: &str, pass: &Pass) -> String {
    template.replace("{serial_number}", &pass.serial_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::{PushEnvironment, PushError, PushGateway, PushOutcome};
    use crate::store::models::{IdentityStatus, SigningIdentity};
    use crate::store::passes::UPDATE_MESSAGE_KEY;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct RecordingGateway {
        calls: Mutex<Vec<(String, String)>>,
    }

    impl RecordingGateway {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PushGateway for RecordingGateway {
        async fn send(
            &self,
            token: &str,
            topic: &str,
            _identity: &SigningIdentity,
            _environment: PushEnvironment,
        ) -> Result<PushOutcome, PushError> {
            self.calls
                .lock()
                .unwrap()
                .push((token.to_string(), topic.to_string()));
            Ok(PushOutcome::Sent)
        }
    }

    struct Fixture {
        store: Store,
        scheduler: DripScheduler,
        gateway: Arc<RecordingGateway>,
        identity_id: String,
    }

    fn fixture() -> Fixture {
        let store = Store::in_memory().unwrap();
        let identity = store
            .create_identity("pass.com.example.coupon", "TEAM01", "k1", IdentityStatus::Active, 0)
            .unwrap();
        let gateway = Arc::new(RecordingGateway::new());
        let notifier = Arc::new(UpdateNotifier::new(gateway.clone(), 4));
        let scheduler = DripScheduler::new(
            store.clone(),
            CredentialPool::new(store.clone()),
            notifier,
        );
        Fixture {
            store,
            scheduler,
            gateway,
            identity_id: identity.id,
        }
    }

    fn three_step_sequence(store: &Store) -> String {
        let sequence = store.create_sequence("welcome").unwrap();
        store
            .add_sequence_step(&sequence.id, 1, 0, "Step one for {serial_number}")
            .unwrap();
        store.add_sequence_step(&sequence.id, 2, 24, "Step two").unwrap();
        store.add_sequence_step(&sequence.id, 3, 48, "Step three").unwrap();
        sequence.id
    }

    #[tokio::test]
    async fn due_step_mutates_pass_and_advances() {
        let f = fixture();
        let pass = f
            .store
            .create_pass("S1", "tok-1", &f.identity_id, &json!({}))
            .unwrap();
        let sequence_id = three_step_sequence(&f.store);
        let enrollment = f.store.create_enrollment(&pass.id, &sequence_id, 100).unwrap();
        let device = f.store.upsert_device("dev1", &"a".repeat(64)).unwrap();
        f.store.upsert_registration(&pass.id, &device.id).unwrap();

        let report = f.scheduler.run_due(100).await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.advanced, 1);

        let updated_pass = f.store.pass_by_id(&pass.id).unwrap().unwrap();
        assert_eq!(updated_pass.data[UPDATE_MESSAGE_KEY], "Step one for S1");
        assert!(updated_pass.last_modified > pass.last_modified);

        let advanced = f.store.enrollment_by_id(&enrollment.id).unwrap().unwrap();
        assert_eq!(advanced.current_step, 2);
        assert_eq!(advanced.next_execution_at, 100 + 24 * 3600);

        // The registered device was woken.
        assert_eq!(f.gateway.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn final_step_completes_enrollment() {
        let f = fixture();
        let pass = f
            .store
            .create_pass("S1", "tok-1", &f.identity_id, &json!({}))
            .unwrap();
        let sequence_id = three_step_sequence(&f.store);
        let enrollment = f.store.create_enrollment(&pass.id, &sequence_id, 0).unwrap();
        f.store
            .apply_step(&enrollment.id, &pass.id, "skip", StepAdvance::Next { step: 3, run_at: 0 })
            .unwrap();

        let report = f.scheduler.run_due(10).await.unwrap();
        assert_eq!(report.completed, 1);

        let done = f.store.enrollment_by_id(&enrollment.id).unwrap().unwrap();
        assert_eq!(done.status, EnrollmentStatus::Completed);

        // A completed enrollment is never picked up again.
        let next = f.scheduler.run_due(1_000_000).await.unwrap();
        assert_eq!(next.processed, 0);
    }

    #[tokio::test]
    async fn step_past_the_end_completes_without_sending() {
        let f = fixture();
        let pass = f
            .store
            .create_pass("S1", "tok-1", &f.identity_id, &json!({}))
            .unwrap();
        let sequence_id = three_step_sequence(&f.store);
        let enrollment = f.store.create_enrollment(&pass.id, &sequence_id, 0).unwrap();
        f.store
            .apply_step(&enrollment.id, &pass.id, "skip", StepAdvance::Next { step: 4, run_at: 0 })
            .unwrap();
        let before = f.store.pass_by_id(&pass.id).unwrap().unwrap();

        let report = f.scheduler.run_due(10).await.unwrap();
        assert_eq!(report.completed, 1);

        let done = f.store.enrollment_by_id(&enrollment.id).unwrap().unwrap();
        assert_eq!(done.status, EnrollmentStatus::Completed);
        // No step was applied.
        let after = f.store.pass_by_id(&pass.id).unwrap().unwrap();
        assert_eq!(after.last_modified, before.last_modified);
    }

    #[tokio::test]
    async fn non_contiguous_steps_pause_only_that_enrollment() {
        let f = fixture();
        let pass_a = f
            .store
            .create_pass("S1", "tok-1", &f.identity_id, &json!({}))
            .unwrap();
        let pass_b = f
            .store
            .create_pass("S2", "tok-2", &f.identity_id, &json!({}))
            .unwrap();

        let broken = f.store.create_sequence("broken").unwrap();
        f.store.add_sequence_step(&broken.id, 1, 0, "one").unwrap();
        f.store.add_sequence_step(&broken.id, 3, 0, "three").unwrap();
        let healthy = three_step_sequence(&f.store);

        let bad = f.store.create_enrollment(&pass_a.id, &broken.id, 0).unwrap();
        let good = f.store.create_enrollment(&pass_b.id, &healthy, 0).unwrap();

        let report = f.scheduler.run_due(10).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.advanced, 1);

        let paused = f.store.enrollment_by_id(&bad.id).unwrap().unwrap();
        assert_eq!(paused.status, EnrollmentStatus::Paused);
        let moved = f.store.enrollment_by_id(&good.id).unwrap().unwrap();
        assert_eq!(moved.current_step, 2);
    }

    #[tokio::test]
    async fn not_yet_due_enrollments_are_left_alone() {
        let f = fixture();
        let pass = f
            .store
            .create_pass("S1", "tok-1", &f.identity_id, &json!({}))
            .unwrap();
        let sequence_id = three_step_sequence(&f.store);
        f.store.create_enrollment(&pass.id, &sequence_id, 500).unwrap();

        let report = f.scheduler.run_due(499).await.unwrap();
        assert_eq!(report.processed, 0);
    }
}

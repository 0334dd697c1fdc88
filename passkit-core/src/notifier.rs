//! Silent-push fan-out to registered devices.

use crate::push::{self, PushEnvironment, PushGateway, PushOutcome};
use crate::store::models::SigningIdentity;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Per-batch delivery counts, for operator-facing reporting only. Nothing
/// retries based on these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifySummary {
    pub success: usize,
    pub failed: usize,
}

/// Fans out content-available pushes, one concurrent send per device,
/// bounded by a configurable in-flight cap. One device's failure never
/// blocks or fails the rest of the batch.
pub struct UpdateNotifier {
    gateway: Arc<dyn PushGateway>,
    max_in_flight: usize,
}

impl UpdateNotifier {
    pub fn new(gateway: Arc<dyn PushGateway>, max_in_flight: usize) -> Self {
        Self {
            gateway,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Send a silent push to every token. Malformed tokens count as
    /// failures without aborting the batch. The push topic is the signing
    /// identity's pass type.
    pub async fn notify(
        &self,
        push_tokens: &[String],
        identity: &SigningIdentity,
    ) -> NotifySummary {
        let mut summary = NotifySummary::default();
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let mut sends = JoinSet::new();

        for raw in push_tokens {
            let Some(token) = push::normalize_push_token(raw) else {
                tracing::warn!("skipping malformed push token");
                summary.failed += 1;
                continue;
            };
            let gateway = Arc::clone(&self.gateway);
            let identity = identity.clone();
            let semaphore = Arc::clone(&semaphore);
            sends.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return false,
                };
                send_with_fallback(gateway.as_ref(), &token, &identity).await
            });
        }

        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok(true) => summary.success += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    tracing::error!("push send task failed: {}", e);
                    summary.failed += 1;
                }
            }
        }

        tracing::debug!(
            success = summary.success,
            failed = summary.failed,
            topic = %identity.pass_type_id,
            "push fan-out finished"
        );
        summary
    }
}

/// One send, with a single retry against the other APNs environment when
/// the rejection reason indicates an environment mismatch. No further
/// retries.
async fn send_with_fallback(
    gateway: &dyn PushGateway,
    token: &str,
    identity: &SigningIdentity,
) -> bool {
    let topic = identity.pass_type_id.as_str();
    match gateway
        .send(token, topic, identity, PushEnvironment::Production)
        .await
    {
        Ok(PushOutcome::Sent) => true,
        Ok(PushOutcome::Rejected(reason)) if push::is_environment_mismatch(&reason) => {
            match gateway
                .send(token, topic, identity, PushEnvironment::Sandbox)
                .await
            {
                Ok(PushOutcome::Sent) => true,
                Ok(PushOutcome::Rejected(reason)) => {
                    tracing::warn!(%reason, "push rejected in both environments");
                    false
                }
                Err(e) => {
                    tracing::warn!("push fallback send failed: {}", e);
                    false
                }
            }
        }
        Ok(PushOutcome::Rejected(reason)) => {
            tracing::warn!(%reason, "push rejected");
            false
        }
        Err(e) => {
            tracing::warn!("push send failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::{PushError, PushGateway};
    use crate::store::models::{IdentityStatus, SigningIdentity};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn identity() -> SigningIdentity {
        SigningIdentity {
            id: "id-1".to_string(),
            pass_type_id: "pass.com.example.coupon".to_string(),
            team_id: "TEAM01".to_string(),
            auth_key: "k1".to_string(),
            status: IdentityStatus::Active,
            priority: 0,
            last_used_at: None,
            created_at: 0,
        }
    }

    /// Gateway scripted per (token, environment); records every call.
    struct ScriptedGateway {
        outcomes: HashMap<(String, PushEnvironment), PushOutcome>,
        calls: Mutex<Vec<(String, String, PushEnvironment)>>,
    }

    impl ScriptedGateway {
        fn new(outcomes: HashMap<(String, PushEnvironment), PushOutcome>) -> Self {
            Self {
                outcomes,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PushGateway for ScriptedGateway {
        async fn send(
            &self,
            token: &str,
            topic: &str,
            _identity: &SigningIdentity,
            environment: PushEnvironment,
        ) -> Result<PushOutcome, PushError> {
            self.calls.lock().unwrap().push((
                token.to_string(),
                topic.to_string(),
                environment,
            ));
            Ok(self
                .outcomes
                .get(&(token.to_string(), environment))
                .cloned()
                .unwrap_or(PushOutcome::Sent))
        }
    }

    fn hex_token(fill: char) -> String {
        std::iter::repeat(fill).take(64).collect()
    }

    #[tokio::test]
    async fn counts_successes_and_failures_independently() {
        let ok = hex_token('a');
        let bad = hex_token('b');
        let mut outcomes = HashMap::new();
        outcomes.insert(
            (bad.clone(), PushEnvironment::Production),
            PushOutcome::Rejected("Unregistered".to_string()),
        );
        let gateway = Arc::new(ScriptedGateway::new(outcomes));
        let notifier = UpdateNotifier::new(gateway.clone(), 8);

        let summary = notifier.notify(&[ok, bad], &identity()).await;

        assert_eq!(summary.success, 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn malformed_tokens_fail_without_sending() {
        let gateway = Arc::new(ScriptedGateway::new(HashMap::new()));
        let notifier = UpdateNotifier::new(gateway.clone(), 8);

        let summary = notifier
            .notify(&["not-hex".to_string(), hex_token('a')], &identity())
            .await;

        assert_eq!(summary.success, 1);
        assert_eq!(summary.failed, 1);
        // Only the well-formed token reached the gateway.
        assert_eq!(gateway.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn environment_mismatch_retries_exactly_once() {
        let token = hex_token('c');
        let mut outcomes = HashMap::new();
        outcomes.insert(
            (token.clone(), PushEnvironment::Production),
            PushOutcome::Rejected("BadDeviceToken".to_string()),
        );
        outcomes.insert((token.clone(), PushEnvironment::Sandbox), PushOutcome::Sent);
        let gateway = Arc::new(ScriptedGateway::new(outcomes));
        let notifier = UpdateNotifier::new(gateway.clone(), 8);

        let summary = notifier.notify(&[token.clone()], &identity()).await;

        assert_eq!(summary.success, 1);
        let calls = gateway.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].2, PushEnvironment::Production);
        assert_eq!(calls[1].2, PushEnvironment::Sandbox);
    }

    #[tokio::test]
    async fn non_mismatch_rejection_is_not_retried() {
        let token = hex_token('d');
        let mut outcomes = HashMap::new();
        outcomes.insert(
            (token.clone(), PushEnvironment::Production),
            PushOutcome::Rejected("PayloadTooLarge".to_string()),
        );
        let gateway = Arc::new(ScriptedGateway::new(outcomes));
        let notifier = UpdateNotifier::new(gateway.clone(), 8);

        let summary = notifier.notify(&[token], &identity()).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(gateway.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn topic_is_the_identity_pass_type() {
        let gateway = Arc::new(ScriptedGateway::new(HashMap::new()));
        let notifier = UpdateNotifier::new(gateway.clone(), 8);

        notifier.notify(&[hex_token('e')], &identity()).await;

        let calls = gateway.calls.lock().unwrap();
        assert_eq!(calls[0].1, "pass.com.example.coupon");
    }
}

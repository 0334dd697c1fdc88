//! APNs HTTP push gateway.

use async_trait::async_trait;
use passkit_core::{PushEnvironment, PushError, PushGateway, PushOutcome, SigningIdentity};
use serde_json::json;
use std::time::Duration;

pub struct ApnsClient {
    client: reqwest::Client,
    production_url: String,
    sandbox_url: String,
}

impl ApnsClient {
    pub fn new(production_url: &str, sandbox_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            production_url: production_url.trim_end_matches('/').to_string(),
            sandbox_url: sandbox_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PushGateway for ApnsClient {
    async fn send(
        &self,
        token: &str,
        topic: &str,
        identity: &SigningIdentity,
        environment: PushEnvironment,
    ) -> Result<PushOutcome, PushError> {
        let base = match environment {
            PushEnvironment::Production => &self.production_url,
            PushEnvironment::Sandbox => &self.sandbox_url,
        };
        let url = format!("{}/3/device/{}", base, token);

        // Silent push: no alert, content-available only, low priority.
        let response = self
            .client
            .post(&url)
            .header("apns-topic", topic)
            .header("apns-push-type", "background")
            .header("apns-priority", "5")
            .bearer_auth(&identity.auth_key)
            .json(&json!({"aps": {"content-available": 1}}))
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        if response.status().is_success() {
            return Ok(PushOutcome::Sent);
        }

        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
        let reason = body
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_string();
        Ok(PushOutcome::Rejected(reason))
    }
}

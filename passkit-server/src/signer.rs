//! HTTP client for the pass signer sidecar.

use async_trait::async_trait;
use passkit_core::{PassSerializer, SerializeError, SigningIdentity};
use serde_json::json;
use std::time::Duration;

/// Sends the merged payload to the signer sidecar and returns the signed
/// `.pkpass` bytes.
pub struct HttpPassSerializer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPassSerializer {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PassSerializer for HttpPassSerializer {
    async fn serialize(
        &self,
        payload: &serde_json::Value,
        style_template: &str,
        identity: &SigningIdentity,
    ) -> Result<Vec<u8>, SerializeError> {
        let url = format!("{}/sign", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "payload": payload,
                "styleTemplate": style_template,
                "passTypeId": identity.pass_type_id,
                "teamId": identity.team_id,
            }))
            .send()
            .await
            .map_err(|e| SerializeError::Signing(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(if status.is_client_error() {
                SerializeError::Malformed(detail)
            } else {
                SerializeError::Signing(detail)
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SerializeError::Signing(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

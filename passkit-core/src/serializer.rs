//! Pass serializer seam: payload in, signed `.pkpass` bytes out.

use crate::store::models::SigningIdentity;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("malformed pass payload: {0}")]
    Malformed(String),

    #[error("pass signing failed: {0}")]
    Signing(String),
}

/// Turns a merged pass payload into signed pass-file bytes. The production
/// implementation lives at the server boundary (signer sidecar); tests use
/// a stub.
#[async_trait]
pub trait PassSerializer: Send + Sync {
    async fn serialize(
        &self,
        payload: &serde_json::Value,
        style_template: &str,
        identity: &SigningIdentity,
    ) -> Result<Vec<u8>, SerializeError>;
}

//! Push gateway seam and push-token normalization.
//!
//! Wallet clients deliver their push token either as a plain hex string or
//! wrapped in JSON as `{"pushToken": "..."}`. Normalization happens once at
//! this boundary; everything downstream sees the plain form.

use crate::store::models::SigningIdentity;
use async_trait::async_trait;
use thiserror::Error;

/// APNs environment a notification is sent against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushEnvironment {
    Production,
    Sandbox,
}

impl PushEnvironment {
    pub fn other(self) -> Self {
        match self {
            Self::Production => Self::Sandbox,
            Self::Sandbox => Self::Production,
        }
    }
}

/// Outcome of a single push send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Sent,
    /// The gateway refused the notification; carries the provider reason.
    Rejected(String),
}

/// Transport-level push failure. Counted per token, never surfaced to
/// protocol callers.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("push transport error: {0}")]
    Transport(String),
}

/// Raw push transport. The concrete APNs client lives at the server
/// boundary; tests substitute a scripted gateway.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(
        &self,
        token: &str,
        topic: &str,
        identity: &SigningIdentity,
        environment: PushEnvironment,
    ) -> Result<PushOutcome, PushError>;
}

/// Strip the JSON `{"pushToken": ...}` wrapper if present. Returns `None`
/// for an empty token.
pub fn unwrap_push_token(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(inner) = value.get("pushToken").and_then(|v| v.as_str()) {
            let inner = inner.trim();
            if inner.is_empty() {
                return None;
            }
            return Some(inner.to_string());
        }
    }
    Some(trimmed.to_string())
}

/// Full normalization for sending: unwrap, lowercase, and require the
/// 64-hex-character APNs token shape.
pub fn normalize_push_token(raw: &str) -> Option<String> {
    let token = unwrap_push_token(raw)?.to_ascii_lowercase();
    if token.len() == 64 && token.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some(token)
    } else {
        None
    }
}

/// Whether a provider rejection reason indicates the token belongs to the
/// other APNs environment.
pub fn is_environment_mismatch(reason: &str) -> bool {
    matches!(reason, "BadDeviceToken" | "DeviceTokenNotForTopic")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_json_form() {
        let raw = r#"{"pushToken": "abc123"}"#;
        assert_eq!(unwrap_push_token(raw).as_deref(), Some("abc123"));
    }

    #[test]
    fn passes_plain_form_through() {
        assert_eq!(unwrap_push_token("  abc123  ").as_deref(), Some("abc123"));
    }

    #[test]
    fn rejects_empty_tokens() {
        assert!(unwrap_push_token("").is_none());
        assert!(unwrap_push_token("   ").is_none());
        assert!(unwrap_push_token(r#"{"pushToken": ""}"#).is_none());
    }

    #[test]
    fn normalization_requires_64_hex() {
        let good = "A".repeat(64);
        assert_eq!(normalize_push_token(&good).as_deref(), Some("a".repeat(64).as_str()));
        assert!(normalize_push_token("zz").is_none());
        assert!(normalize_push_token(&"g".repeat(64)).is_none());
    }

    #[test]
    fn normalization_handles_wrapped_tokens() {
        let raw = format!(r#"{{"pushToken": "{}"}}"#, "b".repeat(64));
        assert_eq!(normalize_push_token(&raw), Some("b".repeat(64)));
    }
}

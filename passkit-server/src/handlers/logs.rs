//! Wallet client log ingestion: accept and discard.

use axum::body::Bytes;
use axum::http::StatusCode;

/// Clients post diagnostic messages here. The body is written to the audit
/// log and otherwise dropped; the response is always 200.
pub async fn ingest(body: Bytes) -> StatusCode {
    let text = String::from_utf8_lossy(&body);
    tracing::info!(target: "wallet_client_log", "{}", text);
    StatusCode::OK
}

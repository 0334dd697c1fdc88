//! Latest-pass fetch handler.

use crate::error::GatewayError;
use crate::server::AppState;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use serde_json::json;

/// `GET /v1/passes/{passTypeID}/{serial}`
///
/// The pass is re-resolved fresh by serial number rather than reusing the
/// object the auth step matched, so the client always receives current
/// content, never a snapshot from before a concurrent mutation.
pub async fn fetch_pass(
    State(state): State<AppState>,
    Path((pass_type_id, serial_number)): Path<(String, String)>,
) -> Result<impl IntoResponse, GatewayError> {
    let pass = state
        .store
        .pass_by_serial(&serial_number)?
        .ok_or(GatewayError::NotFound)?;

    let identity = state
        .credentials
        .by_id(&pass.signing_identity_id)?
        .ok_or_else(|| {
            GatewayError::Internal(format!(
                "pass {} references unknown signing identity {}",
                pass.id, pass.signing_identity_id
            ))
        })?;

    // A valid token for one deployment tenant must not serve passes signed
    // under another tenant's identity.
    if identity.pass_type_id != pass_type_id {
        return Err(GatewayError::Forbidden);
    }

    let mut payload = pass.data.clone();
    let fields = payload.as_object_mut().ok_or_else(|| {
        GatewayError::Internal(format!("pass {} payload is not a JSON object", pass.id))
    })?;
    fields.insert("webServiceURL".to_string(), json!(state.web_service_url));
    fields.insert(
        "authenticationToken".to_string(),
        json!(pass.authentication_token),
    );
    fields.insert("serialNumber".to_string(), json!(pass.serial_number));
    fields.insert(
        "passTypeIdentifier".to_string(),
        json!(identity.pass_type_id),
    );

    let style_template = pass
        .data
        .get("styleTemplate")
        .and_then(|v| v.as_str())
        .unwrap_or("generic")
        .to_string();

    let bytes = state
        .serializer
        .serialize(&payload, &style_template, &identity)
        .await?;

    Ok((
        [(header::CONTENT_TYPE, "application/vnd.apple.pkpass")],
        bytes,
    ))
}

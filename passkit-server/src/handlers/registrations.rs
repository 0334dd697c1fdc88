//! Device registration handlers: register, unregister, and the
//! unauthenticated list-changed-serials endpoint.

use crate::error::GatewayError;
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{Extensions, StatusCode};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use passkit_core::push::unwrap_push_token;
use passkit_core::Pass;
use serde::{Deserialize, Serialize};

/// `POST /v1/devices/{dlid}/registrations/{passTypeID}/{serial}`
///
/// Body is the device push token, either plain or JSON-wrapped as
/// `{"pushToken": "..."}`. Registration bookkeeping is idempotent.
pub async fn register(
    State(state): State<AppState>,
    Path((device_library_id, _pass_type_id, serial_number)): Path<(String, String, String)>,
    extensions: Extensions,
    body: Bytes,
) -> Result<StatusCode, GatewayError> {
    let pass = extensions
        .get::<Pass>()
        .ok_or(GatewayError::Unauthorized)?;
    if pass.serial_number != serial_number {
        return Err(GatewayError::Forbidden);
    }

    let raw = std::str::from_utf8(&body)
        .map_err(|_| GatewayError::BadRequest("push token is not UTF-8".to_string()))?;
    let push_token = unwrap_push_token(raw)
        .ok_or_else(|| GatewayError::BadRequest("missing push token".to_string()))?;

    let device = state.store.upsert_device(&device_library_id, &push_token)?;
    state.store.upsert_registration(&pass.id, &device.id)?;

    Ok(StatusCode::OK)
}

/// `DELETE /v1/devices/{dlid}/registrations/{passTypeID}/{serial}`
///
/// Removing an absent registration is still a 200; only an unknown device
/// is a 404.
pub async fn unregister(
    State(state): State<AppState>,
    Path((device_library_id, _pass_type_id, serial_number)): Path<(String, String, String)>,
    extensions: Extensions,
) -> Result<StatusCode, GatewayError> {
    let pass = extensions
        .get::<Pass>()
        .ok_or(GatewayError::Unauthorized)?;
    if pass.serial_number != serial_number {
        return Err(GatewayError::Forbidden);
    }

    let device = state
        .store
        .device_by_identifier(&device_library_id)?
        .ok_or(GatewayError::NotFound)?;

    state.store.delete_registration(&pass.id, &device.id)?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(rename = "passesUpdatedSince")]
    passes_updated_since: Option<String>,
}

#[derive(Serialize)]
pub struct SerialsResponse {
    #[serde(rename = "serialNumbers")]
    pub serial_numbers: Vec<String>,
    #[serde(rename = "lastUpdated")]
    pub last_updated: String,
}

/// `GET /v1/devices/{dlid}/registrations/{passTypeID}?passesUpdatedSince=`
///
/// Deliberately unauthenticated: the scope is device + pass type, not one
/// pass's secret. Unknown pass types and unknown devices both yield the
/// empty list, never an error, and the response shape never changes.
pub async fn list_updated(
    State(state): State<AppState>,
    Path((device_library_id, pass_type_id)): Path<(String, String)>,
    Query(query): Query<ListQuery>,
) -> Result<Json<SerialsResponse>, GatewayError> {
    let since = match query.passes_updated_since.as_deref() {
        None => None,
        Some(tag) => Some(tag.parse::<i64>().map_err(|_| {
            GatewayError::BadRequest("passesUpdatedSince must be Unix seconds".to_string())
        })?),
    };

    let serials = match state.credentials.by_pass_type(&pass_type_id)? {
        None => Vec::new(),
        Some(identity) => match state.store.device_by_identifier(&device_library_id)? {
            None => Vec::new(),
            Some(device) => state
                .store
                .serials_updated_since(&device.id, &identity.id, since)?,
        },
    };

    Ok(Json(SerialsResponse {
        serial_numbers: serials,
        last_updated: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    }))
}

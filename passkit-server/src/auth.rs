//! ApplePass token auth middleware.
//!
//! Every protocol endpoint except list-changed-serials requires
//! `Authorization: ApplePass <token>`, where the token must exactly match
//! a pass's authentication token. The matched pass is placed in request
//! extensions for the handler; failures reject with 401 before any other
//! processing.

use crate::error::GatewayError;
use crate::server::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::Response;

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(GatewayError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("ApplePass ")
        .ok_or(GatewayError::Unauthorized)?
        .trim();

    let pass = state
        .store
        .pass_by_auth_token(token)?
        .ok_or(GatewayError::Unauthorized)?;

    request.extensions_mut().insert(pass);
    Ok(next.run(request).await)
}

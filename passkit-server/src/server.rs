//! Axum router setup.

use crate::auth::auth_middleware;
use crate::config::ServerConfig;
use crate::handlers::{logs, passes, registrations};
use axum::middleware;
use axum::routing::get;
use axum::Router;
use passkit_core::{CredentialPool, PassSerializer, Store};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub credentials: CredentialPool,
    pub serializer: Arc<dyn PassSerializer>,
    pub web_service_url: String,
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    // Token-authenticated wallet protocol routes
    let authenticated = Router::new()
        .route(
            "/v1/devices/{device_library_id}/registrations/{pass_type_id}/{serial_number}",
            axum::routing::post(registrations::register).delete(registrations::unregister),
        )
        .route(
            "/v1/passes/{pass_type_id}/{serial_number}",
            get(passes::fetch_pass),
        )
        .route("/v1/log", axum::routing::post(logs::ingest))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Unauthenticated routes. The list endpoint is deliberately open: it is
    // scoped by device + pass type, not by one pass's secret.
    let public = Router::new()
        .route(
            "/v1/devices/{device_library_id}/registrations/{pass_type_id}",
            get(registrations::list_updated),
        )
        .route("/health", get(health));

    Router::new()
        .merge(authenticated)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.max_payload_size))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

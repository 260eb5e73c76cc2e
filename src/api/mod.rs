//! Route definitions for the device exchange API.

pub mod handlers;

use axum::{
    routing::{post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::protocol::Gateway;

/// Device routes (v1)
pub fn device_routes() -> Router<Arc<Gateway>> {
    Router::new()
        .route("/v1/smart_devices/:mac_address", put(handlers::connect))
        .route("/v1/smart_devices/:mac_address/config", post(handlers::config))
        .route(
            "/v1/smart_devices/:mac_address/readings",
            post(handlers::readings),
        )
}

pub fn build_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .merge(device_routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(gateway)
}

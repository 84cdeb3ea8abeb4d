// Module: http
// HTTP/JSON signaling: one control router plus one router per endpoint

pub mod control;
pub mod error;
pub mod health;
pub mod signaling;

use axum::{
    routing::{get, post},
    Router,
};
use relaygate_sfu::{EndpointId, EndpointPool, PreviewEncoder};
use std::sync::{Arc, Weak};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult, ErrorResponse};

/// State of the control listener
#[derive(Clone)]
pub struct ControlState {
    pub pool: Arc<EndpointPool>,
    pub preview: Option<Arc<dyn PreviewEncoder>>,
}

/// State of one endpoint's listener
///
/// Holds the pool weakly: the pool owns the endpoint, which owns this router.
#[derive(Clone)]
pub struct EndpointState {
    pub pool: Weak<EndpointPool>,
    pub endpoint_id: EndpointId,
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Router for the control address: discovery, status, health
pub fn create_control_router(state: ControlState) -> Router {
    Router::new()
        .merge(health::create_health_router())
        .route("/control/offer", post(control::discover))
        .route("/stats", get(control::stats))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router served on each endpoint's own port
pub fn create_endpoint_router(state: EndpointState) -> Router {
    Router::new()
        .merge(health::create_health_router())
        .route("/port/offer", post(signaling::port_offer))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

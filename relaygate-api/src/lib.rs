//! relaygate signaling API
//!
//! HTTP/JSON surface of the scheduler:
//! - control router (discovery, status, health)
//! - per-endpoint negotiation router and the TCP binder that serves it
//! - a signaling client for the same protocol

pub mod binder;
pub mod client;
pub mod http;

pub use binder::TcpEndpointBinder;
pub use client::{ClientError, SignalingClient};
pub use http::{create_control_router, create_endpoint_router, AppError, ControlState, EndpointState};

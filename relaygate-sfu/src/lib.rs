//! relaygate session scheduler
//!
//! Admits real-time media sessions onto a pool of signaling endpoints and
//! keeps every endpoint under a bitrate admission threshold.
//!
//! ## Architecture
//!
//! - **`EndpointPool`**: least-loaded endpoint selection, on-demand provisioning
//! - **`Endpoint`**: one signaling listener and its `SessionRegistry`
//! - **`Session`**: one client transport, driven by a pure state machine
//! - **`BitrateEstimator`**: byte-counter deltas turned into bits per second
//! - **`TransportEngine`**: boundary to the media stack (`WebRtcEngine` in production)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relaygate_sfu::{EndpointPool, PoolConfig, WebRtcEngine};
//!
//! let engine = Arc::new(WebRtcEngine::new(ice_servers)?);
//! let pool = EndpointPool::new(PoolConfig::default(), engine, binder);
//!
//! let endpoint = pool.assign().await?;
//! let negotiated = pool.negotiate(endpoint.id(), remote_addr, offer).await?;
//! ```

mod bitrate;
mod config;
mod endpoint;
mod engine;
mod error;
mod pool;
mod preview;
mod registry;
mod relay;
mod session;
mod state;
mod types;
mod webrtc_engine;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use bitrate::BitrateEstimator;
pub use config::{PoolConfig, DEFAULT_ADMISSION_THRESHOLD_BPS};
pub use endpoint::{Endpoint, EndpointBinder, ListenerHandle};
pub use engine::{
    ConnectivitySignal, IceCandidate, PeerEvent, PeerEventReceiver, PeerEventSender, PeerHandle,
    SdpType, SessionDescription, TransportEngine, TransportSample,
};
pub use error::{EngineError, Error, Result};
pub use pool::{EndpointPool, NegotiatedSession, SessionSnapshot};
pub use preview::PreviewEncoder;
pub use registry::{SessionList, SessionRegistry};
pub use relay::{MediaPacket, MediaRelay, TrackKind, RELAY_CHANNEL_CAPACITY};
pub use session::Session;
pub use state::{transition, InvalidTransition, SessionEffect, SessionState};
pub use types::{EndpointId, SessionId};
pub use webrtc_engine::WebRtcEngine;

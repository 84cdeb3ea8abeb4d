//! Scheduler error taxonomy

use thiserror::Error;

use crate::types::{EndpointId, SessionId};

/// Failure reported by the media engine
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// The engine refused a description, candidate, or peer configuration
    #[error("rejected by media engine: {0}")]
    Rejected(String),

    /// No transport statistics are available yet
    #[error("transport statistics unavailable")]
    StatsUnavailable,

    /// Any other engine-side failure
    #[error("media engine error: {0}")]
    Engine(String),
}

#[derive(Error, Debug)]
pub enum Error {
    /// A new endpoint could not bind its listener
    #[error("failed to provision endpoint {port}: {reason}")]
    Provisioning { port: u32, reason: String },

    /// The offer was rejected or the handshake failed
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// The target endpoint does not exist or is shutting down
    #[error("endpoint {0} is unavailable")]
    EndpointUnavailable(EndpointId),

    /// A session was offered to a registry it does not belong to
    #[error("session {session} belongs to endpoint {owner}, not {registry}")]
    EndpointMismatch {
        session: SessionId,
        owner: EndpointId,
        registry: EndpointId,
    },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A listener task could not be stopped cleanly
    #[error("failed to stop listener of endpoint {endpoint}: {reason}")]
    ListenerStop { endpoint: EndpointId, reason: String },

    /// The pool was shut down and provisions nothing further
    #[error("endpoint pool is shut down")]
    PoolShutDown,

    /// Some endpoints failed to shut down; every endpoint was still attempted
    #[error("shutdown incomplete: {}", .0.join("; "))]
    ShutdownIncomplete(Vec<String>),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type Result<T> = std::result::Result<T, Error>;

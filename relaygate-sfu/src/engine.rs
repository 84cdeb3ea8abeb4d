//! Boundary to the media engine that owns ICE, DTLS, and RTP
//!
//! The scheduler never talks to a peer connection directly. It drives peers
//! through [`PeerHandle`] and receives their callbacks as [`PeerEvent`]s on a
//! channel, so the whole admission layer can run against an in-memory engine
//! in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::error::EngineError;
use crate::relay::MediaRelay;

/// SDP message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// An SDP offer or answer as carried by the signaling protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Offer,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Answer,
        }
    }
}

/// ICE candidate in the browser's `RTCIceCandidateInit` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// One reading of a peer's transport counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportSample {
    /// Monotonic time the engine took the reading
    pub timestamp: Instant,
    /// Cumulative bytes received on the transport
    pub bytes_received: u64,
}

/// Connectivity state reported by the engine's ICE agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivitySignal {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// Callback from the engine, delivered in order per peer
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// ICE connection state changed; `raw` is the engine's own name for it
    Connectivity {
        signal: ConnectivitySignal,
        raw: String,
    },
    /// A local candidate was gathered
    CandidateDiscovered(IceCandidate),
    /// The remote side started sending a track
    Track(MediaRelay),
}

pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;
pub type PeerEventReceiver = mpsc::UnboundedReceiver<PeerEvent>;

/// Factory for peer contexts
#[async_trait]
pub trait TransportEngine: Send + Sync + 'static {
    /// Create a peer that reports its callbacks on `events`
    async fn create_peer(&self, events: PeerEventSender) -> Result<Arc<dyn PeerHandle>, EngineError>;
}

/// One peer context inside the engine
#[async_trait]
pub trait PeerHandle: Send + Sync + 'static {
    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), EngineError>;

    async fn create_answer(&self) -> Result<SessionDescription, EngineError>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), EngineError>;

    async fn local_description(&self) -> Option<SessionDescription>;

    /// Resolves once local candidate gathering has finished
    async fn gathering_complete(&self);

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError>;

    /// Fetch a fresh transport statistics reading
    async fn transport_sample(&self) -> Result<TransportSample, EngineError>;

    /// Close the peer; closing twice is not an error
    async fn close(&self) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_wire_format() {
        let json = serde_json::to_value(SessionDescription::answer("v=0")).unwrap();
        assert_eq!(json, serde_json::json!({"sdp": "v=0", "type": "answer"}));

        let parsed: SessionDescription =
            serde_json::from_str(r#"{"sdp":"v=0","type":"offer"}"#).unwrap();
        assert_eq!(parsed.sdp_type, SdpType::Offer);
    }

    #[test]
    fn test_candidate_accepts_browser_shape() {
        let parsed: IceCandidate = serde_json::from_str(
            r#"{"candidate":"candidate:1 1 udp 2130706431 10.0.0.2 50000 typ host","sdpMid":"0","sdpMLineIndex":0}"#,
        )
        .unwrap();
        assert_eq!(parsed.sdp_mid.as_deref(), Some("0"));
        assert_eq!(parsed.sdp_mline_index, Some(0));
        assert!(parsed.username_fragment.is_none());
    }
}

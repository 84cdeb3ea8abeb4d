//! [`TransportEngine`] backed by the `webrtc` crate

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::stats::StatsReportType;

use crate::engine::{
    ConnectivitySignal, IceCandidate, PeerEvent, PeerEventSender, PeerHandle, SdpType,
    SessionDescription, TransportEngine, TransportSample,
};
use crate::error::EngineError;
use crate::relay::{MediaPacket, MediaRelay, TrackKind};

impl From<webrtc::Error> for EngineError {
    fn from(e: webrtc::Error) -> Self {
        Self::Engine(e.to_string())
    }
}

pub struct WebRtcEngine {
    api: API,
    ice_servers: Vec<RTCIceServer>,
}

impl WebRtcEngine {
    /// Build an engine with the default codecs and interceptors
    pub fn new(ice_servers: Vec<String>) -> Result<Self, EngineError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: ice_servers,
                ..Default::default()
            }]
        };

        Ok(Self { api, ice_servers })
    }
}

#[async_trait]
impl TransportEngine for WebRtcEngine {
    async fn create_peer(&self, events: PeerEventSender) -> Result<Arc<dyn PeerHandle>, EngineError> {
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };
        let pc = Arc::new(self.api.new_peer_connection(config).await?);

        let tx = events.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            if let Some(signal) = connectivity_signal(state) {
                let _ = tx.send(PeerEvent::Connectivity {
                    signal,
                    raw: state.to_string(),
                });
            }
            Box::pin(async {})
        }));

        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            if let Some(candidate) = candidate {
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = tx.send(PeerEvent::CandidateDiscovered(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        }));
                    }
                    Err(e) => debug!(error = %e, "Failed to serialize local candidate"),
                }
            }
            Box::pin(async {})
        }));

        let tx = events;
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let kind = match track.kind() {
                RTPCodecType::Audio => TrackKind::Audio,
                _ => TrackKind::Video,
            };
            let relay = MediaRelay::new(kind, track.codec().capability.mime_type);
            let _ = tx.send(PeerEvent::Track(relay.clone()));

            Box::pin(async move {
                tokio::spawn(async move {
                    loop {
                        match track.read_rtp().await {
                            Ok((packet, _)) => {
                                relay.publish(MediaPacket {
                                    payload: packet.payload,
                                    ssrc: packet.header.ssrc,
                                    sequence_number: packet.header.sequence_number,
                                    timestamp: packet.header.timestamp,
                                    marker: packet.header.marker,
                                    received_at: Instant::now(),
                                });
                            }
                            Err(e) => {
                                debug!(error = %e, kind = ?relay.kind(), "Inbound track ended");
                                break;
                            }
                        }
                    }
                });
            })
        }));

        Ok(Arc::new(WebRtcPeer { pc }))
    }
}

fn connectivity_signal(state: RTCIceConnectionState) -> Option<ConnectivitySignal> {
    Some(match state {
        RTCIceConnectionState::New => ConnectivitySignal::New,
        RTCIceConnectionState::Checking => ConnectivitySignal::Checking,
        RTCIceConnectionState::Connected => ConnectivitySignal::Connected,
        RTCIceConnectionState::Completed => ConnectivitySignal::Completed,
        RTCIceConnectionState::Disconnected => ConnectivitySignal::Disconnected,
        RTCIceConnectionState::Failed => ConnectivitySignal::Failed,
        RTCIceConnectionState::Closed => ConnectivitySignal::Closed,
        RTCIceConnectionState::Unspecified => return None,
    })
}

struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription, EngineError> {
    let rejected = |e: webrtc::Error| EngineError::Rejected(e.to_string());
    match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp).map_err(rejected),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp).map_err(rejected),
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp).map_err(rejected),
        SdpType::Rollback => Err(EngineError::Rejected("rollback is not supported".to_string())),
    }
}

fn from_rtc(description: RTCSessionDescription) -> Option<SessionDescription> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => return None,
    };
    Some(SessionDescription {
        sdp: description.sdp,
        sdp_type,
    })
}

#[async_trait]
impl PeerHandle for WebRtcPeer {
    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), EngineError> {
        let description = to_rtc(description)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(|e| EngineError::Rejected(e.to_string()))
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        let answer = self.pc.create_answer(None).await?;
        from_rtc(answer).ok_or_else(|| EngineError::Engine("answer has no type".to_string()))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), EngineError> {
        let description = to_rtc(description)?;
        self.pc.set_local_description(description).await?;
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.pc.local_description().await.and_then(from_rtc)
    }

    async fn gathering_complete(&self) {
        let mut done = self.pc.gathering_complete_promise().await;
        let _ = done.recv().await;
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await
            .map_err(|e| EngineError::Rejected(e.to_string()))
    }

    async fn transport_sample(&self) -> Result<TransportSample, EngineError> {
        let stats = self.pc.get_stats().await;
        stats
            .reports
            .values()
            .find_map(|report| match report {
                StatsReportType::Transport(transport) => Some(TransportSample {
                    timestamp: Instant::from(transport.timestamp),
                    bytes_received: transport.bytes_received as u64,
                }),
                _ => None,
            })
            .ok_or(EngineError::StatsUnavailable)
    }

    async fn close(&self) -> Result<(), EngineError> {
        if let Err(e) = self.pc.close().await {
            warn!(error = %e, "Peer connection close failed");
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unspecified_state_is_not_a_signal() {
        assert_eq!(connectivity_signal(RTCIceConnectionState::Unspecified), None);
        assert_eq!(
            connectivity_signal(RTCIceConnectionState::Checking),
            Some(ConnectivitySignal::Checking)
        );
    }

    #[test]
    fn test_rollback_is_rejected() {
        let rollback = SessionDescription {
            sdp: String::new(),
            sdp_type: SdpType::Rollback,
        };
        assert!(matches!(to_rtc(rollback), Err(EngineError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_create_peer_without_ice_servers() {
        let engine = WebRtcEngine::new(Vec::new()).unwrap();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let peer = engine.create_peer(tx).await.unwrap();

        assert!(peer.local_description().await.is_none());
        peer.close().await.unwrap();
    }
}

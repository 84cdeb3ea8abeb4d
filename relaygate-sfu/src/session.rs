//! A single admitted client session

use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bitrate::BitrateEstimator;
use crate::engine::{ConnectivitySignal, IceCandidate, PeerHandle};
use crate::error::Result;
use crate::relay::{MediaRelay, TrackKind};
use crate::state::{transition, InvalidTransition, SessionEffect, SessionState};
use crate::types::{EndpointId, SessionId};

/// Session bound to exactly one endpoint for its whole lifetime
pub struct Session {
    id: SessionId,
    endpoint_id: EndpointId,
    remote_addr: SocketAddr,
    created_at: Instant,

    peer: Arc<dyn PeerHandle>,
    media: RwLock<Option<MediaRelay>>,
    estimator: Mutex<BitrateEstimator>,

    state: Mutex<SessionState>,
    /// Engine's own name for the last ICE connection state
    ice_state: RwLock<String>,

    closed: AtomicBool,
    /// Cancelled on close; stops the session's event driver
    cancel: CancellationToken,
}

impl Session {
    pub fn new(
        id: SessionId,
        endpoint_id: EndpointId,
        remote_addr: SocketAddr,
        peer: Arc<dyn PeerHandle>,
    ) -> Self {
        Self {
            id,
            endpoint_id,
            remote_addr,
            created_at: Instant::now(),
            peer,
            media: RwLock::new(None),
            estimator: Mutex::new(BitrateEstimator::new()),
            state: Mutex::new(SessionState::New),
            ice_state: RwLock::new("new".to_string()),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub const fn endpoint_id(&self) -> EndpointId {
        self.endpoint_id
    }

    #[must_use]
    pub const fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }

    #[must_use]
    pub fn peer(&self) -> &Arc<dyn PeerHandle> {
        &self.peer
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    #[must_use]
    pub fn ice_state(&self) -> String {
        self.ice_state.read().clone()
    }

    pub fn set_ice_state(&self, raw: impl Into<String>) {
        *self.ice_state.write() = raw.into();
    }

    #[must_use]
    pub fn media(&self) -> Option<MediaRelay> {
        self.media.read().clone()
    }

    /// Record the inbound track; the first video track wins over audio
    pub fn attach_media(&self, relay: MediaRelay) {
        let mut media = self.media.write();
        let replace = match media.as_ref() {
            None => true,
            Some(current) => {
                current.kind() != TrackKind::Video && relay.kind() == TrackKind::Video
            }
        };
        if replace {
            *media = Some(relay);
        }
    }

    /// Apply a connectivity signal and return the effects to carry out
    pub fn apply_signal(
        &self,
        signal: ConnectivitySignal,
    ) -> std::result::Result<Vec<SessionEffect>, InvalidTransition> {
        let mut state = self.state.lock();
        let (next, effects) = transition(*state, signal)?;
        if next != *state {
            debug!(session_id = %self.id, from = ?*state, to = ?next, "Session state changed");
        }
        *state = next;
        Ok(effects)
    }

    /// Current inbound bitrate in bits per second
    ///
    /// Consumes the estimator's previous reading. When the engine has no
    /// statistics to offer the session reports 0 and its baseline is kept.
    pub async fn sample_bitrate(&self) -> f64 {
        match self.peer.transport_sample().await {
            Ok(sample) => self.estimator.lock().observe(sample),
            Err(e) => {
                debug!(session_id = %self.id, error = %e, "Transport sample unavailable");
                0.0
            }
        }
    }

    pub async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.peer.add_ice_candidate(candidate).await?;
        Ok(())
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release the peer context; only the first call does any work
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        if let Err(e) = self.peer.close().await {
            debug!(session_id = %self.id, error = %e, "Peer close reported an error");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("endpoint_id", &self.endpoint_id)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePeer;

    fn session(peer: Arc<FakePeer>) -> Session {
        let addr: SocketAddr = "10.0.0.2:50000".parse().unwrap();
        Session::new(
            SessionId::generate(EndpointId::new(16666), addr.ip()),
            EndpointId::new(16666),
            addr,
            peer,
        )
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let peer = FakePeer::new();
        let session = session(peer.clone());

        session.close().await;
        session.close().await;

        assert!(session.is_closed());
        assert!(session.cancel_token().is_cancelled());
        assert_eq!(peer.close_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_stats_reports_zero_and_keeps_baseline() {
        let peer = FakePeer::new();
        let session = session(peer.clone());
        let t0 = Instant::now();

        peer.push_sample(t0, 1000);
        assert_eq!(session.sample_bitrate().await, 0.0);

        // Queue is empty now, so the engine reports no statistics
        assert_eq!(session.sample_bitrate().await, 0.0);

        peer.push_sample(t0 + std::time::Duration::from_secs(1), 2000);
        let bps = session.sample_bitrate().await;
        assert!((bps - 8000.0).abs() < 1e-9);
    }

    #[test]
    fn test_video_track_preferred() {
        let session = session(FakePeer::new());

        session.attach_media(MediaRelay::new(TrackKind::Audio, "audio/opus"));
        session.attach_media(MediaRelay::new(TrackKind::Video, "video/VP8"));
        session.attach_media(MediaRelay::new(TrackKind::Audio, "audio/opus"));

        assert_eq!(session.media().unwrap().kind(), TrackKind::Video);
    }

    #[test]
    fn test_signals_drive_state() {
        let session = session(FakePeer::new());

        assert!(session.apply_signal(ConnectivitySignal::Checking).unwrap().is_empty());
        assert!(session.apply_signal(ConnectivitySignal::Connected).unwrap().is_empty());
        assert_eq!(session.state(), SessionState::Connected);

        let effects = session.apply_signal(ConnectivitySignal::Failed).unwrap();
        assert_eq!(
            effects,
            vec![SessionEffect::CloseTransport, SessionEffect::RemoveSession]
        );
        assert!(session.apply_signal(ConnectivitySignal::Checking).is_err());
    }
}

//! In-memory engine and binder for tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::endpoint::{EndpointBinder, ListenerHandle};
use crate::engine::{
    ConnectivitySignal, IceCandidate, PeerEvent, PeerEventSender, PeerHandle, SessionDescription,
    TransportEngine, TransportSample,
};
use crate::error::{EngineError, Error, Result};
use crate::pool::EndpointPool;
use crate::types::EndpointId;

/// Answer SDP produced by every [`FakePeer`]
pub const FAKE_ANSWER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

/// Peer whose transport readings are scripted by the test
#[derive(Default)]
pub struct FakePeer {
    samples: Mutex<VecDeque<TransportSample>>,
    events: Mutex<Option<PeerEventSender>>,
    remote: Mutex<Option<SessionDescription>>,
    local: Mutex<Option<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidate>>,
    reject_offer: AtomicBool,
    close_count: AtomicUsize,
}

impl FakePeer {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a reading for the next `transport_sample` call
    pub fn push_sample(&self, timestamp: Instant, bytes_received: u64) {
        self.samples.lock().push_back(TransportSample {
            timestamp,
            bytes_received,
        });
    }

    /// Readings not yet consumed by a sampling pass
    #[must_use]
    pub fn pending_samples(&self) -> usize {
        self.samples.lock().len()
    }

    /// Deliver a connectivity signal as the engine would
    pub fn emit(&self, signal: ConnectivitySignal) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(PeerEvent::Connectivity {
                signal,
                raw: format!("{signal:?}").to_lowercase(),
            });
        }
    }

    pub fn emit_event(&self, event: PeerEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn set_reject_offer(&self, reject: bool) {
        self.reject_offer.store(reject, Ordering::SeqCst);
    }

    #[must_use]
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    #[must_use]
    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().clone()
    }
}

#[async_trait]
impl PeerHandle for FakePeer {
    async fn set_remote_description(&self, description: SessionDescription) -> std::result::Result<(), EngineError> {
        if self.reject_offer.load(Ordering::SeqCst) {
            return Err(EngineError::Rejected("malformed offer".to_string()));
        }
        *self.remote.lock() = Some(description);
        Ok(())
    }

    async fn create_answer(&self) -> std::result::Result<SessionDescription, EngineError> {
        Ok(SessionDescription::answer(FAKE_ANSWER_SDP))
    }

    async fn set_local_description(&self, description: SessionDescription) -> std::result::Result<(), EngineError> {
        *self.local.lock() = Some(description);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    async fn gathering_complete(&self) {}

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> std::result::Result<(), EngineError> {
        self.candidates.lock().push(candidate);
        Ok(())
    }

    async fn transport_sample(&self) -> std::result::Result<TransportSample, EngineError> {
        self.samples.lock().pop_front().ok_or(EngineError::StatsUnavailable)
    }

    async fn close(&self) -> std::result::Result<(), EngineError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Engine handing out [`FakePeer`]s and remembering each of them
#[derive(Default)]
pub struct FakeEngine {
    peers: Mutex<Vec<Arc<FakePeer>>>,
    reject_offers: AtomicBool,
    fail_create: AtomicBool,
}

impl FakeEngine {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every subsequently created peer reject its offer
    pub fn set_reject_offers(&self, reject: bool) {
        self.reject_offers.store(reject, Ordering::SeqCst);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn peers(&self) -> Vec<Arc<FakePeer>> {
        self.peers.lock().clone()
    }

    #[must_use]
    pub fn last_peer(&self) -> Option<Arc<FakePeer>> {
        self.peers.lock().last().cloned()
    }
}

#[async_trait]
impl TransportEngine for FakeEngine {
    async fn create_peer(&self, events: PeerEventSender) -> std::result::Result<Arc<dyn PeerHandle>, EngineError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(EngineError::Engine("peer factory unavailable".to_string()));
        }
        let peer = FakePeer::new();
        *peer.events.lock() = Some(events);
        peer.set_reject_offer(self.reject_offers.load(Ordering::SeqCst));
        self.peers.lock().push(Arc::clone(&peer));
        Ok(peer)
    }
}

/// Binder that opens no socket; its listeners idle until cancelled
#[derive(Default)]
pub struct FakeBinder {
    bound: Mutex<Vec<EndpointId>>,
    fail_ports: Mutex<HashSet<u16>>,
    stopped: Arc<AtomicUsize>,
}

impl FakeBinder {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make binding `port` fail as if it were already in use
    pub fn fail_on(&self, port: u16) {
        self.fail_ports.lock().insert(port);
    }

    #[must_use]
    pub fn bound(&self) -> Vec<EndpointId> {
        self.bound.lock().clone()
    }

    /// Listeners that have observed their cancellation
    #[must_use]
    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EndpointBinder for FakeBinder {
    async fn bind(&self, id: EndpointId, _pool: Weak<EndpointPool>) -> Result<ListenerHandle> {
        if self.fail_ports.lock().contains(&id.port()) {
            return Err(Error::Provisioning {
                port: u32::from(id.port()),
                reason: "address in use".to_string(),
            });
        }
        self.bound.lock().push(id);

        let cancel = CancellationToken::new();
        let stopped = Arc::clone(&self.stopped);
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            token.cancelled().await;
            stopped.fetch_add(1, Ordering::SeqCst);
        });

        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, id.port()));
        Ok(ListenerHandle::new(addr, cancel, task))
    }
}

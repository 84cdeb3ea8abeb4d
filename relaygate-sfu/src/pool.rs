//! Endpoint pool - least-loaded admission with on-demand expansion
//!
//! The pool owns every endpoint and the global session list. New sessions go
//! to the endpoint with the lowest measured load as long as that load is at
//! or below the admission threshold; otherwise a fresh endpoint is bound.

use dashmap::DashMap;
use futures::future::join_all;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::endpoint::{Endpoint, EndpointBinder};
use crate::engine::{
    IceCandidate, PeerEvent, PeerEventReceiver, SdpType, SessionDescription, TransportEngine,
};
use crate::error::{EngineError, Error, Result};
use crate::registry::SessionList;
use crate::relay::MediaRelay;
use crate::session::Session;
use crate::state::{SessionEffect, SessionState};
use crate::types::{EndpointId, SessionId};

/// Result of a successful offer/answer exchange
#[derive(Debug, Clone)]
pub struct NegotiatedSession {
    pub session_id: SessionId,
    pub answer: SessionDescription,
}

/// Point-in-time view of one session
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub endpoint_id: EndpointId,
    pub remote_addr: SocketAddr,
    /// Bitrate over the interval since the previous sample
    pub bps: f64,
    /// Load of the owning endpoint, summed over the same sampling pass
    pub endpoint_bps: f64,
    pub state: SessionState,
    pub ice_state: String,
    pub media: Option<MediaRelay>,
}

pub struct EndpointPool {
    config: PoolConfig,
    engine: Arc<dyn TransportEngine>,
    binder: Arc<dyn EndpointBinder>,

    endpoints: DashMap<EndpointId, Arc<Endpoint>>,
    sessions: SessionList,

    /// Next endpoint identifier; never moves backwards, even on bind failure
    next_id: AtomicU32,
    /// Serializes assignment so concurrent discoveries cannot both provision
    provisioning: Mutex<()>,

    /// Stops background tasks
    cancel: CancellationToken,
}

impl EndpointPool {
    /// Create a pool and start its background load sampler
    pub fn new(
        config: PoolConfig,
        engine: Arc<dyn TransportEngine>,
        binder: Arc<dyn EndpointBinder>,
    ) -> Arc<Self> {
        let pool = Arc::new(Self {
            next_id: AtomicU32::new(u32::from(config.first_port)),
            config,
            engine,
            binder,
            endpoints: DashMap::new(),
            sessions: Arc::new(DashMap::new()),
            provisioning: Mutex::new(()),
            cancel: CancellationToken::new(),
        });

        info!(
            first_port = pool.config.first_port,
            admission_threshold_bps = pool.config.admission_threshold_bps,
            "Endpoint pool initialized"
        );

        if let Some(period) = pool.config.sample_interval {
            Self::spawn_sampler(&pool, period);
        }

        pool
    }

    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[must_use]
    pub fn endpoint(&self, id: EndpointId) -> Option<Arc<Endpoint>> {
        self.endpoints.get(&id).map(|e| Arc::clone(e.value()))
    }

    /// Every endpoint, ordered by identifier
    #[must_use]
    pub fn endpoints(&self) -> Vec<Arc<Endpoint>> {
        let mut endpoints: Vec<_> = self.endpoints.iter().map(|e| Arc::clone(e.value())).collect();
        endpoints.sort_by_key(|e| e.id());
        endpoints
    }

    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|s| Arc::clone(s.value()))
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Pick the endpoint that should host the next session
    ///
    /// Samples every endpoint's load once. The least-loaded endpoint wins if
    /// its load is at or below the threshold; ties go to the lower identifier.
    /// Otherwise a new endpoint is provisioned and returned.
    pub async fn assign(self: &Arc<Self>) -> Result<Arc<Endpoint>> {
        let _guard = self.provisioning.lock().await;
        if self.cancel.is_cancelled() {
            return Err(Error::PoolShutDown);
        }

        let endpoints = self.endpoints();
        let loads = join_all(endpoints.iter().map(|e| e.current_load())).await;

        // Input is ordered by id and min_by keeps the first of equal minima;
        // partial_cmp treats -0.0 and 0.0 as equal
        let least = endpoints
            .into_iter()
            .zip(loads)
            .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        if let Some((endpoint, load)) = least {
            if load <= self.config.admission_threshold_bps {
                debug!(endpoint_id = %endpoint.id(), load_bps = load, "Assigned existing endpoint");
                return Ok(endpoint);
            }
            info!(
                endpoint_id = %endpoint.id(),
                load_bps = load,
                threshold_bps = self.config.admission_threshold_bps,
                "All endpoints above admission threshold"
            );
        }

        self.provision().await
    }

    async fn provision(self: &Arc<Self>) -> Result<Arc<Endpoint>> {
        let raw = self.next_id.fetch_add(1, Ordering::SeqCst);
        let port = u16::try_from(raw).map_err(|_| Error::Provisioning {
            port: raw,
            reason: "endpoint identifiers exhausted".to_string(),
        })?;
        let id = EndpointId::new(port);

        let listener = self
            .binder
            .bind(id, Arc::downgrade(self))
            .await
            .map_err(|e| match e {
                Error::Provisioning { .. } => e,
                other => Error::Provisioning {
                    port: raw,
                    reason: other.to_string(),
                },
            })?;

        let endpoint = Endpoint::new(id, listener, Arc::clone(&self.sessions));
        self.endpoints.insert(id, Arc::clone(&endpoint));

        info!(
            endpoint_id = %id,
            local_addr = %endpoint.local_addr(),
            total_endpoints = self.endpoints.len(),
            "Provisioned endpoint"
        );

        Ok(endpoint)
    }

    /// Admit a session on `endpoint_id` and answer its offer
    ///
    /// The session is registered before the handshake starts. If the engine
    /// rejects the offer, or the endpoint begins shutting down meanwhile, the
    /// session is removed again and its transport closed.
    pub async fn negotiate(
        self: &Arc<Self>,
        endpoint_id: EndpointId,
        remote_addr: SocketAddr,
        offer: SessionDescription,
    ) -> Result<NegotiatedSession> {
        if offer.sdp_type != SdpType::Offer {
            return Err(Error::Negotiation(format!(
                "expected an offer, got {:?}",
                offer.sdp_type
            )));
        }

        let endpoint = self
            .endpoint(endpoint_id)
            .ok_or(Error::EndpointUnavailable(endpoint_id))?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let peer = self
            .engine
            .create_peer(events_tx)
            .await
            .map_err(|e| Error::Negotiation(e.to_string()))?;

        let session_id = SessionId::generate(endpoint_id, remote_addr.ip());
        let session = Arc::new(Session::new(session_id.clone(), endpoint_id, remote_addr, peer));

        if let Err(e) = endpoint.registry().register(Arc::clone(&session)).await {
            session.close().await;
            return Err(e);
        }
        self.spawn_driver(Arc::clone(&session), events_rx);

        let answer = match self.handshake(&session, offer).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Negotiation failed");
                Self::roll_back(&endpoint, &session).await;
                return Err(Error::Negotiation(e.to_string()));
            }
        };

        if !endpoint.is_accepting().await {
            Self::roll_back(&endpoint, &session).await;
            return Err(Error::EndpointUnavailable(endpoint_id));
        }

        info!(
            session_id = %session_id,
            endpoint_id = %endpoint_id,
            remote_addr = %remote_addr,
            "Session negotiated"
        );

        Ok(NegotiatedSession { session_id, answer })
    }

    async fn handshake(
        &self,
        session: &Session,
        offer: SessionDescription,
    ) -> std::result::Result<SessionDescription, EngineError> {
        let peer = session.peer();
        peer.set_remote_description(offer).await?;
        let answer = peer.create_answer().await?;
        peer.set_local_description(answer.clone()).await?;

        let wait = self.config.ice_gathering_timeout;
        if tokio::time::timeout(wait, peer.gathering_complete()).await.is_err() {
            warn!(
                session_id = %session.id(),
                timeout_ms = wait.as_millis() as u64,
                "ICE gathering timed out, answering with candidates gathered so far"
            );
        }

        Ok(peer.local_description().await.unwrap_or(answer))
    }

    async fn roll_back(endpoint: &Endpoint, session: &Session) {
        endpoint.registry().remove(session.id()).await;
        session.close().await;
    }

    /// Pass a trickled client candidate to its session
    ///
    /// Without a session id the newest session on the endpoint opened from
    /// `remote_ip` receives it.
    pub async fn add_remote_candidate(
        &self,
        endpoint_id: EndpointId,
        session_id: Option<&SessionId>,
        remote_ip: IpAddr,
        candidate: IceCandidate,
    ) -> Result<SessionId> {
        let endpoint = self
            .endpoint(endpoint_id)
            .ok_or(Error::EndpointUnavailable(endpoint_id))?;

        let session = match session_id {
            Some(id) => endpoint.registry().get(id).await,
            None => endpoint.registry().latest_from(remote_ip).await,
        }
        .ok_or_else(|| {
            Error::SessionNotFound(
                session_id.map_or_else(|| format!("from {remote_ip}"), ToString::to_string),
            )
        })?;

        session.add_ice_candidate(candidate).await?;
        debug!(session_id = %session.id(), "Remote candidate added");
        Ok(session.id().clone())
    }

    /// Remove a session from its endpoint and the global list
    ///
    /// Returns whether anything was removed; repeated calls are no-ops.
    pub async fn remove_session(&self, id: &SessionId) -> bool {
        let owner = self.sessions.get(id).map(|s| s.endpoint_id());
        let Some(owner) = owner else {
            return false;
        };

        match self.endpoint(owner) {
            Some(endpoint) => endpoint.registry().remove(id).await.is_some(),
            None => self.sessions.remove(id).is_some(),
        }
    }

    /// Sample every session once and report its state
    pub async fn snapshot(&self) -> Vec<SessionSnapshot> {
        let endpoints = self.endpoints();
        let sampled = join_all(endpoints.iter().map(|e| e.registry().sample_sessions())).await;

        sampled
            .into_iter()
            .flat_map(|members| {
                let endpoint_bps = members.iter().fold(0.0, |total, (_, bps)| total + bps);
                members.into_iter().map(move |(session, bps)| SessionSnapshot {
                    session_id: session.id().clone(),
                    endpoint_id: session.endpoint_id(),
                    remote_addr: session.remote_addr(),
                    bps,
                    endpoint_bps,
                    state: session.state(),
                    ice_state: session.ice_state(),
                    media: session.media(),
                })
            })
            .collect()
    }

    /// Shut every endpoint down and empty the pool
    ///
    /// All endpoints are attempted; failures are collected and reported
    /// together. Later calls to `assign` are refused.
    pub async fn shutdown_all(&self) -> Result<()> {
        self.cancel.cancel();

        let endpoints = self.endpoints();
        let count = endpoints.len();
        let results = join_all(endpoints.iter().map(|e| e.shutdown())).await;

        self.endpoints.clear();
        self.sessions.clear();

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(std::result::Result::err)
            .map(|e| e.to_string())
            .collect();

        if failures.is_empty() {
            info!(endpoints = count, "Endpoint pool shut down");
            Ok(())
        } else {
            warn!(endpoints = count, failed = failures.len(), "Endpoint pool shut down with errors");
            Err(Error::ShutdownIncomplete(failures))
        }
    }

    /// Forward one peer's engine callbacks into its session
    fn spawn_driver(self: &Arc<Self>, session: Arc<Session>, mut events: PeerEventReceiver) {
        let pool = Arc::downgrade(self);
        let cancel = session.cancel_token();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    () = cancel.cancelled() => break,
                    event = events.recv() => event,
                };
                let Some(event) = event else { break };

                match event {
                    PeerEvent::Connectivity { signal, raw } => {
                        session.set_ice_state(raw);
                        let effects = match session.apply_signal(signal) {
                            Ok(effects) => effects,
                            Err(e) => {
                                debug!(session_id = %session.id(), error = %e, "Ignoring connectivity signal");
                                continue;
                            }
                        };
                        for effect in effects {
                            match effect {
                                SessionEffect::CloseTransport => session.close().await,
                                SessionEffect::RemoveSession => {
                                    if let Some(pool) = pool.upgrade() {
                                        pool.remove_session(session.id()).await;
                                    }
                                }
                            }
                        }
                        if session.state().is_terminal() {
                            info!(session_id = %session.id(), state = ?session.state(), "Session ended");
                            break;
                        }
                    }
                    PeerEvent::CandidateDiscovered(candidate) => {
                        debug!(session_id = %session.id(), candidate = %candidate.candidate, "Local candidate gathered");
                    }
                    PeerEvent::Track(relay) => {
                        info!(
                            session_id = %session.id(),
                            kind = ?relay.kind(),
                            codec = relay.codec(),
                            "Inbound track attached"
                        );
                        session.attach_media(relay);
                    }
                }
            }
        });
    }

    fn spawn_sampler(pool: &Arc<Self>, period: Duration) {
        let weak = Arc::downgrade(pool);
        let cancel = pool.cancel.clone();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            info!(interval_secs = period.as_secs(), "Starting load sampling task");

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(pool) = weak.upgrade() else { break };
                pool.sample_loads().await;
            }
        });
    }

    async fn sample_loads(&self) {
        let endpoints = self.endpoints();
        let loads = join_all(endpoints.iter().map(|e| e.current_load())).await;

        let mut total = 0.0;
        for (endpoint, load) in endpoints.iter().zip(&loads) {
            total += load;
            let sessions = endpoint.registry().len().await;
            debug!(
                endpoint_id = %endpoint.id(),
                sessions,
                load_bps = *load,
                "Endpoint load"
            );
        }

        debug!(
            endpoints = endpoints.len(),
            sessions = self.sessions.len(),
            total_bps = total,
            "Updated load statistics"
        );
    }
}

impl Drop for EndpointPool {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

//! Per-endpoint session registry
//!
//! Each endpoint owns the sessions admitted to it and mirrors every change
//! into the pool-wide session list under the same lock, so the two views
//! never disagree about membership.

use dashmap::DashMap;
use futures::future::join_all;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::session::Session;
use crate::types::{EndpointId, SessionId};

/// Handle to the pool-wide session list
pub type SessionList = Arc<DashMap<SessionId, Arc<Session>>>;

struct Inner {
    sessions: HashMap<SessionId, Arc<Session>>,
    /// Cleared once shutdown has begun; no further registrations succeed
    open: bool,
}

pub struct SessionRegistry {
    endpoint_id: EndpointId,
    inner: RwLock<Inner>,
    global: SessionList,
}

impl SessionRegistry {
    pub fn new(endpoint_id: EndpointId, global: SessionList) -> Self {
        Self {
            endpoint_id,
            inner: RwLock::new(Inner {
                sessions: HashMap::new(),
                open: true,
            }),
            global,
        }
    }

    #[must_use]
    pub const fn endpoint_id(&self) -> EndpointId {
        self.endpoint_id
    }

    /// Admit a session to this endpoint and the global list
    pub async fn register(&self, session: Arc<Session>) -> Result<()> {
        if session.endpoint_id() != self.endpoint_id {
            return Err(Error::EndpointMismatch {
                session: session.id().clone(),
                owner: session.endpoint_id(),
                registry: self.endpoint_id,
            });
        }

        let mut inner = self.inner.write().await;
        if !inner.open {
            return Err(Error::EndpointUnavailable(self.endpoint_id));
        }
        let id = session.id().clone();
        self.global.insert(id.clone(), session.clone());
        inner.sessions.insert(id.clone(), session);
        debug!(endpoint_id = %self.endpoint_id, session_id = %id, "Session registered");
        Ok(())
    }

    /// Drop a session from both views; removing twice is a no-op
    pub async fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        let mut inner = self.inner.write().await;
        let removed = inner.sessions.remove(id);
        if removed.is_some() {
            self.global.remove(id);
            debug!(endpoint_id = %self.endpoint_id, session_id = %id, "Session removed");
        }
        removed
    }

    pub async fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.inner.read().await.sessions.get(id).cloned()
    }

    /// Most recently created session opened from `ip`
    pub async fn latest_from(&self, ip: IpAddr) -> Option<Arc<Session>> {
        self.inner
            .read()
            .await
            .sessions
            .values()
            .filter(|s| s.remote_addr().ip() == ip)
            .max_by_key(|s| s.created_at())
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.sessions.is_empty()
    }

    pub async fn is_open(&self) -> bool {
        self.inner.read().await.open
    }

    /// Sum of the members' current bitrates; 0 for an empty endpoint
    ///
    /// Every member's estimator is advanced by this call.
    pub async fn current_load(&self) -> f64 {
        self.sample_sessions()
            .await
            .iter()
            .fold(0.0, |total, (_, bps)| total + bps)
    }

    /// Sample every member once, under a stable view of membership
    pub async fn sample_sessions(&self) -> Vec<(Arc<Session>, f64)> {
        let inner = self.inner.read().await;
        let members: Vec<Arc<Session>> = inner.sessions.values().cloned().collect();
        let rates = join_all(members.iter().map(|s| s.sample_bitrate())).await;
        members.into_iter().zip(rates).collect()
    }

    /// Close and drop every member, refusing any later registration
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<Session>> = {
            let mut inner = self.inner.write().await;
            inner.open = false;
            let drained: Vec<_> = inner.sessions.drain().map(|(_, s)| s).collect();
            for session in &drained {
                self.global.remove(session.id());
            }
            drained
        };

        let count = drained.len();
        join_all(drained.iter().map(|s| s.close())).await;
        if count > 0 {
            info!(endpoint_id = %self.endpoint_id, sessions = count, "Closed sessions of endpoint");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePeer;
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};

    fn session_on(endpoint: u16, addr: &str) -> (Arc<Session>, Arc<FakePeer>) {
        let addr: SocketAddr = addr.parse().unwrap();
        let peer = FakePeer::new();
        let endpoint = EndpointId::new(endpoint);
        let session = Session::new(SessionId::generate(endpoint, addr.ip()), endpoint, addr, peer.clone());
        (Arc::new(session), peer)
    }

    #[tokio::test]
    async fn test_register_mirrors_into_global() {
        let global: SessionList = Arc::new(DashMap::new());
        let registry = SessionRegistry::new(EndpointId::new(16666), global.clone());
        let (session, _) = session_on(16666, "10.0.0.2:5000");

        registry.register(session.clone()).await.unwrap();

        assert_eq!(registry.len().await, 1);
        assert!(global.contains_key(session.id()));
    }

    #[tokio::test]
    async fn test_register_rejects_foreign_session() {
        let registry = SessionRegistry::new(EndpointId::new(16666), Arc::new(DashMap::new()));
        let (session, _) = session_on(16667, "10.0.0.2:5000");

        let err = registry.register(session).await.unwrap_err();
        assert!(matches!(err, Error::EndpointMismatch { .. }));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_twice() {
        let global: SessionList = Arc::new(DashMap::new());
        let registry = SessionRegistry::new(EndpointId::new(16666), global.clone());
        let (session, _) = session_on(16666, "10.0.0.2:5000");
        registry.register(session.clone()).await.unwrap();

        assert!(registry.remove(session.id()).await.is_some());
        assert!(registry.remove(session.id()).await.is_none());
        assert!(global.is_empty());
    }

    #[tokio::test]
    async fn test_empty_load_is_zero() {
        let registry = SessionRegistry::new(EndpointId::new(16666), Arc::new(DashMap::new()));
        let load = registry.current_load().await;
        assert_eq!(load, 0.0);
        assert!(!load.is_sign_negative());
        assert_eq!(load.total_cmp(&0.0), std::cmp::Ordering::Equal);
    }

    #[tokio::test]
    async fn test_load_sums_members() {
        let registry = SessionRegistry::new(EndpointId::new(16666), Arc::new(DashMap::new()));
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(1);

        let (a, peer_a) = session_on(16666, "10.0.0.2:5000");
        let (b, peer_b) = session_on(16666, "10.0.0.3:5000");
        peer_a.push_sample(t0, 0);
        peer_a.push_sample(t1, 1000);
        peer_b.push_sample(t0, 0);
        peer_b.push_sample(t1, 500);
        registry.register(a).await.unwrap();
        registry.register(b).await.unwrap();

        assert_eq!(registry.current_load().await, 0.0);
        let load = registry.current_load().await;
        assert!((load - 12_000.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_shutdown_closes_and_refuses() {
        let global: SessionList = Arc::new(DashMap::new());
        let registry = SessionRegistry::new(EndpointId::new(16666), global.clone());
        let (session, peer) = session_on(16666, "10.0.0.2:5000");
        registry.register(session.clone()).await.unwrap();

        registry.shutdown().await;

        assert!(registry.is_empty().await);
        assert!(global.is_empty());
        assert_eq!(peer.close_count(), 1);

        let (late, _) = session_on(16666, "10.0.0.4:5000");
        assert!(matches!(
            registry.register(late).await,
            Err(Error::EndpointUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_latest_from_picks_newest() {
        let registry = SessionRegistry::new(EndpointId::new(16666), Arc::new(DashMap::new()));
        let (old, _) = session_on(16666, "10.0.0.2:5000");
        tokio::time::sleep(Duration::from_millis(2)).await;
        let (new, _) = session_on(16666, "10.0.0.2:5001");
        let (other, _) = session_on(16666, "10.0.0.9:5000");
        registry.register(old).await.unwrap();
        registry.register(new.clone()).await.unwrap();
        registry.register(other).await.unwrap();

        let found = registry.latest_from("10.0.0.2".parse().unwrap()).await.unwrap();
        assert_eq!(found.id(), new.id());
    }
}

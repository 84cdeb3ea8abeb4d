//! Signaling endpoints
//!
//! An endpoint is one signaling listener plus the registry of sessions it
//! admitted. The listener itself is opened by an [`EndpointBinder`], which
//! keeps the scheduler free of any particular HTTP stack.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::pool::EndpointPool;
use crate::registry::{SessionList, SessionRegistry};
use crate::types::EndpointId;

/// A running listener task
pub struct ListenerHandle {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Wrap a spawned listener that stops once `cancel` fires
    pub fn new(local_addr: SocketAddr, cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            local_addr,
            cancel,
            task,
        }
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and wait for in-flight requests to finish
    pub async fn shutdown(mut self, endpoint: EndpointId) -> Result<()> {
        self.cancel.cancel();
        (&mut self.task).await.map_err(|e| Error::ListenerStop {
            endpoint,
            reason: e.to_string(),
        })
    }
}

/// A handle dropped without `shutdown` still stops its listener
impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Opens the signaling listener for a freshly provisioned endpoint
#[async_trait]
pub trait EndpointBinder: Send + Sync + 'static {
    /// Bind the listener for `id`; it routes its requests back through `pool`
    async fn bind(&self, id: EndpointId, pool: Weak<EndpointPool>) -> Result<ListenerHandle>;
}

pub struct Endpoint {
    id: EndpointId,
    registry: SessionRegistry,
    listener: Mutex<Option<ListenerHandle>>,
    local_addr: SocketAddr,
}

impl Endpoint {
    pub fn new(id: EndpointId, listener: ListenerHandle, global: SessionList) -> Arc<Self> {
        let local_addr = listener.local_addr();
        Arc::new(Self {
            id,
            registry: SessionRegistry::new(id, global),
            listener: Mutex::new(Some(listener)),
            local_addr,
        })
    }

    #[must_use]
    pub const fn id(&self) -> EndpointId {
        self.id
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub async fn is_accepting(&self) -> bool {
        self.registry.is_open().await
    }

    pub async fn current_load(&self) -> f64 {
        self.registry.current_load().await
    }

    /// Close every session, then stop the listener
    ///
    /// Registrations arriving after this call starts are refused.
    pub async fn shutdown(&self) -> Result<()> {
        self.registry.shutdown().await;

        let Some(listener) = self.listener.lock().await.take() else {
            return Ok(());
        };
        match listener.shutdown(self.id).await {
            Ok(()) => {
                info!(endpoint_id = %self.id, "Endpoint stopped");
                Ok(())
            }
            Err(e) => {
                warn!(endpoint_id = %self.id, error = %e, "Endpoint listener did not stop cleanly");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ListenerHandle, CancellationToken) {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { token.cancelled().await });
        let addr = SocketAddr::from(([127, 0, 0, 1], 16666));
        (ListenerHandle::new(addr, cancel.clone(), task), cancel)
    }

    #[tokio::test]
    async fn test_drop_cancels_listener() {
        let (listener, cancel) = handle();
        assert!(!cancel.is_cancelled());

        drop(listener);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_task() {
        let (listener, cancel) = handle();
        listener.shutdown(EndpointId::new(16666)).await.unwrap();
        assert!(cancel.is_cancelled());
    }
}

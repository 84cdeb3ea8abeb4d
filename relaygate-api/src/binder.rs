//! TCP listener for provisioned endpoints

use async_trait::async_trait;
use relaygate_sfu::{EndpointBinder, EndpointId, EndpointPool, Error, ListenerHandle, Result};
use std::net::SocketAddr;
use std::sync::Weak;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::http::{create_endpoint_router, EndpointState};

/// Binds each endpoint's signaling router on `host:<endpoint id>`
#[derive(Debug, Clone)]
pub struct TcpEndpointBinder {
    host: String,
}

impl TcpEndpointBinder {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

#[async_trait]
impl EndpointBinder for TcpEndpointBinder {
    async fn bind(&self, id: EndpointId, pool: Weak<EndpointPool>) -> Result<ListenerHandle> {
        let address = format!("{}:{}", self.host, id.port());
        let provisioning = |reason: String| Error::Provisioning {
            port: u32::from(id.port()),
            reason,
        };

        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| provisioning(format!("failed to bind {address}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| provisioning(format!("failed to read local address: {e}")))?;

        let router = create_endpoint_router(EndpointState {
            pool,
            endpoint_id: id,
        });

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;

            if let Err(e) = result {
                error!(endpoint_id = %id, error = %e, "Endpoint listener error");
            }
        });

        info!(endpoint_id = %id, address = %local_addr, "Endpoint listening");

        Ok(ListenerHandle::new(local_addr, cancel, task))
    }
}

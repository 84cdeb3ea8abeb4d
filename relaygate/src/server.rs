//! Server lifecycle
//!
//! Serves the control router, waits for a shutdown signal, then stops every
//! endpoint the pool provisioned.

use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use relaygate_api::{create_control_router, ControlState};
use relaygate_core::Config;
use relaygate_sfu::EndpointPool;

pub struct RelayGateServer {
    config: Config,
    pool: Arc<EndpointPool>,
}

impl RelayGateServer {
    pub const fn new(config: Config, pool: Arc<EndpointPool>) -> Self {
        Self { config, pool }
    }

    /// Serve the control address until a shutdown signal, then shut down
    pub async fn start(self) -> anyhow::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let control_addr = self.config.control_address();
        let listener = TcpListener::bind(&control_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind control address {control_addr}: {e}"))?;
        info!("Control server listening on {}", control_addr);

        let router = create_control_router(ControlState {
            pool: Arc::clone(&self.pool),
            preview: None,
        });

        let mut rx = shutdown_rx;
        let control = tokio::spawn(async move {
            let graceful = async move {
                let _ = rx.changed().await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!("Control server error: {}", e);
            }
            info!("Control server shut down gracefully");
        });

        let result = supervise(control, shutdown_tx, shutdown_signal()).await;

        self.shutdown().await;
        result
    }

    async fn shutdown(&self) {
        info!(
            endpoints = self.pool.endpoint_count(),
            sessions = self.pool.session_count(),
            "Shutting down endpoint pool..."
        );
        if let Err(e) = self.pool.shutdown_all().await {
            warn!(error = %e, "Endpoint pool did not shut down cleanly");
        }
        info!("relaygate shut down complete");
    }
}

/// Run until `signal` fires or the control task exits on its own
///
/// Either way the control server is told to stop and awaited. An exit that
/// was not requested is an error.
async fn supervise(
    mut control: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    signal: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let stopped_early = tokio::select! {
        _ = &mut control => {
            error!("Control server stopped unexpectedly");
            true
        }
        () = signal => {
            info!("Shutdown signal received, starting graceful shutdown...");
            false
        }
    };

    let _ = shutdown_tx.send(true);
    if !control.is_finished() {
        let _ = control.await;
    }

    if stopped_early {
        anyhow::bail!("control server stopped unexpectedly");
    }
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_stops_control_task() {
        let (tx, mut rx) = watch::channel(false);
        let control = tokio::spawn(async move {
            let _ = rx.changed().await;
        });

        supervise(control, tx, async {}).await.unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_control_exit_is_error() {
        let (tx, _rx) = watch::channel(false);
        let control = tokio::spawn(async {});

        let result = supervise(control, tx, std::future::pending()).await;
        assert!(result.is_err());
    }
}

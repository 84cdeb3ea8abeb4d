mod server;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use relaygate_api::TcpEndpointBinder;
use relaygate_core::{bootstrap::load_config, logging, Config};
use relaygate_sfu::{EndpointPool, PoolConfig, WebRtcEngine};

use server::RelayGateServer;

fn pool_config(config: &Config) -> PoolConfig {
    let endpoints = &config.endpoints;
    PoolConfig {
        first_port: endpoints.first_port,
        admission_threshold_bps: endpoints.admission_threshold_bps,
        sample_interval: (endpoints.sample_interval_secs > 0)
            .then(|| Duration::from_secs(endpoints.sample_interval_secs)),
        ice_gathering_timeout: Duration::from_secs(config.webrtc.ice_gathering_timeout_secs),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load and validate configuration
    let config = load_config()?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("relaygate starting...");
    info!("Control address: {}", config.control_address());

    // 3. Media engine
    let engine = WebRtcEngine::new(config.webrtc.ice_servers.clone())?;
    info!(ice_servers = ?config.webrtc.ice_servers, "WebRTC engine initialized");

    // 4. Endpoint pool; endpoints bind lazily on first discovery
    let binder = Arc::new(TcpEndpointBinder::new(config.endpoints.host.clone()));
    let pool = EndpointPool::new(pool_config(&config), Arc::new(engine), binder);

    // 5. Serve until SIGINT/SIGTERM
    RelayGateServer::new(config, pool).start().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_from_defaults() {
        let pool = pool_config(&Config::default());
        assert_eq!(pool.first_port, 16666);
        assert_eq!(pool.admission_threshold_bps, 1e5);
        assert_eq!(pool.sample_interval, Some(Duration::from_secs(5)));
        assert_eq!(pool.ice_gathering_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_interval_disables_sampler() {
        let mut config = Config::default();
        config.endpoints.sample_interval_secs = 0;
        assert_eq!(pool_config(&config).sample_interval, None);
    }
}

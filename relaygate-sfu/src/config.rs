//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default admission threshold: 100 kbit/s of inbound media per endpoint
pub const DEFAULT_ADMISSION_THRESHOLD_BPS: f64 = 1e5;

/// Endpoint pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Identifier (and port) handed to the first provisioned endpoint
    pub first_port: u16,
    /// Least-loaded endpoint must be at or below this to receive a new session
    pub admission_threshold_bps: f64,
    /// Period of the background load sampler (None = disabled)
    pub sample_interval: Option<Duration>,
    /// How long negotiation waits for ICE gathering before answering
    pub ice_gathering_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            first_port: 16666,
            admission_threshold_bps: DEFAULT_ADMISSION_THRESHOLD_BPS,
            sample_interval: Some(Duration::from_secs(5)),
            ice_gathering_timeout: Duration::from_secs(5),
        }
    }
}

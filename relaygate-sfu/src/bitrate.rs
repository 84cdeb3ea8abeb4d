//! Bitrate estimation from cumulative transport byte counters

use crate::engine::TransportSample;

/// Per-session bitrate estimator
///
/// Holds the previous counter reading. Every observation consumes it: the
/// reported rate covers only the interval since the last call.
#[derive(Debug, Default, Clone)]
pub struct BitrateEstimator {
    baseline: Option<TransportSample>,
}

impl BitrateEstimator {
    #[must_use]
    pub const fn new() -> Self {
        Self { baseline: None }
    }

    /// Feed a fresh reading and return bits per second over the last interval
    ///
    /// The first reading only establishes a baseline and reports 0. A counter
    /// that moved backwards or an interval that is not positive also reports 0
    /// and re-baselines on the new reading.
    pub fn observe(&mut self, sample: TransportSample) -> f64 {
        let Some(previous) = self.baseline.replace(sample) else {
            return 0.0;
        };

        let Some(delta_bytes) = sample.bytes_received.checked_sub(previous.bytes_received) else {
            return 0.0;
        };

        let Some(interval) = sample.timestamp.checked_duration_since(previous.timestamp) else {
            return 0.0;
        };
        let interval = interval.as_secs_f64();
        if interval <= 0.0 {
            return 0.0;
        }

        (8 * delta_bytes) as f64 / interval
    }

    /// The reading the next observation will be measured against
    #[must_use]
    pub const fn baseline(&self) -> Option<TransportSample> {
        self.baseline
    }
}

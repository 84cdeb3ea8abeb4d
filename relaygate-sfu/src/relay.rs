//! Inbound track fan-out
//!
//! A [`MediaRelay`] is the subscription point for one remote track. The
//! engine publishes every RTP packet it reads into a broadcast channel and
//! any number of consumers (preview encoders, forwarders) subscribe to it.
//! Payloads are `Bytes`, so subscribers share one allocation per packet.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

/// Packets buffered per subscriber before the slowest one starts lagging
pub const RELAY_CHANNEL_CAPACITY: usize = 512;

/// Media track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl From<&str> for TrackKind {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "audio" => Self::Audio,
            _ => Self::Video,
        }
    }
}

/// RTP packet with metadata for forwarding
#[derive(Debug, Clone)]
pub struct MediaPacket {
    /// RTP payload
    pub payload: Bytes,
    pub ssrc: u32,
    pub sequence_number: u16,
    pub timestamp: u32,
    /// Marker bit (end of a video frame)
    pub marker: bool,
    pub received_at: Instant,
}

#[derive(Debug, Default)]
struct RelayCounters {
    packets: AtomicU64,
    bytes: AtomicU64,
}

/// Shared handle to one inbound track
#[derive(Debug, Clone)]
pub struct MediaRelay {
    kind: TrackKind,
    codec: String,
    tx: broadcast::Sender<MediaPacket>,
    counters: Arc<RelayCounters>,
}

impl MediaRelay {
    pub fn new(kind: TrackKind, codec: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(RELAY_CHANNEL_CAPACITY);
        Self {
            kind,
            codec: codec.into(),
            tx,
            counters: Arc::new(RelayCounters::default()),
        }
    }

    /// Hand a packet to every current subscriber; returns how many got it
    pub fn publish(&self, packet: MediaPacket) -> usize {
        self.counters.packets.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes
            .fetch_add(packet.payload.len() as u64, Ordering::Relaxed);
        // An error only means there are no subscribers right now
        self.tx.send(packet).unwrap_or(0)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MediaPacket> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    #[must_use]
    pub const fn kind(&self) -> TrackKind {
        self.kind
    }

    #[must_use]
    pub fn codec(&self) -> &str {
        &self.codec
    }

    #[must_use]
    pub fn packets_relayed(&self) -> u64 {
        self.counters.packets.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn bytes_relayed(&self) -> u64 {
        self.counters.bytes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(seq: u16) -> MediaPacket {
        MediaPacket {
            payload: Bytes::from_static(b"\x01\x02\x03"),
            ssrc: 42,
            sequence_number: seq,
            timestamp: 9000,
            marker: false,
            received_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn test_fan_out_to_every_subscriber() {
        let relay = MediaRelay::new(TrackKind::Video, "video/VP8");
        let mut a = relay.subscribe();
        let mut b = relay.clone().subscribe();

        assert_eq!(relay.publish(packet(1)), 2);

        assert_eq!(a.recv().await.unwrap().sequence_number, 1);
        assert_eq!(b.recv().await.unwrap().sequence_number, 1);
        assert_eq!(relay.packets_relayed(), 1);
        assert_eq!(relay.bytes_relayed(), 3);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let relay = MediaRelay::new(TrackKind::from("audio"), "audio/opus");
        assert_eq!(relay.kind(), TrackKind::Audio);
        assert_eq!(relay.publish(packet(1)), 0);
        assert_eq!(relay.packets_relayed(), 1);
    }
}

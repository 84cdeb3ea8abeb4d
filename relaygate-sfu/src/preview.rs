//! Optional still-image preview of a session's video
//!
//! Decoding video is outside the scheduler. Deployments that want a preview
//! in the stats listing plug an encoder in here; without one the field is
//! simply absent.

use async_trait::async_trait;

use crate::relay::MediaRelay;

#[async_trait]
pub trait PreviewEncoder: Send + Sync + 'static {
    /// Encode a still image from the relay, or `None` if nothing is ready
    async fn encode(&self, media: &MediaRelay) -> Option<Vec<u8>>;
}

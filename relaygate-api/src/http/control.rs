//! Control endpoints
//!
//! - `POST /control/offer` - assign an endpoint to a new client
//! - `GET /stats` - per-session load and connectivity snapshot

use axum::{extract::State, Json};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::http::{AppResult, ControlState};

/// Discovery answer: the endpoint port the client should negotiate with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub port: u16,
}

/// One entry of the status listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub port_num: u16,
    /// Session token of the client
    pub client_id: String,
    /// Current load of the endpoint hosting the session
    pub bps: f64,
    /// Base64 still image of the inbound video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    pub ice_connection_state: String,
}

/// Assign an endpoint, provisioning one if every endpoint is saturated
///
/// Path: `POST /control/offer`
///
/// # Response
/// ```json
/// { "port": 16666 }
/// ```
pub async fn discover(State(state): State<ControlState>) -> AppResult<Json<DiscoverResponse>> {
    let endpoint = state.pool.assign().await?;
    debug!(port = endpoint.id().port(), "Endpoint assigned");
    Ok(Json(DiscoverResponse {
        port: endpoint.id().port(),
    }))
}

/// Fresh load and connectivity of every session, keyed by session id
///
/// Path: `GET /stats`
///
/// Each call advances every session's bitrate estimator.
pub async fn stats(State(state): State<ControlState>) -> Json<BTreeMap<String, SessionStats>> {
    let snapshot = state.pool.snapshot().await;

    let previews = join_all(snapshot.iter().map(|s| {
        let encoder = state.preview.clone();
        let media = s.media.clone();
        async move {
            let (encoder, media) = (encoder?, media?);
            encoder.encode(&media).await.map(|image| STANDARD.encode(image))
        }
    }))
    .await;

    let listing = snapshot
        .into_iter()
        .zip(previews)
        .map(|(s, video)| {
            (
                s.session_id.to_string(),
                SessionStats {
                    port_num: s.endpoint_id.port(),
                    client_id: s.session_id.to_string(),
                    bps: s.endpoint_bps,
                    video,
                    ice_connection_state: s.ice_state,
                },
            )
        })
        .collect();

    Json(listing)
}

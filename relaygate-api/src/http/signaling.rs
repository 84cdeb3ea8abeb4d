//! Per-endpoint negotiation
//!
//! `POST /port/offer` accepts either an SDP offer, answered once ICE
//! gathering finishes, or a trickled client ICE candidate.

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    response::{IntoResponse, Response},
    Json,
};
use relaygate_sfu::{Error, IceCandidate, SessionDescription, SessionId};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::http::{AppResult, EndpointState};

/// Body of a `/port/offer` request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalRequest {
    /// Trickled candidate; without a session id it goes to the caller's newest session
    Candidate {
        candidate: IceCandidate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
    Offer(SessionDescription),
}

/// Answer to an offer, tagged with the session it created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    #[serde(flatten)]
    pub answer: SessionDescription,
    pub session_id: SessionId,
}

/// Path: `POST /port/offer`
///
/// # Request
/// ```json
/// { "sdp": "v=0...", "type": "offer" }
/// ```
/// or
/// ```json
/// { "candidate": { "candidate": "candidate:...", "sdpMid": "0" }, "session_id": "..." }
/// ```
///
/// # Response
/// ```json
/// { "sdp": "v=0...", "type": "answer", "session_id": "16666-192.0.2.10-..." }
/// ```
/// or `{}` for a candidate.
pub async fn port_offer(
    State(state): State<EndpointState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    body: Result<Json<SignalRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = body?;
    let pool = state
        .pool
        .upgrade()
        .ok_or(Error::EndpointUnavailable(state.endpoint_id))?;

    match request {
        SignalRequest::Offer(offer) => {
            let negotiated = pool.negotiate(state.endpoint_id, remote_addr, offer).await?;
            Ok(Json(AnswerResponse {
                answer: negotiated.answer,
                session_id: negotiated.session_id,
            })
            .into_response())
        }
        SignalRequest::Candidate {
            candidate,
            session_id,
        } => {
            pool.add_remote_candidate(
                state.endpoint_id,
                session_id.as_ref(),
                remote_addr.ip(),
                candidate,
            )
            .await?;
            Ok(Json(serde_json::Map::new()).into_response())
        }
    }
}

//! Signaling client
//!
//! Speaks the same two-phase protocol a browser does: discover an endpoint
//! on the control address, then negotiate and trickle candidates there.

use relaygate_sfu::{IceCandidate, SessionDescription, SessionId};
use reqwest::{Client, Response};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::http::control::{DiscoverResponse, SessionStats};
use crate::http::signaling::{AnswerResponse, SignalRequest};
use crate::http::ErrorResponse;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error body
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Clone)]
pub struct SignalingClient {
    http: Client,
    /// Host shared by the control address and every endpoint
    host: String,
    control_port: u16,
}

impl SignalingClient {
    /// Client for a server whose control address is `host:control_port`
    pub fn new(host: impl Into<String>, control_port: u16) -> ClientResult<Self> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            host: host.into(),
            control_port,
        })
    }

    fn url(&self, port: u16, path: &str) -> String {
        format!("http://{}:{port}{path}", self.host)
    }

    /// Ask the control address which endpoint port to use
    pub async fn discover(&self) -> ClientResult<u16> {
        let response = self
            .http
            .post(self.url(self.control_port, "/control/offer"))
            .send()
            .await?;
        let body: DiscoverResponse = Self::parse(response).await?;
        debug!(port = body.port, "Discovered endpoint");
        Ok(body.port)
    }

    /// Fetch the server's per-session status listing
    pub async fn stats(&self) -> ClientResult<BTreeMap<String, SessionStats>> {
        let response = self
            .http
            .get(self.url(self.control_port, "/stats"))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Send an offer to the endpoint on `port` and return its answer
    pub async fn negotiate(
        &self,
        port: u16,
        offer: SessionDescription,
    ) -> ClientResult<AnswerResponse> {
        self.post(port, &SignalRequest::Offer(offer)).await
    }

    /// Trickle one local candidate to the endpoint on `port`
    pub async fn send_candidate(
        &self,
        port: u16,
        session_id: Option<SessionId>,
        candidate: IceCandidate,
    ) -> ClientResult<()> {
        let _: serde_json::Value = self
            .post(
                port,
                &SignalRequest::Candidate {
                    candidate,
                    session_id,
                },
            )
            .await?;
        Ok(())
    }

    async fn post<B, T>(&self, port: u16, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .http
            .post(self.url(port, "/port/offer"))
            .json(body)
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: Response) -> ClientResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
        };
        Err(ClientError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaygate_sfu::SdpType;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> (SignalingClient, u16) {
        let addr = server.address();
        (
            SignalingClient::new(addr.ip().to_string(), addr.port()).unwrap(),
            addr.port(),
        )
    }

    #[tokio::test]
    async fn test_discover() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/control/offer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"port": 16666})))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = client_for(&server);
        assert_eq!(client.discover().await.unwrap(), 16666);
    }

    #[tokio::test]
    async fn test_negotiate_sends_offer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/port/offer"))
            .and(body_partial_json(serde_json::json!({"sdp": "v=0", "type": "offer"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sdp": "v=0 answer",
                "type": "answer",
                "session_id": "16666-127.0.0.1-abc"
            })))
            .mount(&server)
            .await;

        let (client, port) = client_for(&server);
        let answer = client
            .negotiate(port, SessionDescription::offer("v=0"))
            .await
            .unwrap();

        assert_eq!(answer.answer.sdp_type, SdpType::Answer);
        assert_eq!(answer.answer.sdp, "v=0 answer");
        assert_eq!(answer.session_id.as_str(), "16666-127.0.0.1-abc");
    }

    #[tokio::test]
    async fn test_server_error_message_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/control/offer"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({"error": "failed to provision endpoint 16666"})),
            )
            .mount(&server)
            .await;

        let (client, _) = client_for(&server);
        match client.discover().await {
            Err(ClientError::Server { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "failed to provision endpoint 16666");
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_candidate_with_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/port/offer"))
            .and(body_partial_json(serde_json::json!({
                "candidate": {"candidate": "candidate:1"},
                "session_id": "s-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let (client, port) = client_for(&server);
        let candidate = IceCandidate {
            candidate: "candidate:1".to_string(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        };
        client
            .send_candidate(port, Some(SessionId::from("s-1")), candidate)
            .await
            .unwrap();
    }
}

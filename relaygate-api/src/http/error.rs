// HTTP error handling

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error body shared by every signaling response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

/// Scheduler failures surface as 500 with the error text, as clients expect
impl From<relaygate_sfu::Error> for AppError {
    fn from(err: relaygate_sfu::Error) -> Self {
        use relaygate_sfu::Error;

        match &err {
            Error::Provisioning { .. }
            | Error::PoolShutDown
            | Error::ShutdownIncomplete(_)
            | Error::ListenerStop { .. } => {
                tracing::error!(error = %err, "Scheduler error");
            }
            Error::Negotiation(_) | Error::EndpointUnavailable(_) | Error::EndpointMismatch { .. } => {
                tracing::warn!(error = %err, "Negotiation error");
            }
            Error::SessionNotFound(_) | Error::Engine(_) => {
                tracing::debug!(error = %err, "Signaling request failed");
            }
        }
        Self::internal_server_error(err.to_string())
    }
}

/// Malformed signaling bodies fail like any other rejected offer: 500
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "Malformed signaling request");
        Self::internal_server_error(format!("malformed request: {}", rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = AppError::from(relaygate_sfu::Error::Negotiation("bad sdp".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"error": "negotiation failed: bad sdp"}));
    }

    #[tokio::test]
    async fn test_pool_shut_down_is_500() {
        let response = AppError::from(relaygate_sfu::Error::PoolShutDown).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

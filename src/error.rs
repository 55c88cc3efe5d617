use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use ethers::providers::{ProviderError, RpcError, WsClientError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone)]
pub enum FeedError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Subscription rejected: {0}")]
    SubscriptionRejected(String),

    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Estimator unavailable: {0}")]
    EstimatorUnavailable(String),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FeedError {
    // transport errors end the session; the rest only drop one update
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FeedError::Connection(_) | FeedError::SubscriptionRejected(_) | FeedError::Timeout(_)
        )
    }
}

// A JSON-RPC error response (e.g. "header not found") came over a healthy
// transport and only concerns that request.
fn classify_rpc(err: &dyn RpcError) -> FeedError {
    match err.as_error_response() {
        Some(response) => FeedError::Decode(format!("JSON-RPC error {}: {}", response.code, response.message)),
        None if err.as_serde_error().is_some() => FeedError::Decode(err.to_string()),
        None => FeedError::Connection(err.to_string()),
    }
}

impl From<ProviderError> for FeedError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::JsonRpcClientError(e) => classify_rpc(e.as_ref()),
            ProviderError::SerdeJson(e) => FeedError::Decode(e.to_string()),
            other => FeedError::Connection(other.to_string()),
        }
    }
}

impl From<WsClientError> for FeedError {
    fn from(err: WsClientError) -> Self {
        classify_rpc(&err)
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,
}

impl IntoResponse for FeedError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();

        let (status, error_code) = match &self {
            FeedError::UnknownNetwork(_) => (StatusCode::NOT_FOUND, "UNKNOWN_NETWORK"),
            FeedError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            FeedError::Connection(_)
            | FeedError::SubscriptionRejected(_)
            | FeedError::Timeout(_)
            | FeedError::EstimatorUnavailable(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: error_code.to_string(),
            timestamp: Utc::now(),
            request_id,
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, error_code = error_code, "Request failed");
        } else {
            tracing::debug!(error = %self, error_code = error_code, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}

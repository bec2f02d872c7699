use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use uuid::Uuid;

use lifeline_client::ReportError;
use lifeline_shared::error::GroupError;
use lifeline_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Alert not found: {0}")]
    AlertNotFound(Uuid),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    TooManyRequests(String),

    #[error("Peer group error: {0}")]
    PeerGroup(#[from] GroupError),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ReportError> for ServerError {
    fn from(e: ReportError) -> Self {
        match e {
            ReportError::Empty | ReportError::UnknownCategory(_) | ReportError::TooLong { .. } => {
                Self::BadRequest(e.to_string())
            }
            ReportError::RateLimited { .. } => Self::TooManyRequests(e.to_string()),
            ReportError::Delivery(_) => Self::Upstream(e.to_string()),
            ReportError::History(_) => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::AlertNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::TooManyRequests(_) => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            ServerError::PeerGroup(GroupError::TornDown) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            ServerError::PeerGroup(_) => (StatusCode::CONFLICT, self.to_string()),
            ServerError::Upstream(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            ServerError::Storage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }
            ServerError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

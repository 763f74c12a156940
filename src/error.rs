//! Request-level errors and their HTTP rendering

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Result of handling (part of) a request
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Things that can go wrong while serving a request
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed request arguments
    #[error("{0}")]
    Validation(String),

    /// Request refers to something that does not exist, e.g. a sample search
    #[error("{0}")]
    NotFound(String),

    /// Endpoint requires a valid user API key
    #[error("You must be logged in to do that")]
    Unauthorized,

    /// An upstream service failed or answered nonsense
    #[error("{service} request failed: {message}")]
    Upstream {
        /// Which upstream service failed
        service: &'static str,

        /// What went wrong
        message: String,
    },

    /// Bug or resource exhaustion on our side
    #[error("Internal error: {0}")]
    Internal(String),
}
//
impl ApiError {
    /// Report a failure of the upstream media search API
    pub fn search(message: impl ToString) -> Self {
        Self::Upstream {
            service: "Media search API",
            message: message.to_string(),
        }
    }

    /// Report a failure of the word embeddings server
    pub fn embeddings(message: impl ToString) -> Self {
        Self::Upstream {
            service: "Word embeddings server",
            message: message.to_string(),
        }
    }

    /// HTTP status code associated with this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
//
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Failed to serve request: {self}");
        } else {
            log::debug!("Rejected request: {self}");
        }
        let body = ErrorBody {
            status_code: status.as_u16(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// JSON error body, as expected by the explorer UI
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    status_code: u16,
    message: String,
}

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use resale_types::api::ErrorResponse;

use crate::archival::ArchivalError;
use crate::store::CallError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Archival(#[from] ArchivalError),

    #[error("Backend error")]
    Backend(#[from] CallError),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Archival(e) => e.status_code(),
            ApiError::Backend(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller.
    fn public_message(&self) -> String {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg) => msg.clone(),
            ApiError::Archival(e) if e.is_retryable() => format!("{}. It is safe to try again", e),
            ApiError::Archival(e) => e.to_string(),
            ApiError::Backend(_) | ApiError::Internal(_) => "Internal server error".to_string(),
        }
    }

    fn log(&self) {
        match self {
            ApiError::Backend(e) => error!(error = %e, "Backend call failed"),
            ApiError::Internal(msg) => error!(message = %msg, "Internal error"),
            ApiError::Archival(e) if e.status_code().is_server_error() => {
                error!(error = ?e, "Archival failed")
            }
            other => warn!(status = %other.status_code(), "{}", other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn archival_kinds_keep_distinct_statuses() {
        let id = Uuid::new_v4();
        assert_eq!(
            ApiError::from(ArchivalError::NotFound(id)).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ArchivalError::Unauthorized(id)).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn backend_details_are_not_exposed() {
        let err = ApiError::Backend(CallError::Backend(anyhow::anyhow!("disk I/O error at page 7")));
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn retryable_archival_failures_say_so() {
        let id = Uuid::new_v4();
        let unavailable = ApiError::from(ArchivalError::BackendUnavailable(CallError::Timeout(
            std::time::Duration::from_secs(5),
        )));
        assert!(unavailable.public_message().ends_with("safe to try again"));
        assert!(!ApiError::from(ArchivalError::NotFound(id)).public_message().contains("try again"));
    }
}

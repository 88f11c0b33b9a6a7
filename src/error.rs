use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, state::lifecycle::InvalidTransition};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed input such as a blank id or a negative minute.
    #[error("invalid input: {0}")]
    Validation(String),
    /// Actor is neither the owner nor a confirmed participant of the game.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Requested game or event was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Operation cannot be performed in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Storage backend failed; the whole intent may be retried.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl ServiceError {
    /// Whether repeating the same intent may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Unavailable(_) | ServiceError::Degraded | ServiceError::Timeout
        )
    }

    /// One-line message suitable for showing to the person who issued the intent.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Validation(message) => format!("Invalid input: {message}"),
            ServiceError::PermissionDenied(_) => {
                "Only the organizer or confirmed players can update this game".into()
            }
            ServiceError::NotFound(message) => format!("Not found: {message}"),
            ServiceError::InvalidState(message) => format!("Not possible right now: {message}"),
            ServiceError::Unavailable(_) | ServiceError::Degraded | ServiceError::Timeout => {
                "Something went wrong, please try again".into()
            }
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Missing caller identity.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Caller identity lacks the required permission.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.user_message();
        match err {
            ServiceError::Validation(_) => AppError::BadRequest(message),
            ServiceError::PermissionDenied(_) => AppError::Forbidden(message),
            ServiceError::NotFound(_) => AppError::NotFound(message),
            ServiceError::InvalidState(_) => AppError::Conflict(message),
            ServiceError::Unavailable(StorageError::Corrupt { .. }) => {
                AppError::Internal(message)
            }
            ServiceError::Unavailable(_) | ServiceError::Degraded | ServiceError::Timeout => {
                AppError::ServiceUnavailable(message)
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_failures_are_retryable() {
        let transient = [
            ServiceError::Degraded,
            ServiceError::Timeout,
            ServiceError::Unavailable(StorageError::unavailable(
                "down".into(),
                std::io::Error::other("connection reset"),
            )),
        ];
        assert!(transient.iter().all(ServiceError::is_retryable));

        let final_errors = [
            ServiceError::Validation("minute".into()),
            ServiceError::PermissionDenied("actor".into()),
            ServiceError::NotFound("event".into()),
            ServiceError::InvalidState("finished".into()),
        ];
        assert!(!final_errors.iter().any(ServiceError::is_retryable));
    }

    #[test]
    fn service_errors_map_to_http_statuses() {
        let cases = [
            (ServiceError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::PermissionDenied("x".into()), StatusCode::FORBIDDEN),
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServiceError::InvalidState("x".into()), StatusCode::CONFLICT),
            (ServiceError::Degraded, StatusCode::SERVICE_UNAVAILABLE),
            (
                ServiceError::Unavailable(StorageError::corrupt("doc", "bad")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }

    #[test]
    fn transient_failures_share_a_generic_message() {
        assert_eq!(
            ServiceError::Timeout.user_message(),
            "Something went wrong, please try again"
        );
    }
}

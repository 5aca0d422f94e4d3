use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the booking core and mapped onto HTTP responses.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested slot can no longer be booked. Routine outcome, not a fault.
    #[error("Slot no longer available: {0}")]
    Conflict(String),

    #[error("Invalid cancellation token")]
    InvalidToken,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Schedule catalog unreadable: {0}")]
    ScheduleUnavailable(std::io::Error),
}

/// Storage-level failures of the booking ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Ledger lock poisoned")]
    Poisoned,
}

/// Failures talking to the calendar provider or the notification webhook.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Upstream returned status {0}")]
    Status(u16),

    #[error("Upstream timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("{0} must be set together with {1}")]
    Incomplete(&'static str, &'static str),
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            BookingError::Validation(_) => (StatusCode::BAD_REQUEST, "Validation error"),
            BookingError::Conflict(_) => (StatusCode::CONFLICT, "Slot no longer available"),
            BookingError::InvalidToken => (StatusCode::FORBIDDEN, "Invalid cancellation token"),
            BookingError::NotFound(_) => (StatusCode::NOT_FOUND, "Resource not found"),
            BookingError::Unauthorized => (StatusCode::UNAUTHORIZED, "Authentication failed"),
            BookingError::Ledger(_) | BookingError::ScheduleUnavailable(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal server error occurred",
            ),
        };

        // Storage details stay in the logs
        let details = match &self {
            BookingError::Ledger(err) => {
                tracing::error!("Ledger failure while handling request: {}", err);
                error_message.to_string()
            }
            BookingError::ScheduleUnavailable(err) => {
                tracing::error!("Schedule catalog could not be read: {}", err);
                error_message.to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "details": details,
            }
        }));

        (status, body).into_response()
    }
}

pub type BookingResult<T> = Result<T, BookingError>;

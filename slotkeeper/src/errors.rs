use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

use crate::reserve::ReserveId;

/// Result type for reservation operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    /// No active reservation with this ID (never created, already committed, or already expired)
    #[error("Reservation {reserve_id} not found")]
    NotFound { reserve_id: ReserveId },

    /// A reservation with this ID is already stored. Only reachable through a broken ID generator.
    #[error("Reservation {reserve_id} already exists")]
    DuplicateKey { reserve_id: ReserveId },

    /// Malformed input at the HTTP boundary
    #[error("{message}")]
    BadRequest { message: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// JSON body returned for every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::DuplicateKey { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::NotFound { reserve_id } => format!("No active reservation with ID {reserve_id}"),
            Error::BadRequest { message } => message.clone(),
            Error::DuplicateKey { .. } | Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::DuplicateKey { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::NotFound { .. } | Error::BadRequest { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = ErrorBody {
            message: self.user_message(),
        };
        (status, Json(body)).into_response()
    }
}

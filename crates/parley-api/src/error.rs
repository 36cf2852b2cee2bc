//! Service errors and their mapping onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parley_db::StorageError;
use parley_types::api::ErrorResponse;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("All fields are required ({0} is missing).")]
    MissingField(&'static str),

    #[error("Message content cannot be empty.")]
    EmptyContent,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid username/email or password.")]
    InvalidCredentials,

    #[error("You must be logged in.")]
    Unauthenticated,

    /// Same error whether the message is missing or belongs to someone else.
    #[error("Message not found or you are not allowed to delete it.")]
    NotFoundOrForbidden,

    #[error("storage unavailable: {0}")]
    Storage(#[from] StorageError),

    #[error("session store error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidCredentials | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::NotFoundOrForbidden => StatusCode::NOT_FOUND,
            Self::Storage(_) | Self::Session(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            "Internal server error.".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

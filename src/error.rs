//! Error types for the private URL service
//!
//! Every fallible operation in the crate returns [`Result`]. Storage and
//! serialization failures are wrapped so they can be propagated with `?`,
//! and [`Error`] converts into an HTTP response for the axum handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad input: token size, dash piece size, action/token slugs, request bodies
    #[error("{0}")]
    Validation(String),

    /// The `(action, token)` pair is already stored
    #[error("token already exists (action={action}, token={token})")]
    DuplicateToken { action: String, token: String },

    /// Every creation attempt collided with an existing token.
    ///
    /// This points at a token space that is too small for the current
    /// volume rather than at a transient fault.
    #[error("failed to create private url after {attempts} attempts (action={action}, token_size={token_size})")]
    TokenSpaceExhausted {
        action: String,
        token_size: String,
        attempts: u32,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Store(#[from] redb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Machine-readable code used in JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::DuplicateToken { .. } => "CONFLICT",
            Self::TokenSpaceExhausted { .. } => "TOKEN_SPACE_EXHAUSTED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Configuration(_) | Self::Store(_) | Self::Serialization(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<redb::DatabaseError> for Error {
    fn from(source: redb::DatabaseError) -> Self {
        Self::Store(source.into())
    }
}

impl From<redb::TransactionError> for Error {
    fn from(source: redb::TransactionError) -> Self {
        Self::Store(source.into())
    }
}

impl From<redb::TableError> for Error {
    fn from(source: redb::TableError) -> Self {
        Self::Store(source.into())
    }
}

impl From<redb::StorageError> for Error {
    fn from(source: redb::StorageError) -> Self {
        Self::Store(source.into())
    }
}

impl From<redb::CommitError> for Error {
    fn from(source: redb::CommitError) -> Self {
        Self::Store(source.into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateToken { .. } => StatusCode::CONFLICT,
            Self::TokenSpaceExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Configuration(_) | Self::Store(_) | Self::Serialization(_) => {
                tracing::error!(error = %self, "Internal server error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            Json(json!({
                "error": self.code(),
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

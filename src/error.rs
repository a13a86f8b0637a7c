use axum::http::StatusCode;
use thiserror::Error;
use tracing::error;

/// Errors surfaced by the experiment store and the upload decoder.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username already registered")]
    DuplicateUser,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Map a store error onto the `(status, message)` pair returned by handlers.
pub fn store_error(e: StoreError) -> (StatusCode, String) {
    match e {
        StoreError::DuplicateUser => (StatusCode::CONFLICT, e.to_string()),
        StoreError::InvalidCredentials => (StatusCode::UNAUTHORIZED, e.to_string()),
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        StoreError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        StoreError::Database(_) | StoreError::Migration(_) => {
            error!(error = %e, "store failure");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
        }
    }
}

/// Log a failure from hashing, signing and the like; the client only sees
/// a generic 500.
pub fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    error!(error = %e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
}

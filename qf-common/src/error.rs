//! Common error types for QuestionFlow

use thiserror::Error;

/// Common result type for QuestionFlow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across QuestionFlow services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session, doubt or session code does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// More than one active session answers to the same short code
    #[error("Ambiguous session code: {0}")]
    AmbiguousCode(String),

    /// Operation not allowed in the current state (e.g. session inactive)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

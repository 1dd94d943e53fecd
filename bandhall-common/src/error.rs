//! Common error types for bandhall

use thiserror::Error;

/// Common result type for bandhall operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the bandhall crates
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

    /// Malformed recurrence rule (bad interval, empty weekday set,
    /// conflicting termination conditions). Surfaced on rule save and
    /// on expansion, never coerced.
    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

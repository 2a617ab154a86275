//! Common error types for Streamproof

use thiserror::Error;

/// Common result type for Streamproof operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors shared across the proof job's crates
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid run input, rejected before any side effect
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

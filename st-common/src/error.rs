//! Common error types for Sacral Track services

use thiserror::Error;

/// Common result type for Sacral Track operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by Sacral Track services
///
/// Domain-level failure classification (permission, transient, cancellation)
/// lives in the service crates; this type covers the plumbing underneath:
/// storage, I/O, and configuration.
#[derive(Error, Debug)]
pub enum Error {
    /// Local cache database error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

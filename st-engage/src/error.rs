//! Error types for st-engage
//!
//! Failures are classified so the engine can decide retry, rollback, and
//! surfacing behavior per class: reads retry `Transient` errors, writes never
//! retry, `Cancelled` results are discarded without rollback, and only
//! `Permission` and `InvalidInput` reach the user as actionable messages.

use st_common::model::ErrorKind;
use thiserror::Error;

/// Main error type for st-engage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Caller has no viewer identity; mutating calls refuse to proceed
    #[error("Not authenticated")]
    Unauthenticated,

    /// Rejected before any network call
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout, connection failure, or 5xx; retryable for reads only
    #[error("Transient error: {0}")]
    Transient(String),

    /// Superseded by a newer call for the same subject
    #[error("Request cancelled")]
    Cancelled,

    /// Remote rejected the credentials (401/403)
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Resource no longer exists on the remote
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unexpected failure; callers degrade to a no-op
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classification recorded in `InteractionState.error`
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unauthenticated => ErrorKind::Unauthenticated,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Transient(_) => ErrorKind::Transient,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Permission(_) => ErrorKind::Permission,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a read may be retried after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

/// Convenience Result type using the st-engage Error
pub type Result<T> = std::result::Result<T, Error>;

//! Error vocabulary for the CAS engine.
//!
//! Adapter-level transport errors are always wrapped into
//! [`CasError::StorageAdapter`] with the failing path, never passed through
//! raw, so callers can depend on these variants regardless of the backing
//! store technology.

use crate::hash::{ContentHash, HashError};
use thiserror::Error;

/// Result type used throughout the engine.
pub type CasResult<T> = Result<T, CasError>;

/// Errors surfaced by the CAS engine.
#[derive(Debug, Error)]
pub enum CasError {
    /// Blob or metadata entry absent.
    #[error("content not found at {path}")]
    NotFound { path: String },

    /// Payload over the configured maximum size.
    #[error("content size {size} exceeds maximum of {max} bytes")]
    SizeLimitExceeded { size: u64, max: u64 },

    /// Recomputed digest of retrieved bytes does not match the requested
    /// digest. Signals corruption, not a valid state.
    #[error("content integrity failure at {path}: expected {expected}, got {actual}")]
    ContentIntegrity {
        path: String,
        expected: ContentHash,
        actual: ContentHash,
    },

    /// Malformed digest string supplied by the caller.
    #[error(transparent)]
    InvalidHash(#[from] HashError),

    /// Underlying blob/metadata transport failure, wrapped.
    #[error("storage adapter failure at {path}: {source}")]
    StorageAdapter {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    /// Configuration rejected at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CasError {
    pub(crate) fn adapter(path: impl Into<String>, source: anyhow::Error) -> Self {
        Self::StorageAdapter {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// True if this error is a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

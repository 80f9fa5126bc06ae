//! Common error types for Warden components.

use thiserror::Error;

/// Failures of the remote storage tier.
///
/// These never leave the storage layer: the routing facade absorbs them by
/// falling back to the local tier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Connection refused, reset, or closed mid-reply
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connect, read, or write exceeded the configured timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Malformed reply, unexpected reply type, or an error reply
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Discovery found no node reporting the primary role
    #[error("No primary available")]
    NoPrimaryAvailable,
}

impl StoreError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Domain-level outcome of a failed challenge verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Never issued, already consumed, or aged out of storage
    #[error("Challenge not found or expired")]
    NotFound,

    /// Still stored but past its expiry
    #[error("Challenge expired")]
    Expired,

    /// Bad client input
    #[error("Malformed request")]
    Malformed,

    /// Wrong proof-of-work
    #[error("Invalid solution")]
    Invalid,
}

impl VerifyError {
    /// Returns the HTTP status code for this outcome
    pub fn status_code(&self) -> u16 {
        400
    }
}

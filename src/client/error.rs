//! Client-side error taxonomy.

use std::fmt;

/// Outcome of a failed client operation. Every variant is recoverable by
/// retrying the user action; `AlreadyVoted` is informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The resolved identity already has a vote on the target
    AlreadyVoted,
    /// Required fields missing; raised before any network call
    ValidationFailed(String),
    /// Insert, update or delete against the store failed
    RemoteWriteFailed(String),
    /// Read from the store failed
    RemoteReadFailed(String),
    /// Vote check or insert failed
    VoteFailed(String),
    /// Lifecycle transition attempted on a terminal record
    NotPending(String),
    /// Record does not exist
    NotFound(String),
}

impl ClientError {
    /// True for outcomes that should be shown as information, not failure.
    pub fn is_informational(&self) -> bool {
        matches!(self, ClientError::AlreadyVoted)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::AlreadyVoted => write!(f, "You have already voted on this item"),
            ClientError::ValidationFailed(msg) => write!(f, "Validation failed: {}", msg),
            ClientError::RemoteWriteFailed(msg) => write!(f, "Remote write failed: {}", msg),
            ClientError::RemoteReadFailed(msg) => write!(f, "Remote read failed: {}", msg),
            ClientError::VoteFailed(msg) => write!(f, "Vote failed: {}", msg),
            ClientError::NotPending(msg) => write!(f, "Not pending: {}", msg),
            ClientError::NotFound(msg) => write!(f, "Not found: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

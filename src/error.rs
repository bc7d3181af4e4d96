//! Error types for the shot queue.

use crate::queue::QueueStatus;
use crate::types::{QueueId, ShotId};
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Sled(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Sled(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Failure of a single generation unit (one expanded variant).
///
/// These never escape the shot that owns the variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("Generation rejected: {0}")]
    Rejected(String),

    #[error("Generation request failed: {0}")]
    RequestFailed(String),

    #[error("Generation rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Generation authentication failed: {0}")]
    AuthFailed(String),

    #[error("Generation timed out: {0}")]
    Timeout(String),

    #[error("Invalid generation response: {0}")]
    InvalidResponse(String),

    #[error("Generation cancelled")]
    Cancelled,
}

/// Failures of the persistence collaborator.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Persistence unavailable: {0}")]
    Unavailable(String),

    #[error("Shot not found: {0}")]
    ShotNotFound(ShotId),

    #[error("Queue not found: {0}")]
    QueueNotFound(QueueId),

    #[error("Persistence storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Queue orchestration errors surfaced to callers.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("A run is already active for queue {0}")]
    RunActive(QueueId),

    #[error("Invalid queue transition: {from} -> {to}")]
    InvalidTransition { from: QueueStatus, to: QueueStatus },

    #[error("Shot {0} is generating and cannot be edited")]
    ShotLocked(ShotId),

    #[error("No failed shots to retry in project {0}")]
    NothingToRetry(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for QueueError {
    fn from(err: config::ConfigError) -> Self {
        QueueError::Config(err.to_string())
    }
}

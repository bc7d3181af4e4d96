//! Shared identifier types.

/// Opaque shot identifier, stable for the lifetime of a project.
pub type ShotId = String;

/// Queue identifier.
pub type QueueId = String;

/// Project identifier. Shots, queues and reference tags are scoped by project.
pub type ProjectId = String;

/// Unix timestamp in milliseconds.
pub type TimestampMs = u64;

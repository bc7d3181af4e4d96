//! Checkpointing and recovery of interrupted queue runs.

pub mod recovery;
pub mod store;

pub use recovery::{resume_message, RecoveryController, ResumeOffer};
pub use store::{
    CheckpointDraft, CheckpointSlot, CheckpointStore, Clock, MemoryCheckpointSlot,
    QueueCheckpoint, SledCheckpointSlot, CHECKPOINT_KEY, DEFAULT_STALENESS_WINDOW,
};

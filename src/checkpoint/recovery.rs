//! Recovery Controller: offer to resume an interrupted run from its checkpoint.

use tracing::info;

use crate::checkpoint::store::QueueCheckpoint;
use crate::error::{QueueError, StorageError};
use crate::queue::{QueueOrchestrator, RunHandle};

/// A fresh checkpoint matching the queue the caller has open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeOffer {
    pub checkpoint: QueueCheckpoint,
    pub message: String,
}

/// Prompt text derived from the checkpoint alone; the live queue may lag the interruption.
pub fn resume_message(checkpoint: &QueueCheckpoint) -> String {
    format!(
        "Resume incomplete generation? ({}/{} shots completed, {}%)",
        checkpoint.completed_shots(),
        checkpoint.total_shots,
        checkpoint.percent_complete()
    )
}

pub struct RecoveryController {
    orchestrator: QueueOrchestrator,
}

impl RecoveryController {
    pub fn new(orchestrator: QueueOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Offer a resume if a fresh checkpoint exists for `open_queue_id`.
    /// A checkpoint for another queue is left untouched.
    pub fn inspect(&self, open_queue_id: &str) -> Result<Option<ResumeOffer>, StorageError> {
        let Some(checkpoint) = self.orchestrator.checkpoints().load_checkpoint()? else {
            return Ok(None);
        };
        if checkpoint.queue_id != open_queue_id {
            return Ok(None);
        }
        let message = resume_message(&checkpoint);
        Ok(Some(ResumeOffer {
            checkpoint,
            message,
        }))
    }

    /// Start a new queue over the shots the checkpoint had not reached.
    pub async fn resume(&self, offer: &ResumeOffer) -> Result<RunHandle, QueueError> {
        let checkpoint = &offer.checkpoint;
        let remaining = checkpoint.remaining_shot_ids().to_vec();
        info!(
            queue_id = %checkpoint.queue_id,
            from_index = checkpoint.current_shot_index,
            remaining = remaining.len(),
            "resuming from checkpoint"
        );
        self.orchestrator
            .enqueue(&checkpoint.project_id, remaining)
            .await
    }

    /// Drop the checkpoint and leave the queue as it is.
    pub fn discard(&self) -> Result<(), StorageError> {
        info!("checkpoint discarded");
        self.orchestrator.checkpoints().clear_checkpoint()
    }
}

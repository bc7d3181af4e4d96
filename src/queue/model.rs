//! Generation queue records and the queue status machine.

use crate::types::{ProjectId, QueueId, ShotId, TimestampMs};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    #[default]
    Pending,
    Processing,
    Paused,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Paused => "paused",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }

    pub fn can_transition_to(self, next: QueueStatus) -> bool {
        use QueueStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Paused)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Paused, Processing)
        )
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationQueue {
    pub id: QueueId,
    pub project_id: ProjectId,
    /// Fixed for the lifetime of the queue.
    pub shot_ids: Vec<ShotId>,
    pub status: QueueStatus,
    /// Next shot to dispatch.
    pub current_shot_index: usize,
    /// 0..=100, over rendered outputs rather than shots.
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at_ms: TimestampMs,
}

impl GenerationQueue {
    pub fn new(
        id: impl Into<QueueId>,
        project_id: impl Into<ProjectId>,
        shot_ids: Vec<ShotId>,
        created_at_ms: TimestampMs,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            shot_ids,
            status: QueueStatus::Pending,
            current_shot_index: 0,
            progress: 0.0,
            error_message: None,
            created_at_ms,
        }
    }

    pub fn remaining_shot_ids(&self) -> &[ShotId] {
        let start = self.current_shot_index.min(self.shot_ids.len());
        &self.shot_ids[start..]
    }

    pub fn apply(&mut self, patch: &QueuePatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(index) = patch.current_shot_index {
            self.current_shot_index = index;
        }
        if let Some(progress) = patch.progress {
            self.progress = progress;
        }
        if let Some(error) = &patch.error_message {
            self.error_message = error.clone();
        }
    }
}

/// Partial queue update. `error_message: Some(None)` clears a previous error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueuePatch {
    pub status: Option<QueueStatus>,
    pub current_shot_index: Option<usize>,
    pub progress: Option<f64>,
    pub error_message: Option<Option<String>>,
}

impl QueuePatch {
    pub fn status(status: QueueStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn advance(current_shot_index: usize, progress: f64) -> Self {
        Self {
            current_shot_index: Some(current_shot_index),
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(QueueStatus::Failed),
            error_message: Some(Some(message.into())),
            ..Self::default()
        }
    }
}

/// Percentage of outputs attempted, clamped to 0..=100. An empty queue is complete.
pub fn output_progress(attempted: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (attempted as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

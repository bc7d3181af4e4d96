//! Durable single-record checkpoint for the active queue run.
//!
//! Exactly one checkpoint exists at a time, stored as JSON under [`CHECKPOINT_KEY`].
//! A record older than the staleness window is treated as absent and deleted on read.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sled::Tree;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::progress::now_millis;
use crate::queue::GenerationQueue;
use crate::types::{ProjectId, QueueId, ShotId, TimestampMs};

pub const CHECKPOINT_KEY: &str = "shotqueue.queue_checkpoint";
pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(5 * 60);

const TREE_CHECKPOINT: &str = "checkpoint";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCheckpoint {
    pub queue_id: QueueId,
    pub project_id: ProjectId,
    pub current_shot_index: usize,
    pub total_shots: usize,
    pub shot_ids: Vec<ShotId>,
    /// Unix milliseconds of the last write.
    pub timestamp: TimestampMs,
}

impl QueueCheckpoint {
    pub fn completed_shots(&self) -> usize {
        self.current_shot_index.min(self.total_shots)
    }

    /// Whole-number percentage of shots completed.
    pub fn percent_complete(&self) -> u32 {
        if self.total_shots == 0 {
            return 100;
        }
        (self.completed_shots() as f64 / self.total_shots as f64 * 100.0).round() as u32
    }

    pub fn remaining_shot_ids(&self) -> &[ShotId] {
        let start = self.current_shot_index.min(self.shot_ids.len());
        &self.shot_ids[start..]
    }
}

/// Checkpoint contents before the store stamps the time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointDraft {
    pub queue_id: QueueId,
    pub project_id: ProjectId,
    pub current_shot_index: usize,
    pub shot_ids: Vec<ShotId>,
}

impl CheckpointDraft {
    pub fn for_queue(queue: &GenerationQueue) -> Self {
        Self {
            queue_id: queue.id.clone(),
            project_id: queue.project_id.clone(),
            current_shot_index: queue.current_shot_index,
            shot_ids: queue.shot_ids.clone(),
        }
    }

    fn stamp(self, timestamp: TimestampMs) -> QueueCheckpoint {
        QueueCheckpoint {
            total_shots: self.shot_ids.len(),
            queue_id: self.queue_id,
            project_id: self.project_id,
            current_shot_index: self.current_shot_index,
            shot_ids: self.shot_ids,
            timestamp,
        }
    }
}

/// Raw storage for the single checkpoint record.
pub trait CheckpointSlot: Send + Sync {
    fn read(&self) -> Result<Option<Vec<u8>>, StorageError>;
    fn write(&self, bytes: Vec<u8>) -> Result<(), StorageError>;
    fn remove(&self) -> Result<(), StorageError>;
}

/// Sled-backed slot, flushed on every write so the record survives a crash.
#[derive(Clone)]
pub struct SledCheckpointSlot {
    tree: Tree,
}

impl SledCheckpointSlot {
    pub fn new(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            tree: db.open_tree(TREE_CHECKPOINT)?,
        })
    }
}

impl CheckpointSlot for SledCheckpointSlot {
    fn read(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.tree.get(CHECKPOINT_KEY)?.map(|raw| raw.to_vec()))
    }

    fn write(&self, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.tree.insert(CHECKPOINT_KEY, bytes)?;
        self.tree.flush()?;
        Ok(())
    }

    fn remove(&self) -> Result<(), StorageError> {
        self.tree.remove(CHECKPOINT_KEY)?;
        self.tree.flush()?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCheckpointSlot {
    value: Mutex<Option<Vec<u8>>>,
}

impl MemoryCheckpointSlot {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointSlot for MemoryCheckpointSlot {
    fn read(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.value.lock().clone())
    }

    fn write(&self, bytes: Vec<u8>) -> Result<(), StorageError> {
        *self.value.lock() = Some(bytes);
        Ok(())
    }

    fn remove(&self) -> Result<(), StorageError> {
        *self.value.lock() = None;
        Ok(())
    }
}

pub type Clock = Arc<dyn Fn() -> TimestampMs + Send + Sync>;

pub struct CheckpointStore {
    slot: Arc<dyn CheckpointSlot>,
    staleness_window: Duration,
    clock: Clock,
}

impl CheckpointStore {
    pub fn new(slot: Arc<dyn CheckpointSlot>) -> Self {
        Self {
            slot,
            staleness_window: DEFAULT_STALENESS_WINDOW,
            clock: Arc::new(now_millis),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCheckpointSlot::new()))
    }

    pub fn sled(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self::new(Arc::new(SledCheckpointSlot::new(db)?)))
    }

    pub fn with_staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = window;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn staleness_window(&self) -> Duration {
        self.staleness_window
    }

    /// Stamp the current time and overwrite the single record.
    pub fn save_checkpoint(&self, draft: CheckpointDraft) -> Result<QueueCheckpoint, StorageError> {
        let checkpoint = draft.stamp((self.clock)());
        self.write(&checkpoint)?;
        debug!(
            queue_id = %checkpoint.queue_id,
            current_shot_index = checkpoint.current_shot_index,
            total_shots = checkpoint.total_shots,
            "checkpoint saved"
        );
        Ok(checkpoint)
    }

    /// Return the record if present and fresh. Stale or unreadable records are deleted.
    pub fn load_checkpoint(&self) -> Result<Option<QueueCheckpoint>, StorageError> {
        let Some(raw) = self.slot.read()? else {
            return Ok(None);
        };
        let checkpoint: QueueCheckpoint = match serde_json::from_slice(&raw) {
            Ok(checkpoint) => checkpoint,
            Err(err) => {
                info!(error = %err, "discarding unreadable checkpoint");
                self.slot.remove()?;
                return Ok(None);
            }
        };
        let age_ms = (self.clock)().saturating_sub(checkpoint.timestamp);
        if u128::from(age_ms) > self.staleness_window.as_millis() {
            info!(
                queue_id = %checkpoint.queue_id,
                age_ms,
                "discarding stale checkpoint"
            );
            self.slot.remove()?;
            return Ok(None);
        }
        Ok(Some(checkpoint))
    }

    /// Advance the stored index and refresh its timestamp. No-op unless the stored
    /// record belongs to `queue_id`. Returns whether a record was updated.
    pub fn update_progress(&self, queue_id: &str, current_shot_index: usize) -> Result<bool, StorageError> {
        let Some(mut checkpoint) = self.load_checkpoint()? else {
            return Ok(false);
        };
        if checkpoint.queue_id != queue_id {
            debug!(
                stored = %checkpoint.queue_id,
                requested = %queue_id,
                "checkpoint belongs to another queue, not updated"
            );
            return Ok(false);
        }
        checkpoint.current_shot_index = current_shot_index;
        checkpoint.timestamp = (self.clock)();
        self.write(&checkpoint)?;
        Ok(true)
    }

    /// Idempotent delete.
    pub fn clear_checkpoint(&self) -> Result<(), StorageError> {
        self.slot.remove()?;
        debug!("checkpoint cleared");
        Ok(())
    }

    /// Raw record regardless of age, for inspection.
    pub fn peek(&self) -> Result<Option<QueueCheckpoint>, StorageError> {
        match self.slot.read()? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn write(&self, checkpoint: &QueueCheckpoint) -> Result<(), StorageError> {
        self.slot.write(serde_json::to_vec(checkpoint)?)
    }
}

//! Progress runtime: sequencing and best-effort emission of queue events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::StorageError;
use crate::progress::event::ProgressEvent;
use crate::progress::store::ProgressStore;

static QUEUE_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
pub struct ProgressRuntime {
    store: Arc<ProgressStore>,
}

impl ProgressRuntime {
    pub fn new(db: sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            store: ProgressStore::shared(db)?,
        })
    }

    pub fn emit_event(&self, queue_id: &str, event_type: &str, data: Value) -> Result<u64, StorageError> {
        let seq = self.store.next_seq(queue_id)?;
        let event = ProgressEvent {
            ts: now_millis().to_string(),
            queue: queue_id.to_string(),
            seq,
            event_type: event_type.to_string(),
            data,
        };
        self.store.append_event(&event)?;
        self.store.flush()?;
        Ok(seq)
    }

    pub fn emit_event_best_effort(&self, queue_id: &str, event_type: &str, data: Value) {
        if let Err(err) = self.emit_event(queue_id, event_type, data) {
            warn!(
                queue_id = %queue_id,
                event_type = %event_type,
                error = %err,
                "failed to emit progress event"
            );
        }
    }

    /// Serialize a typed payload and emit it, best effort.
    pub fn emit_typed<T: Serialize>(&self, queue_id: &str, event_type: &str, data: &T) {
        match serde_json::to_value(data) {
            Ok(value) => self.emit_event_best_effort(queue_id, event_type, value),
            Err(err) => warn!(
                queue_id = %queue_id,
                event_type = %event_type,
                error = %err,
                "failed to serialize progress event"
            ),
        }
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn new_queue_id() -> String {
    let ts = now_millis();
    let pid = std::process::id();
    let seq = QUEUE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("queue-{ts}-{pid}-{seq}")
}

//! Durable sled-backed progress event store.

use std::sync::Arc;

use sled::{Db, Tree};

use crate::error::StorageError;
use crate::progress::event::ProgressEvent;

const TREE_EVENTS: &str = "progress_events";
const TREE_META: &str = "progress_meta";
const EVENT_KEY_PAD: usize = 20;

#[derive(Clone)]
pub struct ProgressStore {
    db: Db,
    events: Tree,
    meta: Tree,
}

impl ProgressStore {
    pub fn new(db: Db) -> Result<Self, StorageError> {
        let events = db.open_tree(TREE_EVENTS)?;
        let meta = db.open_tree(TREE_META)?;
        Ok(Self { db, events, meta })
    }

    pub fn shared(db: Db) -> Result<Arc<Self>, StorageError> {
        Ok(Arc::new(Self::new(db)?))
    }

    /// Reserve the next sequence number for a queue's event stream.
    pub fn next_seq(&self, queue_id: &str) -> Result<u64, StorageError> {
        let updated = self.meta.update_and_fetch(queue_id.as_bytes(), |old| {
            let current = old
                .and_then(|raw| raw.try_into().ok())
                .map(u64::from_be_bytes)
                .unwrap_or(0);
            Some((current + 1).to_be_bytes().to_vec())
        })?;
        let seq = updated
            .and_then(|raw| raw[..].try_into().ok())
            .map(u64::from_be_bytes)
            .unwrap_or(1);
        Ok(seq)
    }

    pub fn append_event(&self, event: &ProgressEvent) -> Result<(), StorageError> {
        let key = encode_event_key(&event.queue, event.seq);
        let value = serde_json::to_vec(event)?;
        self.events.insert(key.as_bytes(), value)?;
        Ok(())
    }

    pub fn read_events(&self, queue_id: &str) -> Result<Vec<ProgressEvent>, StorageError> {
        self.read_events_after(queue_id, 0)
    }

    pub fn read_events_after(
        &self,
        queue_id: &str,
        after_seq: u64,
    ) -> Result<Vec<ProgressEvent>, StorageError> {
        let prefix = format!("{queue_id}:");
        let mut out = Vec::new();
        for result in self.events.scan_prefix(prefix.as_bytes()) {
            let (_, value) = result?;
            let parsed: ProgressEvent = serde_json::from_slice(&value)?;
            if parsed.seq > after_seq {
                out.push(parsed);
            }
        }
        out.sort_by_key(|e| e.seq);
        Ok(out)
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn encode_event_key(queue_id: &str, seq: u64) -> String {
        encode_event_key(queue_id, seq)
    }
}

fn encode_event_key(queue_id: &str, seq: u64) -> String {
    format!("{queue_id}:{seq:0EVENT_KEY_PAD$}")
}

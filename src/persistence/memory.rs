//! In-memory persistence, used by tests and embedders without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::PersistenceError;
use crate::persistence::Persistence;
use crate::progress::{new_queue_id, now_millis};
use crate::queue::{GenerationQueue, QueuePatch};
use crate::shot::{sort_by_sequence, ShotPatch, ShotSpec};

#[derive(Default)]
struct State {
    shots: HashMap<(String, String), ShotSpec>,
    queues: HashMap<String, GenerationQueue>,
    references: HashMap<(String, String), Vec<String>>,
}

#[derive(Default)]
pub struct InMemoryPersistence {
    state: Mutex<State>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shots(project_id: &str, shots: Vec<ShotSpec>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock();
            for shot in shots {
                state
                    .shots
                    .insert((project_id.to_string(), shot.id.clone()), shot);
            }
        }
        store
    }
}

fn key(project_id: &str, id: &str) -> (String, String) {
    (project_id.to_string(), id.to_string())
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn get_shot(&self, project_id: &str, shot_id: &str) -> Result<ShotSpec, PersistenceError> {
        self.state
            .lock()
            .shots
            .get(&key(project_id, shot_id))
            .cloned()
            .ok_or_else(|| PersistenceError::ShotNotFound(shot_id.to_string()))
    }

    async fn list_shots(&self, project_id: &str) -> Result<Vec<ShotSpec>, PersistenceError> {
        let mut shots: Vec<ShotSpec> = self
            .state
            .lock()
            .shots
            .iter()
            .filter(|((project, _), _)| project == project_id)
            .map(|(_, shot)| shot.clone())
            .collect();
        sort_by_sequence(&mut shots);
        Ok(shots)
    }

    async fn put_shot(&self, project_id: &str, shot: ShotSpec) -> Result<(), PersistenceError> {
        self.state
            .lock()
            .shots
            .insert(key(project_id, &shot.id), shot);
        Ok(())
    }

    async fn update_shot(
        &self,
        project_id: &str,
        shot_id: &str,
        patch: ShotPatch,
    ) -> Result<ShotSpec, PersistenceError> {
        let mut state = self.state.lock();
        let shot = state
            .shots
            .get_mut(&key(project_id, shot_id))
            .ok_or_else(|| PersistenceError::ShotNotFound(shot_id.to_string()))?;
        shot.apply(&patch);
        Ok(shot.clone())
    }

    async fn create_queue(
        &self,
        project_id: &str,
        shot_ids: Vec<String>,
    ) -> Result<GenerationQueue, PersistenceError> {
        let queue = GenerationQueue::new(new_queue_id(), project_id, shot_ids, now_millis());
        self.state
            .lock()
            .queues
            .insert(queue.id.clone(), queue.clone());
        Ok(queue)
    }

    async fn get_queue(&self, queue_id: &str) -> Result<GenerationQueue, PersistenceError> {
        self.state
            .lock()
            .queues
            .get(queue_id)
            .cloned()
            .ok_or_else(|| PersistenceError::QueueNotFound(queue_id.to_string()))
    }

    async fn update_queue(
        &self,
        queue_id: &str,
        patch: QueuePatch,
    ) -> Result<GenerationQueue, PersistenceError> {
        let mut state = self.state.lock();
        let queue = state
            .queues
            .get_mut(queue_id)
            .ok_or_else(|| PersistenceError::QueueNotFound(queue_id.to_string()))?;
        queue.apply(&patch);
        Ok(queue.clone())
    }

    async fn resolve_references(
        &self,
        project_id: &str,
        tags: &[String],
    ) -> Result<Vec<String>, PersistenceError> {
        let state = self.state.lock();
        Ok(tags
            .iter()
            .filter_map(|tag| state.references.get(&key(project_id, tag)))
            .flatten()
            .cloned()
            .collect())
    }

    async fn put_references(
        &self,
        project_id: &str,
        tag: &str,
        assets: Vec<String>,
    ) -> Result<(), PersistenceError> {
        self.state
            .lock()
            .references
            .insert(key(project_id, tag), assets);
        Ok(())
    }
}

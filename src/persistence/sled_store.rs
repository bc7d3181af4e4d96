//! Sled-backed project store: shots, queues and reference assets as JSON values.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};

use crate::error::{PersistenceError, StorageError};
use crate::persistence::Persistence;
use crate::progress::{new_queue_id, now_millis};
use crate::queue::{GenerationQueue, QueuePatch};
use crate::shot::{sort_by_sequence, ShotPatch, ShotSpec};

const TREE_SHOTS: &str = "shots";
const TREE_QUEUES: &str = "queues";
const TREE_REFERENCES: &str = "references";

#[derive(Clone)]
pub struct SledProjectStore {
    db: Db,
    shots: Tree,
    queues: Tree,
    references: Tree,
}

impl SledProjectStore {
    pub fn new(db: Db) -> Result<Self, StorageError> {
        let shots = db.open_tree(TREE_SHOTS)?;
        let queues = db.open_tree(TREE_QUEUES)?;
        let references = db.open_tree(TREE_REFERENCES)?;
        Ok(Self {
            db,
            shots,
            queues,
            references,
        })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn list_queues(&self) -> Result<Vec<GenerationQueue>, StorageError> {
        let mut out = Vec::new();
        for result in self.queues.iter() {
            let (_, value) = result?;
            out.push(serde_json::from_slice::<GenerationQueue>(&value)?);
        }
        out.sort_by_key(|q| std::cmp::Reverse(q.created_at_ms));
        Ok(out)
    }

    fn read<T: DeserializeOwned>(tree: &Tree, key: &str) -> Result<Option<T>, StorageError> {
        match tree.get(key.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, tree: &Tree, key: &str, value: &T) -> Result<(), StorageError> {
        tree.insert(key.as_bytes(), serde_json::to_vec(value)?)?;
        self.db.flush()?;
        Ok(())
    }
}

fn scoped_key(project_id: &str, id: &str) -> String {
    format!("{project_id}:{id}")
}

#[async_trait]
impl Persistence for SledProjectStore {
    async fn get_shot(&self, project_id: &str, shot_id: &str) -> Result<ShotSpec, PersistenceError> {
        Self::read(&self.shots, &scoped_key(project_id, shot_id))?
            .ok_or_else(|| PersistenceError::ShotNotFound(shot_id.to_string()))
    }

    async fn list_shots(&self, project_id: &str) -> Result<Vec<ShotSpec>, PersistenceError> {
        let prefix = format!("{project_id}:");
        let mut shots = Vec::new();
        for result in self.shots.scan_prefix(prefix.as_bytes()) {
            let (_, value) = result.map_err(StorageError::from)?;
            shots.push(serde_json::from_slice::<ShotSpec>(&value).map_err(StorageError::from)?);
        }
        sort_by_sequence(&mut shots);
        Ok(shots)
    }

    async fn put_shot(&self, project_id: &str, shot: ShotSpec) -> Result<(), PersistenceError> {
        self.write(&self.shots, &scoped_key(project_id, &shot.id), &shot)?;
        Ok(())
    }

    async fn update_shot(
        &self,
        project_id: &str,
        shot_id: &str,
        patch: ShotPatch,
    ) -> Result<ShotSpec, PersistenceError> {
        let key = scoped_key(project_id, shot_id);
        let mut shot: ShotSpec = Self::read(&self.shots, &key)?
            .ok_or_else(|| PersistenceError::ShotNotFound(shot_id.to_string()))?;
        shot.apply(&patch);
        self.write(&self.shots, &key, &shot)?;
        Ok(shot)
    }

    async fn create_queue(
        &self,
        project_id: &str,
        shot_ids: Vec<String>,
    ) -> Result<GenerationQueue, PersistenceError> {
        let queue = GenerationQueue::new(new_queue_id(), project_id, shot_ids, now_millis());
        self.write(&self.queues, &queue.id, &queue)?;
        Ok(queue)
    }

    async fn get_queue(&self, queue_id: &str) -> Result<GenerationQueue, PersistenceError> {
        Self::read(&self.queues, queue_id)?
            .ok_or_else(|| PersistenceError::QueueNotFound(queue_id.to_string()))
    }

    async fn update_queue(
        &self,
        queue_id: &str,
        patch: QueuePatch,
    ) -> Result<GenerationQueue, PersistenceError> {
        let mut queue: GenerationQueue = Self::read(&self.queues, queue_id)?
            .ok_or_else(|| PersistenceError::QueueNotFound(queue_id.to_string()))?;
        queue.apply(&patch);
        self.write(&self.queues, queue_id, &queue)?;
        Ok(queue)
    }

    async fn resolve_references(
        &self,
        project_id: &str,
        tags: &[String],
    ) -> Result<Vec<String>, PersistenceError> {
        let mut assets = Vec::new();
        for tag in tags {
            if let Some(found) = Self::read::<Vec<String>>(&self.references, &scoped_key(project_id, tag))? {
                assets.extend(found);
            }
        }
        Ok(assets)
    }

    async fn put_references(
        &self,
        project_id: &str,
        tag: &str,
        assets: Vec<String>,
    ) -> Result<(), PersistenceError> {
        self.write(&self.references, &scoped_key(project_id, tag), &assets)?;
        Ok(())
    }
}

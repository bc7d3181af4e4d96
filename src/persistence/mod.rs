//! Persistence collaborator for projects, shots, queues and reference assets.
//!
//! The orchestrator awaits every call and treats any failure inside the dispatch loop
//! as queue-fatal.

mod memory;
mod sled_store;

pub use memory::InMemoryPersistence;
pub use sled_store::SledProjectStore;

use crate::error::PersistenceError;
use crate::queue::{GenerationQueue, QueuePatch};
use crate::shot::{ShotPatch, ShotSpec};
use async_trait::async_trait;

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn get_shot(&self, project_id: &str, shot_id: &str) -> Result<ShotSpec, PersistenceError>;

    /// Shots of a project in sequence order.
    async fn list_shots(&self, project_id: &str) -> Result<Vec<ShotSpec>, PersistenceError>;

    async fn put_shot(&self, project_id: &str, shot: ShotSpec) -> Result<(), PersistenceError>;

    async fn update_shot(
        &self,
        project_id: &str,
        shot_id: &str,
        patch: ShotPatch,
    ) -> Result<ShotSpec, PersistenceError>;

    async fn create_queue(
        &self,
        project_id: &str,
        shot_ids: Vec<String>,
    ) -> Result<GenerationQueue, PersistenceError>;

    async fn get_queue(&self, queue_id: &str) -> Result<GenerationQueue, PersistenceError>;

    async fn update_queue(
        &self,
        queue_id: &str,
        patch: QueuePatch,
    ) -> Result<GenerationQueue, PersistenceError>;

    /// Resolve reference tags to asset locations. Unknown tags resolve to nothing.
    async fn resolve_references(
        &self,
        project_id: &str,
        tags: &[String],
    ) -> Result<Vec<String>, PersistenceError>;

    async fn put_references(
        &self,
        project_id: &str,
        tag: &str,
        assets: Vec<String>,
    ) -> Result<(), PersistenceError>;
}

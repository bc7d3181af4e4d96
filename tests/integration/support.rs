//! Shared collaborators for orchestrator tests: a scripted backend and a recording,
//! fault-injecting persistence wrapper.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use shotqueue::backend::{DispatchSettings, GeneratedOutput, GenerationBackend};
use shotqueue::checkpoint::CheckpointStore;
use shotqueue::error::{GenerationError, PersistenceError};
use shotqueue::persistence::{InMemoryPersistence, Persistence};
use shotqueue::queue::{GenerationQueue, QueueOrchestrator, QueuePatch};
use shotqueue::shot::{ShotPatch, ShotSpec};

pub const PROJECT: &str = "p1";

type Hook = Box<dyn Fn(&str) + Send + Sync>;

/// Backend that records every prompt and fails or hangs on request.
#[derive(Default)]
pub struct ScriptedBackend {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    failing: Mutex<HashSet<String>>,
    hang_on: Mutex<HashSet<String>>,
    hook: Mutex<Option<Hook>>,
    pub hanging: Notify,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, prompt: &str) {
        self.failing.lock().insert(prompt.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    pub fn hang_on(&self, prompt: &str) {
        self.hang_on.lock().insert(prompt.to_string());
    }

    pub fn on_dispatch(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn assets_for(&self, prompt: &str) -> Option<Vec<String>> {
        self.calls
            .lock()
            .iter()
            .find(|(p, _)| p == prompt)
            .map(|(_, a)| a.clone())
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn dispatch(
        &self,
        prompt: &str,
        reference_assets: &[String],
        _settings: &DispatchSettings,
    ) -> Result<GeneratedOutput, GenerationError> {
        let n = {
            let mut calls = self.calls.lock();
            calls.push((prompt.to_string(), reference_assets.to_vec()));
            calls.len()
        };
        if let Some(hook) = self.hook.lock().as_ref() {
            hook(prompt);
        }
        if self.hang_on.lock().contains(prompt) {
            self.hanging.notify_one();
            std::future::pending::<()>().await;
        }
        if self.failing.lock().contains(prompt) {
            return Err(GenerationError::Rejected(format!("cannot render '{}'", prompt)));
        }
        Ok(GeneratedOutput {
            output_id: format!("out-{n}"),
            output_url: format!("https://cdn.test/{n}.png"),
        })
    }

    fn backend_name(&self) -> &str {
        "scripted"
    }
}

/// In-memory persistence that records queue patches and can fail shot updates
/// or reference lookups.
#[derive(Default)]
pub struct RecordingPersistence {
    pub inner: InMemoryPersistence,
    queue_patches: Mutex<Vec<QueuePatch>>,
    fail_shot: Mutex<Option<String>>,
    fail_references: Mutex<bool>,
}

impl RecordingPersistence {
    pub fn with_shots(shots: Vec<ShotSpec>) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryPersistence::with_shots(PROJECT, shots),
            ..Self::default()
        })
    }

    pub fn fail_updates_of(&self, shot_id: &str) {
        *self.fail_shot.lock() = Some(shot_id.to_string());
    }

    pub fn fail_reference_lookups(&self) {
        *self.fail_references.lock() = true;
    }

    /// Progress values written after each shot, in order.
    pub fn progress_history(&self) -> Vec<f64> {
        self.queue_patches
            .lock()
            .iter()
            .filter(|p| p.current_shot_index.is_some() && p.status.is_none())
            .filter_map(|p| p.progress)
            .collect()
    }
}

#[async_trait]
impl Persistence for RecordingPersistence {
    async fn get_shot(&self, project_id: &str, shot_id: &str) -> Result<ShotSpec, PersistenceError> {
        self.inner.get_shot(project_id, shot_id).await
    }

    async fn list_shots(&self, project_id: &str) -> Result<Vec<ShotSpec>, PersistenceError> {
        self.inner.list_shots(project_id).await
    }

    async fn put_shot(&self, project_id: &str, shot: ShotSpec) -> Result<(), PersistenceError> {
        self.inner.put_shot(project_id, shot).await
    }

    async fn update_shot(
        &self,
        project_id: &str,
        shot_id: &str,
        patch: ShotPatch,
    ) -> Result<ShotSpec, PersistenceError> {
        let failing = self.fail_shot.lock().as_deref() == Some(shot_id);
        if failing {
            return Err(PersistenceError::Unavailable("database offline".to_string()));
        }
        self.inner.update_shot(project_id, shot_id, patch).await
    }

    async fn create_queue(
        &self,
        project_id: &str,
        shot_ids: Vec<String>,
    ) -> Result<GenerationQueue, PersistenceError> {
        self.inner.create_queue(project_id, shot_ids).await
    }

    async fn get_queue(&self, queue_id: &str) -> Result<GenerationQueue, PersistenceError> {
        self.inner.get_queue(queue_id).await
    }

    async fn update_queue(
        &self,
        queue_id: &str,
        patch: QueuePatch,
    ) -> Result<GenerationQueue, PersistenceError> {
        self.queue_patches.lock().push(patch.clone());
        self.inner.update_queue(queue_id, patch).await
    }

    async fn resolve_references(
        &self,
        project_id: &str,
        tags: &[String],
    ) -> Result<Vec<String>, PersistenceError> {
        if *self.fail_references.lock() {
            return Err(PersistenceError::Unavailable("reference index offline".to_string()));
        }
        self.inner.resolve_references(project_id, tags).await
    }

    async fn put_references(
        &self,
        project_id: &str,
        tag: &str,
        assets: Vec<String>,
    ) -> Result<(), PersistenceError> {
        self.inner.put_references(project_id, tag, assets).await
    }
}

pub struct Harness {
    pub backend: Arc<ScriptedBackend>,
    pub persistence: Arc<RecordingPersistence>,
    pub checkpoints: Arc<CheckpointStore>,
    pub orchestrator: QueueOrchestrator,
}

impl Harness {
    pub fn new(shots: Vec<ShotSpec>) -> Self {
        Self::with_checkpoints(shots, CheckpointStore::in_memory())
    }

    pub fn with_checkpoints(shots: Vec<ShotSpec>, checkpoints: CheckpointStore) -> Self {
        let backend = ScriptedBackend::new();
        let persistence = RecordingPersistence::with_shots(shots);
        let checkpoints = Arc::new(checkpoints);
        let orchestrator =
            QueueOrchestrator::new(backend.clone(), persistence.clone(), checkpoints.clone());
        Self {
            backend,
            persistence,
            checkpoints,
            orchestrator,
        }
    }

    pub async fn queue_over(&self, ids: &[&str]) -> GenerationQueue {
        self.persistence
            .create_queue(PROJECT, ids.iter().map(|s| s.to_string()).collect())
            .await
            .unwrap()
    }

    pub async fn shot(&self, id: &str) -> ShotSpec {
        self.persistence.get_shot(PROJECT, id).await.unwrap()
    }

    pub async fn queue(&self, id: &str) -> GenerationQueue {
        self.persistence.get_queue(id).await.unwrap()
    }
}

/// Shots `s0..sN` with the given prompts, in sequence order.
pub fn shots(prompts: &[&str]) -> Vec<ShotSpec> {
    prompts
        .iter()
        .enumerate()
        .map(|(i, prompt)| ShotSpec::new(format!("s{i}"), i as f64, *prompt))
        .collect()
}

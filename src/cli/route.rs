//! CLI route: single route table and run context.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::backend::HttpGenerationBackend;
use crate::checkpoint::{CheckpointStore, RecoveryController};
use crate::cli::output;
use crate::cli::parse::{CheckpointCommands, Commands};
use crate::config::{ConfigLoader, ShotQueueConfig};
use crate::persistence::{Persistence, SledProjectStore};
use crate::progress::ProgressRuntime;
use crate::queue::{QueueOrchestrator, RunHandle};
use crate::shot::ShotSpec;
use crate::variation::{self, VariationGrammar};

/// Shot import file.
#[derive(Debug, Deserialize)]
pub struct ImportFile {
    pub shots: Vec<ShotSpec>,
    /// Reference tag to asset locations.
    #[serde(default)]
    pub references: HashMap<String, Vec<String>>,
}

/// Runtime context for CLI execution: config, stores and the async runtime.
pub struct RunContext {
    config: ShotQueueConfig,
    store: Arc<SledProjectStore>,
    checkpoints: Arc<CheckpointStore>,
    progress: ProgressRuntime,
    runtime: tokio::runtime::Runtime,
}

impl RunContext {
    /// Create run context from workspace root and optional config path.
    pub fn new(workspace_root: &Path, config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(workspace_root)?,
        };
        Self::from_config(config)
    }

    pub fn from_config(config: ShotQueueConfig) -> Result<Self> {
        let db_path: PathBuf = config.storage.database_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
        }
        let db = sled::open(&db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

        let store = Arc::new(SledProjectStore::new(db.clone())?);
        let checkpoints = Arc::new(
            CheckpointStore::sled(&db)?
                .with_staleness_window(config.checkpoint.staleness_window()),
        );
        let progress = ProgressRuntime::new(db)?;
        let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

        Ok(Self {
            config,
            store,
            checkpoints,
            progress,
            runtime,
        })
    }

    pub fn config(&self) -> &ShotQueueConfig {
        &self.config
    }

    fn grammar(&self) -> VariationGrammar {
        VariationGrammar::new(self.config.grammar.clone())
    }

    fn orchestrator(&self) -> Result<QueueOrchestrator> {
        let backend = HttpGenerationBackend::from_config(&self.config.backend)
            .context("Generation backend is not usable; set [backend].endpoint")?;
        Ok(QueueOrchestrator::new(
            Arc::new(backend),
            self.store.clone(),
            self.checkpoints.clone(),
        )
        .with_grammar(self.grammar())
        .with_settings(self.config.backend.dispatch_settings())
        .with_progress(self.progress.clone()))
    }

    pub fn execute(&self, command: &Commands) -> Result<String> {
        match command {
            Commands::Expand { prompt, all } => {
                let grammar = self.grammar();
                let parsed = if *all {
                    grammar.parse(prompt)
                } else {
                    grammar.preview(prompt)
                };
                Ok(output::format_parse(prompt, &parsed))
            }
            Commands::Import { file, project } => self.import(file, project),
            Commands::Shots { project } => {
                let shots = self.runtime.block_on(self.store.list_shots(project))?;
                Ok(output::format_shots_table(&shots, &self.config.grammar))
            }
            Commands::Estimate { project, shots } => {
                let selected = self.select_shots(project, shots)?;
                let total = variation::total_outputs_for(&selected, &self.config.grammar);
                Ok(format!(
                    "{} shot(s), {} output(s)",
                    selected.len(),
                    total
                ))
            }
            Commands::Generate { project, shots } => {
                let selected = self.select_shots(project, shots)?;
                if selected.is_empty() {
                    bail!("Project {} has no shots to generate", project);
                }
                let ids = selected.into_iter().map(|s| s.id).collect();
                let orchestrator = self.orchestrator()?;
                let handle = self.runtime.block_on(orchestrator.enqueue(project, ids))?;
                self.drive(handle)
            }
            Commands::Resume {
                queue,
                yes,
                discard,
            } => self.resume(queue, *yes, *discard),
            Commands::Retry { project, shot } => {
                let orchestrator = self.orchestrator()?;
                match shot {
                    Some(shot_id) => {
                        let outcome = self
                            .runtime
                            .block_on(orchestrator.retry_shot(project, shot_id))?;
                        Ok(output::format_shot_outcome(shot_id, &outcome))
                    }
                    None => {
                        let handle = self.runtime.block_on(orchestrator.retry_failed(project))?;
                        self.drive(handle)
                    }
                }
            }
            Commands::Status { queue } => match queue {
                Some(queue_id) => {
                    let queue = self.runtime.block_on(self.store.get_queue(queue_id))?;
                    Ok(output::format_queue(&queue))
                }
                None => Ok(output::format_queue_list(&self.store.list_queues()?)),
            },
            Commands::Checkpoint { command } => match command {
                CheckpointCommands::Show => {
                    let raw = self.checkpoints.peek()?;
                    let fresh = self.checkpoints.load_checkpoint()?.is_some();
                    Ok(output::format_checkpoint(raw.as_ref(), fresh))
                }
                CheckpointCommands::Clear => {
                    self.checkpoints.clear_checkpoint()?;
                    Ok("Checkpoint cleared.".to_string())
                }
            },
            Commands::Events { queue, after } => {
                let events = self.progress.store().read_events_after(queue, *after)?;
                Ok(output::format_events(&events))
            }
        }
    }

    fn import(&self, file: &Path, project: &str) -> Result<String> {
        let raw = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let import: ImportFile = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid shot file {}", file.display()))?;
        let shot_count = import.shots.len();
        let tag_count = import.references.len();
        self.runtime.block_on(async {
            for shot in import.shots {
                self.store.put_shot(project, shot).await?;
            }
            for (tag, assets) in import.references {
                self.store.put_references(project, &tag, assets).await?;
            }
            Ok::<_, crate::error::PersistenceError>(())
        })?;
        info!(project_id = %project, shots = shot_count, tags = tag_count, "shots imported");
        Ok(format!(
            "Imported {} shot(s) and {} reference tag(s) into {}",
            shot_count, tag_count, project
        ))
    }

    /// Shots of the project in sequence order, optionally restricted to `ids`.
    fn select_shots(&self, project: &str, ids: &[String]) -> Result<Vec<ShotSpec>> {
        let shots = self.runtime.block_on(self.store.list_shots(project))?;
        if ids.is_empty() {
            return Ok(shots);
        }
        for id in ids {
            if !shots.iter().any(|s| &s.id == id) {
                bail!("Shot {} not found in project {}", id, project);
            }
        }
        Ok(shots.into_iter().filter(|s| ids.contains(&s.id)).collect())
    }

    fn resume(&self, queue_id: &str, yes: bool, discard: bool) -> Result<String> {
        let orchestrator = self.orchestrator()?;
        let recovery = RecoveryController::new(orchestrator);
        let Some(offer) = recovery.inspect(queue_id)? else {
            return Ok(format!("No resumable checkpoint for queue {}.", queue_id));
        };
        if discard {
            recovery.discard()?;
            return Ok("Checkpoint discarded.".to_string());
        }
        if !yes {
            return Ok(format!(
                "{}\nRun again with --yes to resume or --discard to drop it.",
                offer.message
            ));
        }
        let handle = self.runtime.block_on(recovery.resume(&offer))?;
        self.drive(handle)
    }

    /// Run to completion; Ctrl-C cancels the in-flight dispatch.
    fn drive(&self, handle: RunHandle) -> Result<String> {
        let control = handle.control();
        let report = self.runtime.block_on(async move {
            let watcher = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    control.cancel();
                }
            });
            let report = handle.run().await;
            watcher.abort();
            report
        });
        Ok(output::format_run_report(&report))
    }
}

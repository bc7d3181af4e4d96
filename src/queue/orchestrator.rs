//! Queue Orchestrator
//!
//! Walks a queue's shots strictly in order, expands each prompt template, dispatches
//! every variant sequentially to the generation backend, and records per-shot results.
//! Progress is measured in rendered outputs. A checkpoint is written when the run starts
//! and after every shot, cleared on completion and kept on failure or interruption.
//!
//! At most one run is live per orchestrator. [`QueueOrchestrator::start`] hands out a
//! [`RunHandle`] that owns the run slot until it finishes or is dropped.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backend::{DispatchSettings, GenerationBackend};
use crate::checkpoint::{CheckpointDraft, CheckpointStore};
use crate::error::{GenerationError, QueueError};
use crate::persistence::Persistence;
use crate::progress::{
    ProgressRuntime, QueueEndedData, QueueStartedData, ShotEventData, VariantEventData,
};
use crate::queue::control::RunControl;
use crate::queue::model::{output_progress, GenerationQueue, QueuePatch, QueueStatus};
use crate::shot::{ShotPatch, ShotSpec, ShotStatus};
use crate::types::{QueueId, ShotId};
use crate::variation::{fan_outs, VariationGrammar};

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every shot was attempted.
    Completed,
    /// Pause was observed at a shot boundary.
    Paused,
    /// Cancellation interrupted the run; the in-flight shot was reset to ready.
    Cancelled,
    /// A queue-level fault stopped the run. The checkpoint is kept for resume.
    Failed { message: String },
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Paused => "paused",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::Failed { .. } => "failed",
        }
    }
}

/// Result of dispatching one shot.
#[derive(Debug, Clone, PartialEq)]
pub enum ShotOutcome {
    Completed { result_refs: Vec<String> },
    Failed { error: String, succeeded: usize },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShotRunResult {
    pub shot_id: ShotId,
    pub index: usize,
    pub outcome: ShotOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub queue_id: QueueId,
    pub outcome: RunOutcome,
    pub shots: Vec<ShotRunResult>,
    pub total_outputs: usize,
    pub outputs_succeeded: usize,
    pub outputs_failed: usize,
    pub progress: f64,
    /// Index of the next shot that would be dispatched.
    pub next_shot_index: usize,
}

impl RunReport {
    fn new(queue: &GenerationQueue) -> Self {
        Self {
            queue_id: queue.id.clone(),
            outcome: RunOutcome::Completed,
            shots: Vec::new(),
            total_outputs: 0,
            outputs_succeeded: 0,
            outputs_failed: 0,
            progress: queue.progress,
            next_shot_index: queue.current_shot_index,
        }
    }

    pub fn failed_shots(&self) -> impl Iterator<Item = &ShotRunResult> {
        self.shots
            .iter()
            .filter(|s| matches!(s.outcome, ShotOutcome::Failed { .. }))
    }
}

/// Releases the orchestrator's run slot on drop.
struct RunSlot {
    active: Arc<Mutex<Option<QueueId>>>,
    owner: QueueId,
}

impl Drop for RunSlot {
    fn drop(&mut self) {
        let mut active = self.active.lock();
        if active.as_deref() == Some(self.owner.as_str()) {
            *active = None;
        }
    }
}

#[derive(Clone)]
pub struct QueueOrchestrator {
    backend: Arc<dyn GenerationBackend>,
    persistence: Arc<dyn Persistence>,
    checkpoints: Arc<CheckpointStore>,
    grammar: VariationGrammar,
    settings: DispatchSettings,
    progress: Option<ProgressRuntime>,
    active: Arc<Mutex<Option<QueueId>>>,
}

impl QueueOrchestrator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        persistence: Arc<dyn Persistence>,
        checkpoints: Arc<CheckpointStore>,
    ) -> Self {
        Self {
            backend,
            persistence,
            checkpoints,
            grammar: VariationGrammar::default(),
            settings: DispatchSettings::default(),
            progress: None,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_grammar(mut self, grammar: VariationGrammar) -> Self {
        self.grammar = grammar;
        self
    }

    pub fn with_settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_progress(mut self, progress: ProgressRuntime) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    pub fn checkpoints(&self) -> &Arc<CheckpointStore> {
        &self.checkpoints
    }

    pub fn grammar(&self) -> &VariationGrammar {
        &self.grammar
    }

    /// Queue id of the live run, if any.
    pub fn active_queue(&self) -> Option<QueueId> {
        self.active.lock().clone()
    }

    /// Claim the run slot for `queue`. Only pending or paused queues can start.
    pub fn start(&self, queue: GenerationQueue) -> Result<RunHandle, QueueError> {
        if !queue.status.can_transition_to(QueueStatus::Processing) {
            return Err(QueueError::InvalidTransition {
                from: queue.status,
                to: QueueStatus::Processing,
            });
        }
        let slot = self.claim_slot(&queue.id)?;
        Ok(RunHandle {
            orchestrator: self.clone(),
            queue,
            control: RunControl::new(),
            _slot: slot,
        })
    }

    /// Create a queue over `shot_ids` and start it.
    pub async fn enqueue(&self, project_id: &str, shot_ids: Vec<ShotId>) -> Result<RunHandle, QueueError> {
        if let Some(active) = self.active_queue() {
            return Err(QueueError::RunActive(active));
        }
        let queue = self.persistence.create_queue(project_id, shot_ids).await?;
        self.start(queue)
    }

    /// Re-dispatch a single shot outside of any queue.
    pub async fn retry_shot(&self, project_id: &str, shot_id: &str) -> Result<ShotOutcome, QueueError> {
        let _slot = self.claim_slot(&format!("retry:{project_id}:{shot_id}"))?;
        let shot = self.persistence.get_shot(project_id, shot_id).await?;
        info!(project_id = %project_id, shot_id = %shot_id, "retrying shot");
        let outcome = self
            .dispatch_shot(project_id, None, &shot, &RunControl::new())
            .await?;
        Ok(outcome)
    }

    /// Start a new queue over every failed shot of the project, in sequence order.
    pub async fn retry_failed(&self, project_id: &str) -> Result<RunHandle, QueueError> {
        let failed: Vec<ShotId> = self
            .persistence
            .list_shots(project_id)
            .await?
            .into_iter()
            .filter(|shot| shot.status == ShotStatus::Failed)
            .map(|shot| shot.id)
            .collect();
        if failed.is_empty() {
            return Err(QueueError::NothingToRetry(project_id.to_string()));
        }
        info!(project_id = %project_id, shots = failed.len(), "retrying failed shots");
        self.enqueue(project_id, failed).await
    }

    fn claim_slot(&self, owner: &str) -> Result<RunSlot, QueueError> {
        let mut active = self.active.lock();
        if let Some(current) = active.as_ref() {
            return Err(QueueError::RunActive(current.clone()));
        }
        *active = Some(owner.to_string());
        Ok(RunSlot {
            active: self.active.clone(),
            owner: owner.to_string(),
        })
    }

    async fn execute(&self, queue: GenerationQueue, control: RunControl) -> RunReport {
        let mut report = RunReport::new(&queue);
        match self.drive(&queue, &control, &mut report).await {
            Ok(outcome) => report.outcome = outcome,
            Err(err) => {
                let message = err.to_string();
                error!(queue_id = %queue.id, error = %message, "queue run failed");
                if let Err(update_err) = self
                    .persistence
                    .update_queue(&queue.id, QueuePatch::failed(message.clone()))
                    .await
                {
                    warn!(
                        queue_id = %queue.id,
                        error = %update_err,
                        "failed to record queue failure"
                    );
                }
                report.outcome = RunOutcome::Failed { message };
            }
        }

        let error = match &report.outcome {
            RunOutcome::Failed { message } => Some(message.clone()),
            _ => None,
        };
        self.emit(
            &queue.id,
            &format!("queue_{}", report.outcome.as_str()),
            &QueueEndedData {
                status: report.outcome.as_str().to_string(),
                current_shot_index: report.next_shot_index,
                progress: report.progress,
                error,
            },
        );
        info!(
            queue_id = %queue.id,
            outcome = report.outcome.as_str(),
            next_shot_index = report.next_shot_index,
            progress = report.progress,
            outputs_succeeded = report.outputs_succeeded,
            outputs_failed = report.outputs_failed,
            "queue run finished"
        );
        report
    }

    async fn drive(
        &self,
        queue: &GenerationQueue,
        control: &RunControl,
        report: &mut RunReport,
    ) -> Result<RunOutcome, QueueError> {
        let project_id = queue.project_id.as_str();

        // Prompts are read once so the output total matches what is dispatched.
        let mut shots: Vec<ShotSpec> = Vec::with_capacity(queue.shot_ids.len());
        for shot_id in &queue.shot_ids {
            shots.push(self.persistence.get_shot(project_id, shot_id).await?);
        }
        let fan_out = fan_outs(&shots, self.grammar.config());
        let total_outputs = fan_out.iter().copied().fold(0usize, usize::saturating_add);
        let start_index = queue.current_shot_index.min(shots.len());
        let mut attempted = fan_out[..start_index]
            .iter()
            .copied()
            .fold(0usize, usize::saturating_add);
        report.total_outputs = total_outputs;
        report.next_shot_index = start_index;

        self.persistence
            .update_queue(
                &queue.id,
                QueuePatch {
                    status: Some(QueueStatus::Processing),
                    error_message: Some(None),
                    ..QueuePatch::default()
                },
            )
            .await?;
        self.checkpoints.save_checkpoint(CheckpointDraft {
            current_shot_index: start_index,
            ..CheckpointDraft::for_queue(queue)
        })?;

        info!(
            queue_id = %queue.id,
            project_id = %project_id,
            total_shots = shots.len(),
            total_outputs,
            start_index,
            "queue run started"
        );
        self.emit(
            &queue.id,
            "queue_started",
            &QueueStartedData {
                project_id: project_id.to_string(),
                total_shots: shots.len(),
                total_outputs,
                start_index,
            },
        );

        for (index, shot) in shots.iter().enumerate().skip(start_index) {
            if control.is_cancelled() {
                return self.interrupt(queue, RunOutcome::Cancelled).await;
            }
            if control.is_paused() {
                return self.interrupt(queue, RunOutcome::Paused).await;
            }

            self.emit(
                &queue.id,
                "shot_started",
                &ShotEventData {
                    shot_id: shot.id.clone(),
                    index,
                    fan_out: fan_out[index],
                    progress: None,
                    error: None,
                },
            );

            let outcome = self
                .dispatch_shot(project_id, Some(&queue.id), shot, control)
                .await?;
            let error = match &outcome {
                ShotOutcome::Cancelled => {
                    return self.interrupt(queue, RunOutcome::Cancelled).await;
                }
                ShotOutcome::Completed { result_refs } => {
                    report.outputs_succeeded =
                        report.outputs_succeeded.saturating_add(result_refs.len());
                    None
                }
                ShotOutcome::Failed { error, succeeded } => {
                    report.outputs_succeeded = report.outputs_succeeded.saturating_add(*succeeded);
                    report.outputs_failed = report
                        .outputs_failed
                        .saturating_add(fan_out[index].saturating_sub(*succeeded));
                    Some(error.clone())
                }
            };

            attempted = attempted.saturating_add(fan_out[index]);
            let progress = output_progress(attempted, total_outputs);
            self.persistence
                .update_queue(&queue.id, QueuePatch::advance(index + 1, progress))
                .await?;
            // The record timestamp tracks the last attempted shot, however long it ran.
            self.checkpoints.save_checkpoint(CheckpointDraft {
                current_shot_index: index + 1,
                ..CheckpointDraft::for_queue(queue)
            })?;
            report.progress = progress;
            report.next_shot_index = index + 1;
            report.shots.push(ShotRunResult {
                shot_id: shot.id.clone(),
                index,
                outcome,
            });

            let event_type = if error.is_some() { "shot_failed" } else { "shot_completed" };
            self.emit(
                &queue.id,
                event_type,
                &ShotEventData {
                    shot_id: shot.id.clone(),
                    index,
                    fan_out: fan_out[index],
                    progress: Some(progress),
                    error,
                },
            );
            debug!(queue_id = %queue.id, shot_id = %shot.id, index, progress, "shot attempted");
        }

        self.persistence
            .update_queue(
                &queue.id,
                QueuePatch {
                    status: Some(QueueStatus::Completed),
                    current_shot_index: Some(shots.len()),
                    progress: Some(100.0),
                    error_message: Some(None),
                },
            )
            .await?;
        self.checkpoints.clear_checkpoint()?;
        report.progress = 100.0;
        report.next_shot_index = shots.len();
        Ok(RunOutcome::Completed)
    }

    /// Park the queue as paused; the checkpoint stays in place for resume.
    async fn interrupt(
        &self,
        queue: &GenerationQueue,
        outcome: RunOutcome,
    ) -> Result<RunOutcome, QueueError> {
        self.persistence
            .update_queue(&queue.id, QueuePatch::status(QueueStatus::Paused))
            .await?;
        info!(queue_id = %queue.id, outcome = outcome.as_str(), "queue run interrupted");
        Ok(outcome)
    }

    /// Dispatch every variant of one shot and record the result on the shot.
    ///
    /// The first failing variant fails the shot and skips the remaining variants.
    /// Only persistence failures are returned as errors; the shot is then put back
    /// to ready so it stays editable.
    async fn dispatch_shot(
        &self,
        project_id: &str,
        queue_id: Option<&str>,
        shot: &ShotSpec,
        control: &RunControl,
    ) -> Result<ShotOutcome, QueueError> {
        self.persistence
            .update_shot(project_id, &shot.id, ShotPatch::generating())
            .await?;
        match self.dispatch_variants(project_id, queue_id, shot, control).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                if let Err(reset_err) = self
                    .persistence
                    .update_shot(project_id, &shot.id, ShotPatch::ready())
                    .await
                {
                    warn!(
                        shot_id = %shot.id,
                        error = %reset_err,
                        "failed to reset shot after queue fault"
                    );
                }
                Err(err)
            }
        }
    }

    async fn dispatch_variants(
        &self,
        project_id: &str,
        queue_id: Option<&str>,
        shot: &ShotSpec,
        control: &RunControl,
    ) -> Result<ShotOutcome, QueueError> {
        let assets = self
            .persistence
            .resolve_references(project_id, &shot.reference_tags)
            .await?;

        let parsed = self.grammar.parse(&shot.prompt_template);
        let prompts = if parsed.is_valid {
            parsed.expanded_prompts
        } else {
            warn!(
                shot_id = %shot.id,
                error = ?parsed.error_message(),
                "invalid variation syntax, dispatching prompt literally"
            );
            vec![shot.prompt_template.clone()]
        };

        let total = prompts.len();
        let mut result_refs = Vec::with_capacity(total);
        for (variant, prompt) in prompts.iter().enumerate() {
            if control.is_cancelled() {
                return self.abandon_shot(project_id, shot).await;
            }
            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = control.cancelled() => Err(GenerationError::Cancelled),
                result = self.backend.dispatch(prompt, &assets, &self.settings) => result,
            };
            match result {
                Ok(output) => {
                    debug!(
                        shot_id = %shot.id,
                        variant,
                        output_id = %output.output_id,
                        backend = self.backend.backend_name(),
                        "variant generated"
                    );
                    if let Some(queue_id) = queue_id {
                        self.emit(
                            queue_id,
                            "variant_dispatched",
                            &VariantEventData {
                                shot_id: shot.id.clone(),
                                variant,
                                output_id: output.output_id.clone(),
                                duration_ms: started.elapsed().as_millis(),
                            },
                        );
                    }
                    result_refs.push(output.output_url);
                }
                Err(GenerationError::Cancelled) => {
                    return self.abandon_shot(project_id, shot).await;
                }
                Err(err) => {
                    let message = if total > 1 {
                        format!("Variant {} of {} failed: {}", variant + 1, total, err)
                    } else {
                        err.to_string()
                    };
                    warn!(shot_id = %shot.id, variant, error = %err, "shot generation failed");
                    self.persistence
                        .update_shot(project_id, &shot.id, ShotPatch::failed(message.clone()))
                        .await?;
                    return Ok(ShotOutcome::Failed {
                        error: message,
                        succeeded: variant,
                    });
                }
            }
        }

        self.persistence
            .update_shot(project_id, &shot.id, ShotPatch::completed(result_refs.clone()))
            .await?;
        Ok(ShotOutcome::Completed { result_refs })
    }

    /// Return an interrupted shot to ready without recording results or errors.
    async fn abandon_shot(&self, project_id: &str, shot: &ShotSpec) -> Result<ShotOutcome, QueueError> {
        self.persistence
            .update_shot(project_id, &shot.id, ShotPatch::ready())
            .await?;
        info!(shot_id = %shot.id, "shot dispatch cancelled");
        Ok(ShotOutcome::Cancelled)
    }

    fn emit<T: Serialize>(&self, queue_id: &str, event_type: &str, data: &T) {
        if let Some(progress) = &self.progress {
            progress.emit_typed(queue_id, event_type, data);
        }
    }
}

/// Single-owner handle for one run.
pub struct RunHandle {
    orchestrator: QueueOrchestrator,
    queue: GenerationQueue,
    control: RunControl,
    _slot: RunSlot,
}

impl RunHandle {
    pub fn queue_id(&self) -> &str {
        &self.queue.id
    }

    pub fn queue(&self) -> &GenerationQueue {
        &self.queue
    }

    /// Pause/cancel handle usable from other tasks while the run is in progress.
    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    /// Drive the run to its end. The run slot is released when this returns.
    pub async fn run(self) -> RunReport {
        let RunHandle {
            orchestrator,
            queue,
            control,
            _slot,
        } = self;
        orchestrator.execute(queue, control).await
    }
}

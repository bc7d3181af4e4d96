//! Generation queues and their orchestration.

pub mod control;
pub mod model;
pub mod orchestrator;

pub use control::RunControl;
pub use model::{output_progress, GenerationQueue, QueuePatch, QueueStatus};
pub use orchestrator::{
    QueueOrchestrator, RunHandle, RunOutcome, RunReport, ShotOutcome, ShotRunResult,
};

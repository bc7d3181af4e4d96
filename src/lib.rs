//! shotqueue: combinatorial prompt expansion and resumable generation queues.
//!
//! A shot's prompt template may contain bracketed option groups (`"[dawn, dusk]"`) that
//! expand to the cartesian product of their options. Shots are rendered one at a time
//! through a [`queue::QueueOrchestrator`] that reports progress in outputs, isolates
//! per-shot failures, and checkpoints after every shot so an interrupted run can resume.

pub mod backend;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod progress;
pub mod queue;
pub mod shot;
pub mod types;
pub mod variation;

//! Output counting for progress totals and cost estimates.
//!
//! Counts come from the same grammar the orchestrator dispatches with, so an estimate
//! always equals the number of backend calls a run will make.

use crate::shot::ShotSpec;
use crate::variation::grammar::{total_count, GrammarConfig};

/// Total outputs a list of shots will produce.
pub fn total_outputs_for(shots: &[ShotSpec], config: &GrammarConfig) -> usize {
    shots
        .iter()
        .map(|shot| total_count(&shot.prompt_template, config))
        .fold(0usize, usize::saturating_add)
}

/// Per-shot fan-out, in input order.
pub fn fan_outs(shots: &[ShotSpec], config: &GrammarConfig) -> Vec<usize> {
    shots
        .iter()
        .map(|shot| total_count(&shot.prompt_template, config))
        .collect()
}

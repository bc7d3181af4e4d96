//! Shot records: one row of requested generated content.

use crate::error::QueueError;
use crate::types::ShotId;
use crate::variation::grammar::{total_count, GrammarConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShotStatus {
    #[default]
    Ready,
    Generating,
    Completed,
    Failed,
}

impl ShotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ShotStatus::Ready => "ready",
            ShotStatus::Generating => "generating",
            ShotStatus::Completed => "completed",
            ShotStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ShotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotSpec {
    pub id: ShotId,
    /// Fractional values splice shots between existing ones without renumbering.
    pub sequence_number: f64,
    pub prompt_template: String,
    #[serde(default)]
    pub reference_tags: Vec<String>,
    #[serde(default)]
    pub status: ShotStatus,
    /// One output reference per expanded variant.
    #[serde(default)]
    pub result_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ShotSpec {
    pub fn new(id: impl Into<ShotId>, sequence_number: f64, prompt_template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sequence_number,
            prompt_template: prompt_template.into(),
            reference_tags: Vec::new(),
            status: ShotStatus::Ready,
            result_refs: Vec::new(),
            error_message: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reference_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn fan_out(&self, config: &GrammarConfig) -> usize {
        total_count(&self.prompt_template, config)
    }

    pub fn is_generating(&self) -> bool {
        self.status == ShotStatus::Generating
    }

    /// Replace the prompt template. Rejected while the shot is generating.
    pub fn edit_prompt(&mut self, prompt_template: impl Into<String>) -> Result<(), QueueError> {
        if self.is_generating() {
            return Err(QueueError::ShotLocked(self.id.clone()));
        }
        self.prompt_template = prompt_template.into();
        Ok(())
    }

    /// Replace the reference tags. Rejected while the shot is generating.
    pub fn edit_references(&mut self, tags: Vec<String>) -> Result<(), QueueError> {
        if self.is_generating() {
            return Err(QueueError::ShotLocked(self.id.clone()));
        }
        self.reference_tags = tags;
        Ok(())
    }

    pub fn apply(&mut self, patch: &ShotPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(refs) = &patch.result_refs {
            self.result_refs = refs.clone();
        }
        if let Some(error) = &patch.error_message {
            self.error_message = error.clone();
        }
    }
}

/// Partial update written by the orchestrator.
///
/// `error_message: Some(None)` clears a previous error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShotPatch {
    pub status: Option<ShotStatus>,
    pub result_refs: Option<Vec<String>>,
    pub error_message: Option<Option<String>>,
}

impl ShotPatch {
    pub fn generating() -> Self {
        Self {
            status: Some(ShotStatus::Generating),
            ..Self::default()
        }
    }

    pub fn completed(result_refs: Vec<String>) -> Self {
        Self {
            status: Some(ShotStatus::Completed),
            result_refs: Some(result_refs),
            error_message: Some(None),
        }
    }

    /// Leaves `result_refs` untouched.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(ShotStatus::Failed),
            result_refs: None,
            error_message: Some(Some(message.into())),
        }
    }

    pub fn ready() -> Self {
        Self {
            status: Some(ShotStatus::Ready),
            ..Self::default()
        }
    }
}

/// Sort shots into sequence order.
pub fn sort_by_sequence(shots: &mut [ShotSpec]) {
    shots.sort_by(|a, b| {
        a.sequence_number
            .total_cmp(&b.sequence_number)
            .then_with(|| a.id.cmp(&b.id))
    });
}

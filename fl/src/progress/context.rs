//! The per-iteration prompt input

use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use crate::domain::Phase;

/// Marker used when the progress log does not exist yet
pub const NO_PROGRESS_MARKER: &str = "No prior progress recorded.";

/// How the specification reaches the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpecSection {
    /// Full text inlined
    Inline { content: String },
    /// Too large; the agent reads it on demand
    OnDemand { instruction: String },
}

/// A file the caller asked to include for this iteration only
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggedFile {
    pub path: String,
    pub content: String,
}

/// The feature an iteration targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureFocus {
    pub id: String,
    pub description: String,
    pub priority: String,
}

/// Values explicitly carried from one iteration into the next
///
/// Nothing else survives an iteration boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CarryOver {
    /// Approved or pending plan for the current feature
    pub plan: Option<String>,

    /// Last rejected plan (re-planning only)
    pub previous_plan: Option<String>,

    /// Why `previous_plan` was rejected
    pub validation_feedback: Option<String>,

    /// Rejections so far for the current feature
    pub validation_attempt: u32,

    /// Report of the previous iteration's executed actions
    pub action_report: Option<String>,

    /// Question the agent asked and the user's answer
    pub user_question: Option<String>,
    pub user_answer: Option<String>,
}

impl CarryOver {
    pub fn is_replanning(&self) -> bool {
        self.previous_plan.is_some() || self.validation_feedback.is_some()
    }
}

/// Complete, self-contained input for one agent call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationContext {
    pub iteration: u32,
    pub max_iterations: u32,
    pub phase: Option<Phase>,
    pub feature: Option<FeatureFocus>,
    pub spec_path: PathBuf,
    pub spec: SpecSection,
    /// Bounded tail of the progress log, or [`NO_PROGRESS_MARKER`]
    pub progress: String,
    /// Earlier lines dropped from `progress`
    pub progress_truncated_lines: usize,
    pub listing: Option<String>,
    pub tagged_files: Vec<TaggedFile>,
    pub max_validation_attempts: u32,
    pub carry: CarryOver,
}

impl IterationContext {
    /// Approximate size of the variable content in bytes
    pub fn approx_bytes(&self) -> usize {
        let spec = match &self.spec {
            SpecSection::Inline { content } => content.len(),
            SpecSection::OnDemand { instruction } => instruction.len(),
        };
        let size = spec
            + self.progress.len()
            + self.listing.as_ref().map_or(0, |l| l.len())
            + self.tagged_files.iter().map(|f| f.path.len() + f.content.len()).sum::<usize>()
            + self.carry.action_report.as_ref().map_or(0, |r| r.len());
        debug!(%size, "IterationContext::approx_bytes: computed");
        size
    }
}

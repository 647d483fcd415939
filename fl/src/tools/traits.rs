//! ActionRunner trait and result types

use async_trait::async_trait;
use tracing::debug;

use super::{ToolContext, ToolError};
use crate::protocol::SubAction;

/// Max characters of a single result's output carried into the next prompt
const MAX_REPORT_OUTPUT_CHARS: usize = 8_000;

/// Executes one sub-action
///
/// The executor owns scheduling and cancellation; a runner only owns what a
/// sub-action means.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(&self, action: &SubAction, ctx: &ToolContext) -> Result<String, ToolError>;
}

/// Outcome of one sub-action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub action: SubAction,
    pub success: bool,
    pub output: String,
    pub error: String,
    /// False when the executor gave up before the sub-action started
    pub attempted: bool,
}

impl ActionResult {
    /// Create a successful result
    pub fn success(action: SubAction, output: impl Into<String>) -> Self {
        debug!(kind = %action.kind, "ActionResult::success: called");
        Self {
            action,
            success: true,
            output: output.into(),
            error: String::new(),
            attempted: true,
        }
    }

    /// Create a failed result from a tool error
    pub fn failure(action: SubAction, err: ToolError) -> Self {
        debug!(kind = %action.kind, %err, "ActionResult::failure: called");
        Self {
            action,
            success: false,
            output: String::new(),
            attempted: err.attempted(),
            error: err.to_string(),
        }
    }
}

/// Aggregate outcome of a batch, in input order
///
/// The counters are derived from `results` at construction and cannot drift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelResult {
    results: Vec<ActionResult>,
    all_succeeded: bool,
    failed_count: usize,
}

impl ParallelResult {
    pub fn from_results(results: Vec<ActionResult>) -> Self {
        let failed_count = results.iter().filter(|r| !r.success).count();
        debug!(total = results.len(), failed_count, "ParallelResult::from_results: called");
        Self {
            all_succeeded: failed_count == 0,
            failed_count,
            results,
        }
    }

    pub fn results(&self) -> &[ActionResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ActionResult> {
        self.results
    }

    pub fn all_succeeded(&self) -> bool {
        self.all_succeeded
    }

    pub fn failed_count(&self) -> usize {
        self.failed_count
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Report rendered into the next iteration's prompt
    pub fn summary(&self) -> String {
        debug!(total = self.results.len(), "ParallelResult::summary: called");
        let mut out = format!(
            "Results of {} action(s): {} succeeded, {} failed\n",
            self.results.len(),
            self.results.len() - self.failed_count,
            self.failed_count
        );

        for (i, result) in self.results.iter().enumerate() {
            let label = result.action.describe();
            if result.success {
                out.push_str(&format!(
                    "\n[{}] {}: ok\n{}\n",
                    i + 1,
                    label,
                    truncate_chars(&result.output, MAX_REPORT_OUTPUT_CHARS)
                ));
            } else {
                let note = if result.attempted { "FAILED" } else { "NOT RUN" };
                out.push_str(&format!(
                    "\n[{}] {}: {}\n{}\n",
                    i + 1,
                    label,
                    note,
                    truncate_chars(&result.error, MAX_REPORT_OUTPUT_CHARS)
                ));
            }
        }
        out
    }
}

/// Keep at most `max` chars, noting how much was cut
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...\n[truncated, {} chars total]", &text[..cut], text.chars().count()),
        None => text.to_string(),
    }
}

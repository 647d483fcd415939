//! Stable exit codes for `fl` commands

use crate::r#loop::LoopOutcome;

/// Run completed, or a command succeeded
pub const OK: i32 = 0;
/// Fatal error (protocol, context, agent, configuration)
pub const ERROR: i32 = 1;
/// Iteration budget exhausted
pub const ITERATIONS_EXHAUSTED: i32 = 2;
/// A feature's plan was rejected too many times
pub const VALIDATION_EXHAUSTED: i32 = 3;
/// Unfinished features remain but none is eligible
pub const NO_ELIGIBLE_FEATURES: i32 = 4;
/// Interrupted (128 + SIGINT)
pub const CANCELLED: i32 = 130;

pub fn for_outcome(outcome: &LoopOutcome) -> i32 {
    match outcome {
        LoopOutcome::Completed => OK,
        LoopOutcome::IterationsExhausted { .. } => ITERATIONS_EXHAUSTED,
        LoopOutcome::ValidationExhausted { .. } => VALIDATION_EXHAUSTED,
        LoopOutcome::NoEligibleFeatures { .. } => NO_ELIGIBLE_FEATURES,
        LoopOutcome::Cancelled => CANCELLED,
    }
}

//! How a run ends

use thiserror::Error;

use crate::agent::AgentError;
use crate::progress::ContextError;
use crate::prompts::PromptError;
use crate::protocol::ProtocolError;

/// Non-error termination of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// Every feature passes, or the agent signalled overall completion
    Completed,
    /// Iteration budget used up
    IterationsExhausted { iterations: u32 },
    /// Too many rejected plans for one feature
    ValidationExhausted { feature: String, attempts: u32 },
    /// Unfinished features remain but none is eligible (dependencies)
    NoEligibleFeatures { pending: Vec<String> },
    /// Cancellation was requested
    Cancelled,
}

impl std::fmt::Display for LoopOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "all features complete"),
            Self::IterationsExhausted { iterations } => write!(f, "iteration budget of {} exhausted", iterations),
            Self::ValidationExhausted { feature, attempts } => write!(
                f,
                "feature '{}' still rejected after {} re-plan(s)",
                feature, attempts
            ),
            Self::NoEligibleFeatures { pending } => write!(
                f,
                "no eligible features; blocked: {}",
                pending.join(", ")
            ),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Fatal errors that abort a run
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Render(#[from] PromptError),

    #[error("Feature list error: {0:#}")]
    Features(eyre::Report),

    #[error("Failed to persist resume state: {0:#}")]
    State(eyre::Report),
}

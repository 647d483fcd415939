//! Tool error types

use thiserror::Error;

use crate::protocol::Action;

/// Errors that can occur while executing a sub-action
///
/// These never abort the loop; they are rendered into an `ActionResult` and
/// reported back to the agent.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{param} is required")]
    MissingParam { param: &'static str },

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to execute command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Exit code: {code}\n{output}")]
    CommandFailed { code: i32, output: String },

    #[error("Cancelled before start")]
    CancelledBeforeStart,

    #[error("Cancelled while running")]
    Cancelled,

    #[error("Unsupported action type in executor: {action}")]
    Unsupported { action: Action },

    #[error("{action} is not permitted with the read-only tool profile")]
    NotPermitted { action: Action },

    #[error("Action task failed: {0}")]
    Join(String),
}

impl ToolError {
    /// Whether the sub-action began executing before this error
    pub fn attempted(&self) -> bool {
        !matches!(
            self,
            Self::CancelledBeforeStart | Self::NotPermitted { .. } | Self::Unsupported { .. }
        )
    }
}

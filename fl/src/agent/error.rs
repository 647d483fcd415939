//! Agent error types

use thiserror::Error;

/// Errors talking to the external agent process
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Failed to start agent '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Agent exited with code {code:?}: {stderr}")]
    Exited { code: Option<i32>, stderr: String },

    #[error("Agent returned an empty response")]
    EmptyResponse,
}

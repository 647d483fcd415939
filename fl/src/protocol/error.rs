//! Protocol error types

use thiserror::Error;

/// Errors raised while decoding an agent response
///
/// These are distinct from execution failures: a protocol error means the
/// agent's reply could not be understood at all, so nothing was executed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("No structured payload found in agent response")]
    NoPayload,

    #[error("Malformed agent payload: {reason}")]
    Malformed { reason: String },

    #[error("Unknown action: '{action}'")]
    UnknownAction { action: String },

    #[error("Parallel batch contains a nested parallel action")]
    NestedParallel,

    #[error("Parallel action requires a non-empty 'actions' list")]
    MissingActions,
}

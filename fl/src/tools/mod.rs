//! Sub-action execution for agent-requested work
//!
//! The agent asks for file reads, file writes and shell commands, alone or
//! as a `parallel` batch. Everything goes through [`ParallelExecutor`], which
//! applies per-category concurrency limits and never lets a failure escape
//! as an error: failures are data in the returned [`ParallelResult`].

mod context;
mod error;
mod executor;
mod traits;

pub mod builtin;

pub use builtin::WorkTreeRunner;
pub use context::{ToolContext, ToolProfile};
pub use error::ToolError;
pub use executor::ParallelExecutor;
pub use traits::{ActionResult, ActionRunner, ParallelResult, truncate_chars};

//! Built-in sub-action implementations

mod read_files;
mod run_command;
mod write_file;

use async_trait::async_trait;
use tracing::debug;

pub use read_files::read_files;
pub use run_command::run_command;
pub use write_file::write_file;

use crate::protocol::{Action, SubAction};
use crate::tools::{ActionRunner, ToolContext, ToolError};

/// Production runner: real filesystem and shell
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkTreeRunner;

#[async_trait]
impl ActionRunner for WorkTreeRunner {
    async fn run(&self, action: &SubAction, ctx: &ToolContext) -> Result<String, ToolError> {
        debug!(kind = %action.kind, "WorkTreeRunner::run: called");
        match action.kind {
            Action::ReadFiles => read_files(&action.params, ctx).await,
            Action::WriteFile => write_file(&action.params, ctx).await,
            Action::RunCommand => run_command(&action.params, ctx).await,
            other => Err(ToolError::Unsupported { action: other }),
        }
    }
}

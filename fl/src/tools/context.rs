//! ToolContext - execution context for sub-actions

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Tool profiles define which sub-actions may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolProfile {
    /// Reads, writes and commands
    #[default]
    Full,
    /// Reads only; writes and commands are refused without running
    ReadOnly,
}

/// Execution context for one batch
///
/// Relative paths resolve against `work_dir`; absolute paths are honored as
/// given and are the caller's responsibility.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Working tree all relative paths and commands are rooted in
    pub work_dir: PathBuf,

    /// Governing cancellation signal for the batch
    pub cancel: CancellationToken,

    /// Which sub-actions are allowed
    pub profile: ToolProfile,
}

impl ToolContext {
    /// Create a full-access context
    pub fn new(work_dir: PathBuf, cancel: CancellationToken) -> Self {
        debug!(?work_dir, "ToolContext::new: called");
        Self {
            work_dir,
            cancel,
            profile: ToolProfile::Full,
        }
    }

    /// Same context with a different profile
    pub fn with_profile(mut self, profile: ToolProfile) -> Self {
        debug!(?profile, "ToolContext::with_profile: called");
        self.profile = profile;
        self
    }

    /// Resolve a sub-action path against the working tree
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.work_dir.join(path)
        }
    }
}

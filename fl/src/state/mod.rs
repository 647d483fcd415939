//! Resumable session state
//!
//! A single JSON record under the working directory's state subdirectory,
//! rewritten atomically at every iteration boundary so an interrupted run can
//! continue at the exact phase and iteration it stopped at.

mod resume;

pub use resume::{RESUME_FILE, ResumeState, ResumeStore};

use std::fs;
use std::path::Path;

use eyre::{Context, Result};

/// Write `contents` to `path` through a sibling `.tmp` file and a rename
///
/// Readers see either the old file or the new one, never a partial write.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| eyre::eyre!("Path has no parent directory: {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| eyre::eyre!("Path has no file name: {}", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, contents).with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

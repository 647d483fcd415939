//! Append-only progress log

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use eyre::{Context, Result};
use tracing::debug;

/// Append one line to the progress log, creating it if needed
///
/// Newlines inside `entry` are flattened so every record stays on one line.
pub fn append_progress(path: &Path, entry: &str) -> Result<()> {
    debug!(path = %path.display(), "append_progress: called");
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let line = entry.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open progress log {}", path.display()))?;
    writeln!(file, "{}", line).with_context(|| format!("Failed to append to {}", path.display()))?;
    Ok(())
}

/// Standard entry for one iteration outcome
pub fn progress_entry(iteration: u32, feature: Option<&str>, phase: Option<&str>, summary: &str) -> String {
    format!(
        "- [iteration {}] {} {}: {}",
        iteration,
        feature.unwrap_or("-"),
        phase.unwrap_or("single"),
        summary
    )
}

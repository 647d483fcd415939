//! read_files - read one or more files from the working tree

use tracing::debug;

use crate::protocol::ActionParams;
use crate::tools::{ToolContext, ToolError};

/// Read every requested file, all or nothing
///
/// One unreadable path fails the whole sub-action; files are never silently
/// skipped.
pub async fn read_files(params: &ActionParams, ctx: &ToolContext) -> Result<String, ToolError> {
    debug!(paths = ?params.paths, "read_files: called");
    if params.paths.is_empty() {
        debug!("read_files: no paths given");
        return Err(ToolError::MissingParam { param: "paths" });
    }

    let mut out = String::new();
    for path in &params.paths {
        let full_path = ctx.resolve(path);
        let content = tokio::fs::read_to_string(&full_path)
            .await
            .map_err(|source| ToolError::ReadFailed {
                path: path.clone(),
                source,
            })?;
        debug!(%path, len = content.len(), "read_files: read file");
        out.push_str(&format!("=== {} ===\n{}\n", path, content));
    }
    Ok(out)
}

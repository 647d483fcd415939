//! write_file - write content to a file in the working tree

use tracing::debug;

use crate::protocol::ActionParams;
use crate::tools::{ToolContext, ToolError};

/// Write content to a file, creating parent directories if needed
pub async fn write_file(params: &ActionParams, ctx: &ToolContext) -> Result<String, ToolError> {
    debug!(path = ?params.path, "write_file: called");
    let path = match params.path.as_deref() {
        Some(p) if !p.is_empty() => p,
        _ => {
            debug!("write_file: missing path parameter");
            return Err(ToolError::MissingParam { param: "path" });
        }
    };
    let content = params
        .content
        .as_deref()
        .ok_or(ToolError::MissingParam { param: "content" })?;

    let full_path = ctx.resolve(path);
    if let Some(parent) = full_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| ToolError::WriteFailed {
                path: path.to_string(),
                source,
            })?;
    }

    tokio::fs::write(&full_path, content)
        .await
        .map_err(|source| ToolError::WriteFailed {
            path: path.to_string(),
            source,
        })?;

    debug!(bytes = content.len(), "write_file: file written");
    Ok(format!("Wrote {} bytes to {}", content.len(), path))
}

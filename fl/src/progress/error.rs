//! Context building errors

use std::path::PathBuf;

use thiserror::Error;

/// Failures that stop a context from being built
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Specification file not found: {}", path.display())]
    SpecMissing { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

//! Iteration context building
//!
//! Every agent call gets a context built fresh from disk plus an explicit
//! [`CarryOver`]; the builder holds no state between calls.

mod builder;
mod context;
mod error;
mod log;

pub use builder::{ContextBuilder, ContextRequest, tail_lines};
pub use context::{CarryOver, FeatureFocus, IterationContext, NO_PROGRESS_MARKER, SpecSection, TaggedFile};
pub use error::ContextError;
pub use log::{append_progress, progress_entry};

//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

pub const PLANNING: &str = include_str!("../../prompts/planning.pmt");

pub const VALIDATING: &str = include_str!("../../prompts/validating.pmt");

pub const EXECUTING: &str = include_str!("../../prompts/executing.pmt");

/// Legacy single-shot iteration
pub const SINGLE: &str = include_str!("../../prompts/single.pmt");

/// Shared partial: spec, progress, files, carried results
pub const COMMON: &str = include_str!("../../prompts/common.pmt");

/// Response format description, inserted verbatim
pub const PROTOCOL: &str = include_str!("../../prompts/protocol.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "planning" => Some(PLANNING),
        "validating" => Some(VALIDATING),
        "executing" => Some(EXECUTING),
        "single" => Some(SINGLE),
        "common" => Some(COMMON),
        "protocol" => Some(PROTOCOL),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}

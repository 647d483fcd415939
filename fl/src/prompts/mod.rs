//! Prompt Template System
//!
//! Renders `.pmt` (prompt template) files for each phase with Handlebars.
//!
//! Template loading chain:
//! 1. `.featureloop/prompts/{name}.pmt` (user override)
//! 2. Embedded fallback in code

pub mod embedded;
mod loader;

pub use loader::{PromptError, PromptLoader, template_for};

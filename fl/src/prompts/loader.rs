//! Prompt Loader
//!
//! Loads prompt templates from the state directory or falls back to the
//! embedded defaults, then renders an IterationContext through them.

use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::embedded;
use crate::domain::Phase;
use crate::progress::IterationContext;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt template not found: {0}")]
    NotFound(String),

    #[error("Failed to read prompt {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid prompt template {name}: {source}")]
    Template {
        name: String,
        #[source]
        source: Box<handlebars::TemplateError>,
    },

    #[error("Failed to render prompt {name}: {source}")]
    Render {
        name: String,
        #[source]
        source: Box<handlebars::RenderError>,
    },
}

/// Template name for a phase (`None` is single-shot mode)
pub fn template_for(phase: Option<Phase>) -> &'static str {
    match phase {
        Some(Phase::Planning) => "planning",
        Some(Phase::Validating) => "validating",
        Some(Phase::Executing) => "executing",
        None => "single",
    }
}

#[derive(Serialize)]
struct PromptData<'a> {
    #[serde(flatten)]
    context: &'a IterationContext,
    protocol: &'a str,
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    /// User override directory (e.g. `.featureloop/prompts/`)
    user_dir: Option<PathBuf>,
    protocol: String,
}

impl PromptLoader {
    /// Loader that prefers `<state_dir>/prompts/{name}.pmt` over the embedded copies
    pub fn new(state_dir: impl AsRef<Path>) -> Result<Self, PromptError> {
        let user_dir = state_dir.as_ref().join("prompts");
        let user_dir_exists = user_dir.exists();
        debug!(?user_dir, %user_dir_exists, "PromptLoader::new: called");
        Self::build(user_dir_exists.then_some(user_dir))
    }

    /// Loader that only uses embedded prompts
    pub fn embedded_only() -> Result<Self, PromptError> {
        debug!("PromptLoader::embedded_only: called");
        Self::build(None)
    }

    fn build(user_dir: Option<PathBuf>) -> Result<Self, PromptError> {
        let mut loader = Self {
            hbs: Handlebars::new(),
            user_dir,
            protocol: String::new(),
        };
        // Prompts are plain text, not HTML
        loader.hbs.register_escape_fn(handlebars::no_escape);

        let common = loader.load_template("common")?;
        loader
            .hbs
            .register_partial("common", common)
            .map_err(|e| PromptError::Template {
                name: "common".to_string(),
                source: Box::new(e),
            })?;
        loader.protocol = loader.load_template("protocol")?;
        Ok(loader)
    }

    /// Load a template by name
    ///
    /// Checks the user override directory first, then the embedded fallback.
    fn load_template(&self, name: &str) -> Result<String, PromptError> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref user_dir) = self.user_dir {
            let path = user_dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in user override");
                return std::fs::read_to_string(&path).map_err(|source| PromptError::Read { path, source });
            }
        }

        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| PromptError::NotFound(name.to_string()))
    }

    /// Render the prompt for one iteration
    pub fn render(&self, context: &IterationContext) -> Result<String, PromptError> {
        let name = template_for(context.phase);
        debug!(%name, iteration = context.iteration, "PromptLoader::render: called");
        let template = self.load_template(name)?;
        let data = PromptData {
            context,
            protocol: &self.protocol,
        };

        let prompt = self
            .hbs
            .render_template(&template, &data)
            .map_err(|e| PromptError::Render {
                name: name.to_string(),
                source: Box::new(e),
            })?;
        info!(template = %name, bytes = prompt.len(), "Rendered prompt");
        Ok(prompt)
    }
}

//! Builds an IterationContext from on-disk sources

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::context::{CarryOver, FeatureFocus, IterationContext, NO_PROGRESS_MARKER, SpecSection, TaggedFile};
use super::error::ContextError;
use crate::config::{Config, ContextConfig};
use crate::domain::{Feature, Phase};

/// Per-call inputs; everything else is read from disk
#[derive(Debug, Clone, Default)]
pub struct ContextRequest<'a> {
    pub iteration: u32,
    pub phase: Option<Phase>,
    pub feature: Option<&'a Feature>,
    /// Files to include for this call only
    pub tagged: &'a [PathBuf],
    pub carry: CarryOver,
}

/// Stateless context builder
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    work_dir: PathBuf,
    spec_path: PathBuf,
    progress_path: PathBuf,
    config: ContextConfig,
    max_iterations: u32,
    max_validation_attempts: u32,
}

impl ContextBuilder {
    pub fn new(work_dir: PathBuf, spec_path: PathBuf, progress_path: PathBuf, config: ContextConfig) -> Self {
        debug!(?work_dir, ?spec_path, ?progress_path, "ContextBuilder::new: called");
        Self {
            work_dir,
            spec_path,
            progress_path,
            config,
            max_iterations: 0,
            max_validation_attempts: 0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.paths.work_dir.clone(),
            config.spec_path(),
            config.progress_path(),
            config.context.clone(),
        )
        .with_budgets(config.looping.max_iterations, config.looping.max_validation_attempts)
    }

    /// Budgets shown to the agent
    pub fn with_budgets(mut self, max_iterations: u32, max_validation_attempts: u32) -> Self {
        self.max_iterations = max_iterations;
        self.max_validation_attempts = max_validation_attempts;
        self
    }

    /// Build a fresh context
    ///
    /// A missing spec file is an error; a missing progress log is not.
    pub fn build(&self, request: ContextRequest<'_>) -> Result<IterationContext, ContextError> {
        debug!(iteration = request.iteration, phase = ?request.phase, "ContextBuilder::build: called");

        let spec = self.spec_section()?;
        let (progress, progress_truncated_lines) = self.progress_tail()?;
        let listing = if self.config.include_listing {
            Some(self.listing())
        } else {
            None
        };
        let tagged_files = request.tagged.iter().map(|p| self.tagged_file(p)).collect();

        let context = IterationContext {
            iteration: request.iteration,
            max_iterations: self.max_iterations,
            phase: request.phase,
            feature: request.feature.map(|f| FeatureFocus {
                id: f.id.clone(),
                description: f.description.clone(),
                priority: f.priority.to_string(),
            }),
            spec_path: self.spec_path.clone(),
            spec,
            progress,
            progress_truncated_lines,
            listing,
            tagged_files,
            max_validation_attempts: self.max_validation_attempts,
            carry: request.carry,
        };
        info!(
            iteration = context.iteration,
            phase = ?context.phase,
            bytes = context.approx_bytes(),
            "Built iteration context"
        );
        Ok(context)
    }

    fn spec_section(&self) -> Result<SpecSection, ContextError> {
        debug!(path = %self.spec_path.display(), "ContextBuilder::spec_section: called");
        let content = match fs::read_to_string(&self.spec_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ContextError::SpecMissing {
                    path: self.spec_path.clone(),
                });
            }
            Err(source) => {
                return Err(ContextError::Io {
                    path: self.spec_path.clone(),
                    source,
                });
            }
        };

        if content.len() > self.config.spec_inline_max_bytes {
            debug!(
                bytes = content.len(),
                max = self.config.spec_inline_max_bytes,
                "ContextBuilder::spec_section: too large to inline"
            );
            return Ok(SpecSection::OnDemand {
                instruction: format!(
                    "The specification at {} is {} bytes, too large to include here. \
                     Use read_files on it to fetch the parts you need.",
                    self.spec_path.display(),
                    content.len()
                ),
            });
        }
        Ok(SpecSection::Inline { content })
    }

    fn progress_tail(&self) -> Result<(String, usize), ContextError> {
        debug!(path = %self.progress_path.display(), "ContextBuilder::progress_tail: called");
        match fs::read_to_string(&self.progress_path) {
            Ok(content) => Ok(tail_lines(&content, self.config.progress_tail_lines)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("ContextBuilder::progress_tail: no progress log yet");
                Ok((NO_PROGRESS_MARKER.to_string(), 0))
            }
            Err(source) => Err(ContextError::Io {
                path: self.progress_path.clone(),
                source,
            }),
        }
    }

    /// Sorted, hidden-entry-free listing of the working tree
    fn listing(&self) -> String {
        debug!(work_dir = %self.work_dir.display(), "ContextBuilder::listing: called");
        let root = self.work_dir.clone();
        let walker = WalkDir::new(&self.work_dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| {
                if e.path() == root {
                    return true;
                }
                e.file_name()
                    .to_str()
                    .map(|s| !s.starts_with('.') && s != "target")
                    .unwrap_or(true)
            });

        let mut entries = Vec::new();
        let mut skipped = 0usize;
        for entry in walker.filter_map(|e| e.ok()) {
            if entries.len() >= self.config.listing_max_entries {
                skipped += 1;
                continue;
            }
            let rel = entry.path().strip_prefix(&self.work_dir).unwrap_or(entry.path());
            let suffix = if entry.file_type().is_dir() { "/" } else { "" };
            entries.push(format!("{}{}", rel.display(), suffix));
        }
        if skipped > 0 {
            entries.push(format!("[... {} more entries not shown ...]", skipped));
        }
        entries.join("\n")
    }

    fn tagged_file(&self, path: &Path) -> TaggedFile {
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.work_dir.join(path)
        };
        debug!(path = %full.display(), "ContextBuilder::tagged_file: called");
        let content = match fs::read_to_string(&full) {
            Ok(content) => truncate_bytes(&content, self.config.max_file_bytes),
            Err(e) => {
                warn!(path = %full.display(), error = %e, "Tagged file unreadable");
                format!("[unreadable: {}]", e)
            }
        };
        TaggedFile {
            path: path.display().to_string(),
            content,
        }
    }
}

/// Keep the last `max_lines` lines, prefixing a marker when lines were dropped
///
/// Returns the text and the number of dropped lines.
pub fn tail_lines(content: &str, max_lines: usize) -> (String, usize) {
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() <= max_lines {
        return (lines.join("\n"), 0);
    }
    let dropped = lines.len() - max_lines;
    let mut out = format!("[... {} earlier lines truncated ...]", dropped);
    for line in &lines[dropped..] {
        out.push('\n');
        out.push_str(line);
    }
    (out, dropped)
}

fn truncate_bytes(content: &str, max: usize) -> String {
    if content.len() <= max {
        return content.to_string();
    }
    let mut cut = max;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}\n[... truncated, {} of {} bytes shown ...]",
        &content[..cut],
        cut,
        content.len()
    )
}

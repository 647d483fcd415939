//! Feature list loading and deterministic selection

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::Priority;

/// A unit of requested functionality
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub passes: bool,
}

impl Feature {
    pub fn new(id: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            priority,
            depends_on: Vec::new(),
            passes: false,
        }
    }

    pub fn depends_on(mut self, ids: &[&str]) -> Self {
        self.depends_on = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn passing(mut self) -> Self {
        self.passes = true;
        self
    }
}

/// On-disk shapes accepted for the feature file
#[derive(Deserialize)]
#[serde(untagged)]
enum FeatureFile {
    Wrapped { features: Vec<Feature> },
    Bare(Vec<Feature>),
}

/// Ordered feature list, declaration order preserved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureList {
    pub features: Vec<Feature>,
}

impl FeatureList {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    /// Parse feature JSON (`{"features": [...]}` or a bare array)
    pub fn parse(raw: &str) -> Result<Self> {
        let file: FeatureFile = serde_json::from_str(raw).context("Failed to parse feature list")?;
        let features = match file {
            FeatureFile::Wrapped { features } => features,
            FeatureFile::Bare(features) => features,
        };
        debug!(count = features.len(), "FeatureList::parse: parsed");
        Ok(Self { features })
    }

    /// Load the feature list fresh from disk
    pub fn load(path: &Path) -> Result<Self> {
        debug!(?path, "FeatureList::load: called");
        let raw = fs::read_to_string(path).with_context(|| format!("Failed to read feature list {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid feature list {}", path.display()))
    }

    /// Mark a feature passing and rewrite the file atomically
    ///
    /// Re-reads the file first so edits the agent made in the same iteration
    /// are kept. Only the feature's `passes` key changes: the top-level shape,
    /// key order and any fields this tool does not model are written back as
    /// they were.
    pub fn mark_passing_on_disk(path: &Path, id: &str) -> Result<()> {
        debug!(?path, %id, "FeatureList::mark_passing_on_disk: called");
        let raw = fs::read_to_string(path).with_context(|| format!("Failed to read feature list {}", path.display()))?;
        let list = Self::parse(&raw).with_context(|| format!("Invalid feature list {}", path.display()))?;
        match list.get(id) {
            None => return Err(eyre!("Feature '{}' not found in {}", id, path.display())),
            Some(f) if f.passes => {
                debug!(%id, "FeatureList::mark_passing_on_disk: already passing");
                return Ok(());
            }
            Some(_) => {}
        }

        let mut tree: Value = serde_json::from_str(&raw).context("Failed to parse feature list")?;
        let entries = match &mut tree {
            Value::Array(entries) => entries,
            Value::Object(root) => root
                .get_mut("features")
                .and_then(Value::as_array_mut)
                .ok_or_else(|| eyre!("Feature list {} has no 'features' array", path.display()))?,
            _ => return Err(eyre!("Feature list {} is neither an array nor an object", path.display())),
        };
        let entry = entries
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .find(|obj| obj.get("id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| eyre!("Feature '{}' not found in {}", id, path.display()))?;
        entry.insert("passes".to_string(), Value::Bool(true));

        let mut payload = serde_json::to_string_pretty(&tree).context("Failed to serialize feature list")?;
        payload.push('\n');
        crate::state::write_atomic(path, &payload)
    }

    pub fn get(&self, id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }

    pub fn all_passing(&self) -> bool {
        self.features.iter().all(|f| f.passes)
    }

    /// Ids of features not yet passing, in declaration order
    pub fn pending_ids(&self) -> Vec<String> {
        self.features.iter().filter(|f| !f.passes).map(|f| f.id.clone()).collect()
    }

    /// Pick the next feature to work on
    ///
    /// Pure function of the list: skips passing features and features with
    /// an unsatisfied dependency (unknown ids count as unsatisfied), then takes
    /// the highest priority, ties broken by declaration order. A pinned id
    /// bypasses priority but is still `None` once passing.
    pub fn select_next(&self, pinned: Option<&str>) -> Option<&Feature> {
        debug!(?pinned, count = self.features.len(), "FeatureList::select_next: called");
        if let Some(id) = pinned {
            return self.get(id).filter(|f| !f.passes);
        }

        let passing: HashSet<&str> = self.features.iter().filter(|f| f.passes).map(|f| f.id.as_str()).collect();

        let mut best: Option<&Feature> = None;
        for feature in &self.features {
            if feature.passes {
                continue;
            }
            if !feature.depends_on.iter().all(|dep| passing.contains(dep.as_str())) {
                debug!(id = %feature.id, "FeatureList::select_next: dependencies unsatisfied");
                continue;
            }
            // Strictly greater keeps the earliest declaration on ties
            if best.is_none_or(|b| feature.priority > b.priority) {
                best = Some(feature);
            }
        }
        debug!(selected = ?best.map(|f| &f.id), "FeatureList::select_next: done");
        best
    }
}

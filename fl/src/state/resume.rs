//! Resume record persistence

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::Phase;

/// File name of the resume record inside the state directory
pub const RESUME_FILE: &str = "resume.json";

/// Everything needed to continue a run where it stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeState {
    /// Identifies one logical run across restarts
    pub session_id: Uuid,

    /// When this record was written
    pub timestamp: DateTime<Utc>,

    /// Feature being worked on, if one was selected
    pub current_feature: Option<String>,

    /// `None` in single-shot mode
    pub phase: Option<Phase>,

    /// Next iteration to run (1-indexed)
    pub iteration: u32,

    /// Iteration budget in effect when written
    pub total_iterations: u32,

    pub work_dir: PathBuf,

    pub spec_path: PathBuf,

    /// Rejected plans so far for `current_feature`
    #[serde(default)]
    pub validation_attempts: u32,

    /// Plan awaiting validation or being executed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,

    /// Last rejected plan, carried into re-planning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_plan: Option<String>,

    /// Validator's reason for rejecting `previous_plan`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_feedback: Option<String>,
}

impl ResumeState {
    /// Cold-start record: iteration 1, Planning (or no phase when single-shot)
    pub fn fresh(work_dir: PathBuf, spec_path: PathBuf, phased: bool, total_iterations: u32) -> Self {
        Self {
            session_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            current_feature: None,
            phase: phased.then_some(Phase::Planning),
            iteration: 1,
            total_iterations,
            work_dir,
            spec_path,
            validation_attempts: 0,
            plan: None,
            previous_plan: None,
            validation_feedback: None,
        }
    }

    /// Whether this record was written for `work_dir`
    ///
    /// Compares canonicalised paths so `.` and an absolute path to the same
    /// directory match.
    pub fn matches_work_dir(&self, work_dir: &Path) -> bool {
        match (fs::canonicalize(&self.work_dir), fs::canonicalize(work_dir)) {
            (Ok(stored), Ok(current)) => stored == current,
            _ => self.work_dir == work_dir,
        }
    }
}

/// Loads, saves and clears the resume record
#[derive(Debug, Clone)]
pub struct ResumeStore {
    path: PathBuf,
}

impl ResumeStore {
    /// Store rooted at a state directory
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join(RESUME_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the record as-is, without degrading corruption to `None`
    pub fn read(&self) -> Result<Option<ResumeState>> {
        debug!(path = %self.path.display(), "ResumeStore::read: called");
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path).with_context(|| format!("Failed to read {}", self.path.display()))?;
        let state = serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(Some(state))
    }

    /// Record usable for `work_dir`, or `None` for a cold start
    ///
    /// A missing, unreadable, corrupt or foreign record never fails the run.
    pub fn load_for(&self, work_dir: &Path) -> Option<ResumeState> {
        debug!(path = %self.path.display(), ?work_dir, "ResumeStore::load_for: called");
        let state = match self.read() {
            Ok(Some(state)) => state,
            Ok(None) => {
                debug!("ResumeStore::load_for: no resume state");
                return None;
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Ignoring unusable resume state, starting fresh");
                return None;
            }
        };

        if !state.matches_work_dir(work_dir) {
            warn!(
                stored = %state.work_dir.display(),
                current = %work_dir.display(),
                "Resume state belongs to another working directory, starting fresh"
            );
            return None;
        }

        info!(
            session_id = %state.session_id,
            iteration = state.iteration,
            phase = ?state.phase,
            feature = ?state.current_feature,
            "Resuming session"
        );
        Some(state)
    }

    /// Overwrite the record atomically, stamping the current time
    pub fn save(&self, state: &mut ResumeState) -> Result<()> {
        state.timestamp = Utc::now();
        debug!(
            path = %self.path.display(),
            iteration = state.iteration,
            phase = ?state.phase,
            "ResumeStore::save: called"
        );
        let mut payload = serde_json::to_string_pretty(state).context("Failed to serialize resume state")?;
        payload.push('\n');
        super::write_atomic(&self.path, &payload)
    }

    /// Delete the record; `Ok(false)` when there was none
    pub fn clear(&self) -> Result<bool> {
        debug!(path = %self.path.display(), "ResumeStore::clear: called");
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", self.path.display())),
        }
    }
}

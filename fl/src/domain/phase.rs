//! Iteration phases

use serde::{Deserialize, Serialize};

/// Which instructions accompany an iteration's prompt
///
/// Legacy single-shot mode has no phase at all and is modelled as
/// `Option<Phase>::None` wherever a phase is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Planning,
    Validating,
    Executing,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Validating => "validating",
            Self::Executing => "executing",
        }
    }

    /// Only Executing may change the working tree
    pub fn allows_mutation(&self) -> bool {
        matches!(self, Self::Executing)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

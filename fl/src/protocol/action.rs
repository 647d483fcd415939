//! Action vocabulary exchanged with the agent

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::ProtocolError;

/// Kind of request the agent can issue
///
/// Closed set: anything else on the wire is a protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    AskUser,
    ReadFiles,
    WriteFile,
    RunCommand,
    Parallel,
    Done,
}

impl Action {
    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AskUser => "ask_user",
            Self::ReadFiles => "read_files",
            Self::WriteFile => "write_file",
            Self::RunCommand => "run_command",
            Self::Parallel => "parallel",
            Self::Done => "done",
        }
    }

    /// Whether executing this action can change the working tree
    pub fn mutates_worktree(&self) -> bool {
        matches!(self, Self::WriteFile | Self::RunCommand)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ask_user" => Ok(Self::AskUser),
            "read_files" => Ok(Self::ReadFiles),
            "write_file" => Ok(Self::WriteFile),
            "run_command" => Ok(Self::RunCommand),
            "parallel" => Ok(Self::Parallel),
            "done" => Ok(Self::Done),
            other => Err(ProtocolError::UnknownAction {
                action: other.to_string(),
            }),
        }
    }
}

/// Parameter bag for an action
///
/// Only the fields relevant to the chosen action are read; the rest are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionParams {
    /// ask_user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,

    /// read_files
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,

    /// write_file target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// write_file body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// run_command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// parallel batch members
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<SubAction>,
}

/// One unit of work inside a parallel batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAction {
    #[serde(rename = "type")]
    pub kind: Action,

    #[serde(default)]
    pub params: ActionParams,
}

impl SubAction {
    pub fn new(kind: Action, params: ActionParams) -> Self {
        Self { kind, params }
    }

    pub fn read(paths: &[&str]) -> Self {
        Self::new(
            Action::ReadFiles,
            ActionParams {
                paths: paths.iter().map(|p| p.to_string()).collect(),
                ..Default::default()
            },
        )
    }

    pub fn write(path: &str, content: &str) -> Self {
        Self::new(
            Action::WriteFile,
            ActionParams {
                path: Some(path.to_string()),
                content: Some(content.to_string()),
                ..Default::default()
            },
        )
    }

    pub fn command(command: &str) -> Self {
        Self::new(
            Action::RunCommand,
            ActionParams {
                command: Some(command.to_string()),
                ..Default::default()
            },
        )
    }

    /// Short human-readable label used in result reports
    pub fn describe(&self) -> String {
        match self.kind {
            Action::ReadFiles => format!("read_files {}", self.params.paths.join(", ")),
            Action::WriteFile => format!("write_file {}", self.params.path.as_deref().unwrap_or("<none>")),
            Action::RunCommand => format!("run_command `{}`", self.params.command.as_deref().unwrap_or("")),
            Action::AskUser => "ask_user".to_string(),
            Action::Parallel => "parallel".to_string(),
            Action::Done => "done".to_string(),
        }
    }
}

/// Structured reply from the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,

    pub action: Action,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_params: Option<ActionParams>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Action-specific payload owned by the agent; carried, never interpreted
    /// beyond the few keys the phase policy reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

impl AgentResponse {
    /// Params, or an empty bag when the agent sent none
    pub fn params(&self) -> ActionParams {
        self.action_params.clone().unwrap_or_default()
    }

    /// Sub-actions this response asks to execute
    ///
    /// A single file/command action becomes a batch of one so both paths share
    /// the executor. `ask_user` and `done` yield an empty batch.
    pub fn sub_actions(&self) -> Vec<SubAction> {
        debug!(action = %self.action, "AgentResponse::sub_actions: called");
        match self.action {
            Action::Parallel => self.params().actions,
            Action::ReadFiles | Action::WriteFile | Action::RunCommand => {
                vec![SubAction::new(self.action, self.params())]
            }
            Action::AskUser | Action::Done => vec![],
        }
    }

    /// Look up a key in the opaque state payload
    pub fn state_value(&self, key: &str) -> Option<&Value> {
        self.state.as_ref().and_then(|s| s.get(key))
    }

    /// Agent asked to end the whole run
    pub fn signals_completion(&self) -> bool {
        self.action == Action::Done && self.state_value("complete").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Structural checks that serde cannot express
    pub fn validate(&self) -> Result<(), ProtocolError> {
        debug!(action = %self.action, "AgentResponse::validate: called");
        if self.action != Action::Parallel {
            return Ok(());
        }
        let actions = self.action_params.as_ref().map(|p| p.actions.as_slice()).unwrap_or(&[]);
        if actions.is_empty() {
            debug!("AgentResponse::validate: parallel without actions");
            return Err(ProtocolError::MissingActions);
        }
        if actions.iter().any(|a| a.kind == Action::Parallel) {
            debug!("AgentResponse::validate: nested parallel");
            return Err(ProtocolError::NestedParallel);
        }
        Ok(())
    }
}

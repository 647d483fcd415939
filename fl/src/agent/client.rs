//! AgentClient trait definition

use async_trait::async_trait;

use super::AgentError;

/// Stateless agent - each call is independent (fresh context)
///
/// One prompt in, one raw response out. Nothing is remembered between calls;
/// continuity comes only from what the next prompt carries.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String, AgentError>;
}

/// Answers `ask_user` questions
#[async_trait]
pub trait UserChannel: Send + Sync {
    async fn ask(&self, question: &str) -> Result<String, AgentError>;
}

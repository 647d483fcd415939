//! Scripted agent and user for tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::debug;

use super::{AgentClient, AgentError, UserChannel};

/// Returns canned responses in order and records every prompt
pub struct ScriptedAgent {
    responses: Vec<String>,
    call_count: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        let responses: Vec<String> = responses.into_iter().map(Into::into).collect();
        debug!(response_count = %responses.len(), "ScriptedAgent::new: called");
        Self {
            responses,
            call_count: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Prompts received so far, oldest first
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AgentClient for ScriptedAgent {
    async fn invoke(&self, prompt: &str) -> Result<String, AgentError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
        debug!(%idx, "ScriptedAgent::invoke: fetching response");
        self.responses.get(idx).cloned().ok_or(AgentError::EmptyResponse)
    }
}

/// Answers questions from a fixed list
#[derive(Default)]
pub struct ScriptedUser {
    answers: Mutex<VecDeque<String>>,
    questions: Mutex<Vec<String>>,
}

impl ScriptedUser {
    pub fn new<S: Into<String>>(answers: impl IntoIterator<Item = S>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl UserChannel for ScriptedUser {
    async fn ask(&self, question: &str) -> Result<String, AgentError> {
        if let Ok(mut questions) = self.questions.lock() {
            questions.push(question.to_string());
        }
        let answer = self.answers.lock().ok().and_then(|mut a| a.pop_front());
        Ok(answer.unwrap_or_default())
    }
}

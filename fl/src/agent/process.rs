//! Agent as an external process

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{AgentClient, AgentError, UserChannel};
use crate::config::AgentConfig;

/// Longest stderr excerpt kept in an error
const MAX_STDERR_CHARS: usize = 2000;

/// Runs the configured command once per prompt
///
/// The prompt goes to stdin, stdout is the response. The child is killed if
/// the call is dropped (cancellation).
#[derive(Debug, Clone)]
pub struct CommandAgent {
    command: String,
    args: Vec<String>,
    work_dir: PathBuf,
}

impl CommandAgent {
    pub fn new(config: &AgentConfig, work_dir: PathBuf) -> Self {
        debug!(command = %config.command, ?config.args, ?work_dir, "CommandAgent::new: called");
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            work_dir,
        }
    }
}

#[async_trait]
impl AgentClient for CommandAgent {
    async fn invoke(&self, prompt: &str) -> Result<String, AgentError> {
        debug!(command = %self.command, prompt_len = prompt.len(), "CommandAgent::invoke: called");
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AgentError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let write = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        // Feed stdin while draining stdout so a chatty child cannot block on a full pipe
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output?;
        if let Err(e) = written {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                warn!(command = %self.command, "Agent closed stdin before reading the full prompt");
            } else {
                return Err(AgentError::Io(e));
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::Exited {
                code: output.status.code(),
                stderr: crate::tools::truncate_chars(stderr.trim(), MAX_STDERR_CHARS),
            });
        }

        let response = String::from_utf8_lossy(&output.stdout).into_owned();
        if response.trim().is_empty() {
            return Err(AgentError::EmptyResponse);
        }
        info!(bytes = response.len(), "Agent responded");
        Ok(response)
    }
}

/// Reads answers from the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinUser;

#[async_trait]
impl UserChannel for StdinUser {
    async fn ask(&self, question: &str) -> Result<String, AgentError> {
        debug!(%question, "StdinUser::ask: called");
        let mut stdout = tokio::io::stdout();
        stdout.write_all(format!("\n{}\n> ", question).as_bytes()).await?;
        stdout.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        Ok(line.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn agent(command: &str, args: &[&str]) -> (tempfile::TempDir, CommandAgent) {
        let temp = tempdir().unwrap();
        let config = AgentConfig {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        };
        let agent = CommandAgent::new(&config, temp.path().to_path_buf());
        (temp, agent)
    }

    #[tokio::test]
    async fn test_prompt_round_trips_through_stdin() {
        let (_temp, agent) = agent("cat", &[]);
        let response = agent.invoke("{\"action\": \"done\"}").await.unwrap();
        assert_eq!(response, "{\"action\": \"done\"}");
    }

    #[tokio::test]
    async fn test_non_zero_exit_reports_stderr() {
        let (_temp, agent) = agent("sh", &["-c", "echo boom >&2; exit 3"]);
        match agent.invoke("x").await {
            Err(AgentError::Exited { code, stderr }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected exit error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_output_is_error() {
        let (_temp, agent) = agent("sh", &["-c", "cat >/dev/null"]);
        assert!(matches!(agent.invoke("x").await, Err(AgentError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let (_temp, agent) = agent("definitely-not-a-real-agent-binary", &[]);
        let err = agent.invoke("x").await.unwrap_err();
        assert!(matches!(err, AgentError::Spawn { .. }));
        assert!(err.to_string().contains("definitely-not-a-real-agent-binary"));
    }
}

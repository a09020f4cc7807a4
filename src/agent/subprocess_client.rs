//! Subprocess client - runs an agent CLI with the prompt as its last argument

use crate::agent::{AgentError, ProgressCallback, StreamEvent};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Client for executing an agent CLI as a subprocess
#[derive(Debug, Clone)]
pub struct CommandAgentClient {
    /// Program to spawn
    program: String,

    /// Arguments placed before the prompt
    args: Vec<String>,

    /// Timeout for command execution in seconds
    timeout_secs: u64,
}

impl CommandAgentClient {
    /// Create a new subprocess client
    ///
    /// # Arguments
    /// * `program` - Executable to spawn (e.g., "llm", "/usr/local/bin/agent")
    /// * `args` - Arguments passed before the prompt
    /// * `timeout_secs` - Timeout for command execution in seconds
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            args,
            timeout_secs,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Execute a prompt and capture the whole stdout
    ///
    /// # Errors
    /// Returns `AgentError` if:
    /// - The executable cannot be spawned
    /// - It exits with a non-zero status
    /// - The output is not valid UTF-8
    /// - The command times out
    pub async fn execute(&self, prompt: &str) -> Result<String, AgentError> {
        debug!(
            "Spawning {} subprocess with prompt length: {}",
            self.program,
            prompt.len()
        );

        let output = timeout(
            Duration::from_secs(self.timeout_secs),
            Command::new(&self.program)
                .args(&self.args)
                .arg(prompt)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| AgentError::Timeout(self.timeout_secs))?
        .map_err(|e| AgentError::Internal(format!("Failed to execute {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.exit_error(output.status.code(), stderr.trim()));
        }

        let content = String::from_utf8(output.stdout)
            .map_err(|e| AgentError::Internal(format!("Failed to decode agent output: {}", e)))?;

        debug!("{} returned {} bytes of output", self.program, content.len());

        Ok(content)
    }

    /// Execute a prompt, forwarding stdout to the callback line by line
    pub async fn execute_streaming(
        &self,
        prompt: &str,
        callback: Option<&dyn ProgressCallback>,
    ) -> Result<String, AgentError> {
        debug!(
            "Spawning streaming {} subprocess with prompt length: {}",
            self.program,
            prompt.len()
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::Internal(format!("Failed to execute {}: {}", self.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Internal("stdout was not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| AgentError::Internal("stderr was not captured".to_string()))?;

        let run = async {
            if let Some(cb) = callback {
                cb.on_event(&StreamEvent::Start);
            }

            let read_stdout = async {
                let mut lines = BufReader::new(stdout).lines();
                let mut content = String::new();
                while let Some(line) = lines.next_line().await? {
                    let chunk = format!("{}\n", line);
                    if let Some(cb) = callback {
                        cb.on_event(&StreamEvent::TextDelta {
                            delta: chunk.clone(),
                        });
                    }
                    content.push_str(&chunk);
                }
                Ok::<_, std::io::Error>(content)
            };

            let read_stderr = async {
                let mut buf = String::new();
                stderr.read_to_string(&mut buf).await?;
                Ok::<_, std::io::Error>(buf)
            };

            let (content, stderr_text) = tokio::try_join!(read_stdout, read_stderr)
                .map_err(|e| AgentError::Internal(format!("Failed to read agent output: {}", e)))?;

            let status = child
                .wait()
                .await
                .map_err(|e| AgentError::Internal(format!("Failed to wait for agent: {}", e)))?;

            if !status.success() {
                return Err(self.exit_error(status.code(), stderr_text.trim()));
            }

            if let Some(cb) = callback {
                cb.on_event(&StreamEvent::End {
                    content: content.clone(),
                });
            }

            Ok(content)
        };

        timeout(Duration::from_secs(self.timeout_secs), run)
            .await
            .map_err(|_| AgentError::Timeout(self.timeout_secs))?
    }

    fn exit_error(&self, code: Option<i32>, stderr: &str) -> AgentError {
        let exit_code = code.unwrap_or(-1);
        warn!("{} exited with code {}: {}", self.program, exit_code, stderr);
        AgentError::Api(format!(
            "{} exited with code {}: {}",
            self.program, exit_code, stderr
        ))
    }
}

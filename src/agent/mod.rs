//! Agent clients that execute stage prompts

pub mod client;
pub mod response;
pub mod streaming;
pub mod subprocess_client;

use async_trait::async_trait;
pub use client::{AgentClientConfig, DEFAULT_AGENT_COMMAND};
pub use response::{AgentError, AgentResponse};
pub use streaming::{emit_whole, ProgressCallback, StreamEvent};
pub use subprocess_client::CommandAgentClient;

/// Trait for agent execution - allows for different implementations
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Execute a prompt and return the complete response
    async fn execute(&self, prompt: &str) -> Result<AgentResponse, AgentError>;

    /// Execute a prompt, reporting output chunks to `callback` as they arrive.
    ///
    /// The default implementation runs [`execute`](Self::execute) and reports
    /// the whole content as a single chunk.
    async fn execute_streaming(
        &self,
        prompt: &str,
        callback: Option<&dyn ProgressCallback>,
    ) -> Result<AgentResponse, AgentError> {
        let response = self.execute(prompt).await?;
        emit_whole(callback, &response.content);
        Ok(response)
    }
}

/// Agent backed by an external CLI invoked once per prompt
#[derive(Debug, Clone)]
pub struct CliAgentClient {
    subprocess_client: CommandAgentClient,
}

impl CliAgentClient {
    /// Create a new CLI agent client
    ///
    /// The first element of `config.command` is the program; the rest are
    /// passed before the prompt.
    pub fn new(config: AgentClientConfig) -> Self {
        let (program, args) = config.program_and_args();
        Self {
            subprocess_client: CommandAgentClient::new(program, args, config.timeout_secs),
        }
    }

    pub fn subprocess(&self) -> &CommandAgentClient {
        &self.subprocess_client
    }
}

#[async_trait]
impl AgentExecutor for CliAgentClient {
    async fn execute(&self, prompt: &str) -> Result<AgentResponse, AgentError> {
        let content = self.subprocess_client.execute(prompt).await?;
        Ok(AgentResponse::new(content))
    }

    async fn execute_streaming(
        &self,
        prompt: &str,
        callback: Option<&dyn ProgressCallback>,
    ) -> Result<AgentResponse, AgentError> {
        let content = self
            .subprocess_client
            .execute_streaming(prompt, callback)
            .await?;
        Ok(AgentResponse::new(content))
    }
}

//! Agent client configuration

/// Default program used when neither the agent nor the client config names one
pub const DEFAULT_AGENT_COMMAND: &str = "llm";

/// Configuration shared by all command-backed agent clients
#[derive(Debug, Clone)]
pub struct AgentClientConfig {
    /// Program and leading arguments used to invoke the agent CLI.
    ///
    /// The prompt is appended as the final argument. When empty,
    /// [`DEFAULT_AGENT_COMMAND`] is used.
    pub command: Vec<String>,

    /// Timeout for a single agent invocation in seconds
    pub timeout_secs: u64,
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            command: vec![DEFAULT_AGENT_COMMAND.to_string()],
            timeout_secs: 600,
        }
    }
}

impl AgentClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Split the command into program and leading arguments
    pub fn program_and_args(&self) -> (String, Vec<String>) {
        match self.command.split_first() {
            Some((program, args)) => (program.clone(), args.to_vec()),
            None => (DEFAULT_AGENT_COMMAND.to_string(), Vec::new()),
        }
    }
}

//! Agent-backed stage executor

use crate::{
    agent::{AgentError, AgentExecutor, ProgressCallback},
    core::{render_template, StageExecutor, StepContent, StepInput},
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Executes a stage by prompting an agent
#[derive(Clone)]
pub struct AgentStage {
    agent_name: String,
    agent: Arc<dyn AgentExecutor>,
    instructions: Option<String>,
    task: Option<String>,
    structured_output: bool,
}

impl AgentStage {
    pub fn new(agent_name: impl Into<String>, agent: Arc<dyn AgentExecutor>) -> Self {
        Self {
            agent_name: agent_name.into(),
            agent,
            instructions: None,
            task: None,
            structured_output: false,
        }
    }

    /// System-style instructions placed at the top of every prompt
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// What this particular stage asks of the agent
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Parse a JSON object from the response into `StepContent::structured`
    pub fn with_structured_output(mut self, enabled: bool) -> Self {
        self.structured_output = enabled;
        self
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Build the prompt for one invocation
    pub fn build_prompt(&self, input: &StepInput) -> String {
        let variables = input.rendering_variables();
        let mut sections = Vec::new();

        if let Some(instructions) = &self.instructions {
            sections.push(render_template(instructions.trim(), &variables));
        }

        if let Some(task) = &self.task {
            sections.push(format!("Task: {}", render_template(task, &variables)));
        }

        sections.push(format!(
            "Message:\n{}",
            render_template(&input.message, &variables)
        ));

        if let Some(previous) = input.previous_text() {
            sections.push(format!("Previous step output:\n{}", previous.trim_end()));
        }

        if self.structured_output {
            sections.push("Respond with a single JSON object.".to_string());
        }

        sections.join("\n\n")
    }
}

#[async_trait]
impl StageExecutor for AgentStage {
    async fn run(
        &self,
        input: &StepInput,
        callback: Option<&dyn ProgressCallback>,
    ) -> Result<StepContent, AgentError> {
        let stage = input.current_stage.as_deref().unwrap_or("<unnamed>");
        info!("Executing stage {} with agent {}", stage, self.agent_name);

        let prompt = self.build_prompt(input);
        debug!("Prompt for stage {}: {}", stage, prompt);

        let response = self.agent.execute_streaming(&prompt, callback).await?;
        debug!("Agent response for stage {}: {}", stage, response.content);

        let mut content = StepContent::text(response.content);
        if self.structured_output {
            content.structured = extract_structured(&content.text);
            if content.structured.is_none() {
                debug!("Stage {} returned no parseable JSON object", stage);
            }
        }

        Ok(content)
    }
}

/// Pull a JSON object or array out of an agent response
///
/// Tries a fenced ```json block first, then the whole body, then the
/// outermost `{ ... }` span.
pub fn extract_structured(text: &str) -> Option<Value> {
    if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            if let Some(value) = parse_container(&body[..end]) {
                return Some(value);
            }
        }
    }

    if let Some(value) = parse_container(text) {
        return Some(value);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_container(&text[start..=end])
}

fn parse_container(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

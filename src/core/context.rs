//! Step input and content - the data threaded between stages

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Output of a stage: raw text plus an optional structured payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StepContent {
    /// Textual content returned by the executor
    pub text: String,

    /// Structured payload extracted from the response, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<Value>,
}

impl StepContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            structured: None,
        }
    }

    pub fn with_structured(mut self, structured: Value) -> Self {
        self.structured = Some(structured);
        self
    }

    /// Look up a structured field by JSON pointer (e.g. `/status`)
    pub fn field(&self, pointer: &str) -> Option<&Value> {
        self.structured.as_ref().and_then(|v| v.pointer(pointer))
    }
}

/// Input handed to each stage executor and predicate
///
/// Carries the initial message, the most recently produced output and
/// every output produced so far in this run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepInput {
    /// Message the run was started with
    pub message: String,

    /// Output of the most recent stage or merged parallel group
    pub previous_content: Option<StepContent>,

    /// Outputs of completed stages (stage name -> content)
    pub outputs: HashMap<String, StepContent>,

    /// Workflow variables available for template rendering
    pub variables: HashMap<String, String>,

    /// The stage currently being executed (if any)
    pub current_stage: Option<String>,
}

impl StepInput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    /// Text of the previous output
    pub fn previous_text(&self) -> Option<&str> {
        self.previous_content.as_ref().map(|c| c.text.as_str())
    }

    /// Get the output of a stage
    pub fn get_output(&self, stage: &str) -> Option<&StepContent> {
        self.outputs.get(stage)
    }

    /// Store a stage output without changing the previous output
    pub fn set_output(&mut self, stage: &str, content: StepContent) {
        self.outputs.insert(stage.to_string(), content);
    }

    /// Replace the previous output
    pub fn set_previous(&mut self, content: StepContent) {
        self.previous_content = Some(content);
    }

    /// Copy of this input scoped to one stage
    pub fn for_stage(&self, stage: &str) -> Self {
        let mut input = self.clone();
        input.current_stage = Some(stage.to_string());
        input
    }

    /// Get all variables available for template rendering
    pub fn rendering_variables(&self) -> HashMap<String, String> {
        let mut vars = self.variables.clone();

        vars.insert("message".to_string(), self.message.clone());

        if let Some(previous) = self.previous_text() {
            vars.insert("previous_output".to_string(), previous.to_string());
        }

        for (stage, content) in &self.outputs {
            vars.insert(format!("stages.{}.output", stage), content.text.clone());
        }

        if let Some(ref current) = self.current_stage {
            vars.insert("current_stage".to_string(), current.clone());
        }

        vars
    }
}

/// Replace `{{ name }}` placeholders with values from `variables`
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in variables {
        let placeholder = format!("{{{{ {} }}}}", key);
        rendered = rendered.replace(&placeholder, value);
    }
    rendered
}

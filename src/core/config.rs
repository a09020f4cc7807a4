//! Workflow configuration from YAML

use crate::{
    agent::{AgentClientConfig, AgentExecutor, CliAgentClient},
    core::{
        ConditionPattern, ConditionalGroup, FieldMatch, OutputCondition, ParallelGroup,
        PredicateFailurePolicy, Stage, Workflow, WorkflowItem,
    },
    execution::AgentStage,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Top-level workflow configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Global variables available to all stages
    #[serde(default)]
    variables: HashMap<String, Value>,

    /// What to do when a condition cannot be evaluated
    #[serde(default)]
    pub on_predicate_error: PredicateFailurePolicy,

    /// Agent definitions keyed by id
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,

    /// Workflow items in execution order
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<StepConfig>,
}

/// Agent definition as referenced by stages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Display name (defaults to the id)
    #[serde(default)]
    pub name: Option<String>,

    /// Instructions placed at the top of every prompt for this agent
    #[serde(default)]
    pub instructions: Option<String>,

    /// Command to run instead of the default agent CLI
    #[serde(default)]
    pub command: Option<Vec<String>>,

    /// Extract a JSON object from responses into structured content
    #[serde(default)]
    pub structured_output: bool,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// One item of a `steps` list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepConfig {
    Step(StageConfig),
    Parallel(ParallelConfig),
    Condition(ConditionGroupConfig),
}

impl StepConfig {
    pub fn name(&self) -> &str {
        match self {
            StepConfig::Step(stage) => &stage.name,
            StepConfig::Parallel(group) => &group.name,
            StepConfig::Condition(group) => &group.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,

    /// Used as the task line of the prompt
    #[serde(default)]
    pub description: Option<String>,

    /// Id of the agent that performs this stage
    pub agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub steps: Vec<StageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionGroupConfig {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Predicate over the previous output
    pub when: ConditionConfig,

    pub steps: Vec<StepConfig>,
}

/// Declarative predicate; every given criterion must hold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionConfig {
    #[serde(default)]
    pub contains_any: Vec<String>,

    #[serde(default)]
    pub contains_all: Vec<String>,

    #[serde(default)]
    pub regex: Option<String>,

    /// Structured field path (`forno.status` or `/forno/status`)
    #[serde(default)]
    pub field: Option<String>,

    #[serde(default)]
    pub equals: Option<serde_json::Value>,

    #[serde(default = "default_case_insensitive")]
    pub case_insensitive: bool,

    #[serde(default)]
    pub negate: bool,
}

fn default_case_insensitive() -> bool {
    true
}

impl ConditionConfig {
    /// Compile into an [`OutputCondition`]
    pub fn to_condition(&self) -> Result<OutputCondition> {
        let ci = self.case_insensitive;
        let mut condition = OutputCondition::new();

        condition.any_of = self
            .contains_any
            .iter()
            .map(|n| ConditionPattern::substring(n, ci))
            .collect();
        condition.all_of = self
            .contains_all
            .iter()
            .map(|n| ConditionPattern::substring(n, ci))
            .collect();

        if let Some(pattern) = &self.regex {
            let regex = ConditionPattern::regex(pattern, ci)
                .with_context(|| format!("Invalid regex '{}'", pattern))?;
            condition.all_of.push(regex);
        }

        match (&self.field, &self.equals) {
            (Some(field), Some(expected)) => {
                condition.field = Some(FieldMatch::new(field, expected.clone(), ci));
            }
            (Some(field), None) => anyhow::bail!("Field '{}' has no 'equals' value", field),
            (None, Some(_)) => anyhow::bail!("'equals' given without 'field'"),
            (None, None) => {}
        }

        if condition.is_empty() {
            anyhow::bail!("Condition has no criteria");
        }

        condition.negate = self.negate;
        Ok(condition)
    }
}

/// Maps an agent definition to an executor
pub trait AgentProvider: Send + Sync {
    fn agent(&self, id: &str, config: &AgentConfig) -> Result<Arc<dyn AgentExecutor>>;
}

/// Creates subprocess-backed agents from their configured command
#[derive(Debug, Clone, Default)]
pub struct CommandAgentProvider {
    defaults: AgentClientConfig,
}

impl CommandAgentProvider {
    pub fn new(defaults: AgentClientConfig) -> Self {
        Self { defaults }
    }
}

impl AgentProvider for CommandAgentProvider {
    fn agent(&self, id: &str, config: &AgentConfig) -> Result<Arc<dyn AgentExecutor>> {
        let mut client_config = self.defaults.clone();
        if let Some(command) = &config.command {
            if command.is_empty() {
                anyhow::bail!("Agent '{}' has an empty command", id);
            }
            client_config = client_config.with_command(command.iter().cloned());
        }
        if let Some(timeout) = config.timeout_secs {
            client_config = client_config.with_timeout(timeout);
        }
        debug!("Agent {} uses command {:?}", id, client_config.command);
        Ok(Arc::new(CliAgentClient::new(client_config)))
    }
}

/// Fixed set of pre-built agents, looked up by id
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn AgentExecutor>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, id: impl Into<String>, agent: Arc<dyn AgentExecutor>) -> Self {
        self.agents.insert(id.into(), agent);
        self
    }
}

impl AgentProvider for AgentRegistry {
    fn agent(&self, id: &str, _config: &AgentConfig) -> Result<Arc<dyn AgentExecutor>> {
        self.agents
            .get(id)
            .cloned()
            .with_context(|| format!("No agent registered for '{}'", id))
    }
}

impl WorkflowConfig {
    /// Load workflow configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid workflow file {}", path.display()))
    }

    /// Parse workflow configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the workflow configuration
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            anyhow::bail!("Workflow '{}' has no steps", self.name);
        }

        let mut seen = HashSet::new();
        self.validate_steps(&self.steps, &mut seen)
    }

    fn validate_steps<'a>(
        &self,
        steps: &'a [StepConfig],
        seen: &mut HashSet<&'a str>,
    ) -> Result<()> {
        for step in steps {
            if !seen.insert(step.name()) {
                anyhow::bail!("Duplicate step name: {}", step.name());
            }

            match step {
                StepConfig::Step(stage) => self.check_agent(stage)?,
                StepConfig::Parallel(group) => {
                    if group.steps.is_empty() {
                        anyhow::bail!("Parallel group '{}' has no steps", group.name);
                    }
                    for stage in &group.steps {
                        if !seen.insert(stage.name.as_str()) {
                            anyhow::bail!("Duplicate step name: {}", stage.name);
                        }
                        self.check_agent(stage)?;
                    }
                }
                StepConfig::Condition(group) => {
                    group
                        .when
                        .to_condition()
                        .with_context(|| format!("Condition '{}' is invalid", group.name))?;
                    if group.steps.is_empty() {
                        anyhow::bail!("Condition '{}' has no steps", group.name);
                    }
                    self.validate_steps(&group.steps, seen)?;
                }
            }
        }
        Ok(())
    }

    fn check_agent(&self, stage: &StageConfig) -> Result<()> {
        if !self.agents.contains_key(&stage.agent) {
            anyhow::bail!(
                "Step '{}' references non-existent agent '{}'",
                stage.name,
                stage.agent
            );
        }
        Ok(())
    }

    /// Override or add a variable
    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), Value::String(value.into()));
    }

    /// Get variables as string map
    pub fn variables_as_string_map(&self) -> HashMap<String, String> {
        self.variables
            .iter()
            .map(|(k, v)| (k.clone(), render_value(v)))
            .collect()
    }

    /// Every stage name in declaration order, including nested ones
    pub fn stage_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_stage_names(&self.steps, &mut names);
        names
    }

    /// Build the workflow, resolving each agent through `provider` once
    pub fn build(&self, provider: &dyn AgentProvider) -> Result<Workflow> {
        self.validate()?;

        let mut agents = HashMap::new();
        let items = self.build_items(&self.steps, provider, &mut agents)?;

        let mut workflow = Workflow::new(&self.name)
            .with_variables(self.variables_as_string_map())
            .with_predicate_policy(self.on_predicate_error);
        if let Some(description) = &self.description {
            workflow = workflow.with_description(description);
        }
        for item in items {
            workflow = workflow.then(item);
        }
        Ok(workflow)
    }

    fn build_items(
        &self,
        steps: &[StepConfig],
        provider: &dyn AgentProvider,
        agents: &mut HashMap<String, Arc<dyn AgentExecutor>>,
    ) -> Result<Vec<WorkflowItem>> {
        let mut items = Vec::with_capacity(steps.len());
        for step in steps {
            let item = match step {
                StepConfig::Step(stage) => self.build_stage(stage, provider, agents)?.into(),
                StepConfig::Parallel(group) => {
                    let stages = group
                        .steps
                        .iter()
                        .map(|stage| self.build_stage(stage, provider, agents))
                        .collect::<Result<Vec<_>>>()?;
                    let mut parallel = ParallelGroup::new(&group.name, stages);
                    if let Some(description) = &group.description {
                        parallel = parallel.with_description(description);
                    }
                    parallel.into()
                }
                StepConfig::Condition(group) => {
                    let condition = group.when.to_condition()?;
                    let nested = self.build_items(&group.steps, provider, agents)?;
                    let mut conditional =
                        ConditionalGroup::new(&group.name, Arc::new(condition), nested);
                    if let Some(description) = &group.description {
                        conditional = conditional.with_description(description);
                    }
                    conditional.into()
                }
            };
            items.push(item);
        }
        Ok(items)
    }

    fn build_stage(
        &self,
        stage: &StageConfig,
        provider: &dyn AgentProvider,
        agents: &mut HashMap<String, Arc<dyn AgentExecutor>>,
    ) -> Result<Stage> {
        let agent_config = self
            .agents
            .get(&stage.agent)
            .with_context(|| format!("Unknown agent '{}'", stage.agent))?;

        let agent = match agents.get(&stage.agent) {
            Some(agent) => agent.clone(),
            None => {
                let agent = provider
                    .agent(&stage.agent, agent_config)
                    .with_context(|| format!("Failed to create agent '{}'", stage.agent))?;
                agents.insert(stage.agent.clone(), agent.clone());
                agent
            }
        };

        let agent_name = agent_config.name.as_deref().unwrap_or(&stage.agent);
        let mut executor = AgentStage::new(agent_name, agent)
            .with_structured_output(agent_config.structured_output);
        if let Some(instructions) = &agent_config.instructions {
            executor = executor.with_instructions(instructions);
        }
        if let Some(description) = &stage.description {
            executor = executor.with_task(description);
        }

        let mut built = Stage::new(&stage.name, Arc::new(executor));
        if let Some(description) = &stage.description {
            built = built.with_description(description);
        }
        Ok(built)
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn collect_stage_names(steps: &[StepConfig], names: &mut Vec<String>) {
    for step in steps {
        match step {
            StepConfig::Step(stage) => names.push(stage.name.clone()),
            StepConfig::Parallel(group) => {
                names.extend(group.steps.iter().map(|s| s.name.clone()))
            }
            StepConfig::Condition(group) => collect_stage_names(&group.steps, names),
        }
    }
}

//! Workflow domain model

use crate::core::condition::{Condition, PredicateFailurePolicy};
use crate::core::stage::Stage;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A named set of stages executed concurrently
///
/// The group completes once every member has finished.
#[derive(Debug, Clone)]
pub struct ParallelGroup {
    pub name: String,
    pub description: Option<String>,
    pub stages: Vec<Stage>,
}

impl ParallelGroup {
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Self {
        Self {
            name: name.into(),
            description: None,
            stages,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A nested sequence gated by a predicate over the previous output
#[derive(Clone)]
pub struct ConditionalGroup {
    pub name: String,
    pub description: Option<String>,
    pub condition: Arc<dyn Condition>,
    pub items: Vec<WorkflowItem>,
}

impl ConditionalGroup {
    pub fn new(
        name: impl Into<String>,
        condition: Arc<dyn Condition>,
        items: Vec<WorkflowItem>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            condition,
            items,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Names of every stage nested under this group
    pub fn stage_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_stage_names(&self.items, &mut names);
        names
    }
}

impl fmt::Debug for ConditionalGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalGroup")
            .field("name", &self.name)
            .field("condition", &self.condition.describe())
            .field("items", &self.items)
            .finish()
    }
}

/// One entry of a workflow's ordered pipeline
#[derive(Debug, Clone)]
pub enum WorkflowItem {
    Stage(Stage),
    Parallel(ParallelGroup),
    Conditional(ConditionalGroup),
}

impl WorkflowItem {
    pub fn name(&self) -> &str {
        match self {
            WorkflowItem::Stage(stage) => &stage.name,
            WorkflowItem::Parallel(group) => &group.name,
            WorkflowItem::Conditional(group) => &group.name,
        }
    }
}

impl From<Stage> for WorkflowItem {
    fn from(stage: Stage) -> Self {
        WorkflowItem::Stage(stage)
    }
}

impl From<ParallelGroup> for WorkflowItem {
    fn from(group: ParallelGroup) -> Self {
        WorkflowItem::Parallel(group)
    }
}

impl From<ConditionalGroup> for WorkflowItem {
    fn from(group: ConditionalGroup) -> Self {
        WorkflowItem::Conditional(group)
    }
}

/// A workflow definition: an ordered, fixed pipeline of items
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Workflow name
    pub name: String,

    pub description: Option<String>,

    /// Variables available to all stages
    pub variables: HashMap<String, String>,

    /// What to do when a predicate fails to evaluate
    pub predicate_policy: PredicateFailurePolicy,

    items: Vec<WorkflowItem>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            variables: HashMap::new(),
            predicate_policy: PredicateFailurePolicy::default(),
            items: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_predicate_policy(mut self, policy: PredicateFailurePolicy) -> Self {
        self.predicate_policy = policy;
        self
    }

    /// Append an item to the pipeline
    pub fn then(mut self, item: impl Into<WorkflowItem>) -> Self {
        self.items.push(item.into());
        self
    }

    pub fn items(&self) -> &[WorkflowItem] {
        &self.items
    }

    /// Every stage name in declaration order, including nested ones
    pub fn stage_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_stage_names(&self.items, &mut names);
        names
    }

    pub fn stage_count(&self) -> usize {
        self.stage_names().len()
    }

    /// Check structural invariants: non-empty, unique names, non-empty groups
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            anyhow::bail!("Workflow '{}' has no steps", self.name);
        }

        let mut seen = HashSet::new();
        validate_items(&self.items, &mut seen)
    }
}

fn collect_stage_names(items: &[WorkflowItem], names: &mut Vec<String>) {
    for item in items {
        match item {
            WorkflowItem::Stage(stage) => names.push(stage.name.clone()),
            WorkflowItem::Parallel(group) => {
                names.extend(group.stages.iter().map(|s| s.name.clone()))
            }
            WorkflowItem::Conditional(group) => collect_stage_names(&group.items, names),
        }
    }
}

fn validate_items(items: &[WorkflowItem], seen: &mut HashSet<String>) -> Result<()> {
    for item in items {
        if !seen.insert(item.name().to_string()) {
            anyhow::bail!("Duplicate step name: {}", item.name());
        }

        match item {
            WorkflowItem::Stage(_) => {}
            WorkflowItem::Parallel(group) => {
                if group.stages.is_empty() {
                    anyhow::bail!("Parallel group '{}' has no stages", group.name);
                }
                for stage in &group.stages {
                    if !seen.insert(stage.name.clone()) {
                        anyhow::bail!("Duplicate step name: {}", stage.name);
                    }
                }
            }
            WorkflowItem::Conditional(group) => {
                if group.items.is_empty() {
                    anyhow::bail!("Condition '{}' has no steps", group.name);
                }
                validate_items(&group.items, seen)?;
            }
        }
    }
    Ok(())
}

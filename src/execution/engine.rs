//! Main execution engine - runs a workflow's items in order

use crate::{
    agent::{AgentError, ProgressCallback, StreamEvent},
    core::{
        ConditionRecord, ConditionalGroup, ExecutionStatus, ParallelGroup, PredicateFailurePolicy,
        Stage, StageOutcome, StageRecord, StepContent, StepInput, Workflow, WorkflowItem,
        WorkflowRun,
    },
    execution::WorkflowError,
};
use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events that can occur during a workflow run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    WorkflowStarted {
        execution_id: Uuid,
        workflow_name: String,
    },
    StageStarted {
        stage: String,
        group: Option<String>,
    },
    /// A streamed chunk of a stage's output (only with streaming enabled)
    StageChunk {
        stage: String,
        delta: String,
    },
    StageCompleted {
        stage: String,
        content: StepContent,
    },
    StageFailed {
        stage: String,
        error: String,
    },
    StageSkipped {
        stage: String,
        condition: String,
    },
    ParallelStarted {
        group: String,
        stages: Vec<String>,
    },
    ParallelCompleted {
        group: String,
    },
    ConditionEvaluated {
        condition: String,
        result: bool,
        error: Option<String>,
    },
    WorkflowCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

type StageResult = (DateTime<Utc>, DateTime<Utc>, Result<StepContent, AgentError>);

/// Runs workflows, threading each output into the next item
#[derive(Default)]
pub struct WorkflowRunner {
    event_handlers: Vec<EventHandler>,
    stream: bool,
}

impl WorkflowRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward executor chunks as `StageChunk` events
    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    fn emit(&self, event: ExecutionEvent) {
        emit_to(&self.event_handlers, event);
    }

    /// Run `workflow` with `message`, returning the completed run log
    pub async fn run(
        &self,
        workflow: &Workflow,
        message: impl Into<String>,
    ) -> Result<WorkflowRun, WorkflowError> {
        let mut run = WorkflowRun::new(&workflow.name, message, workflow.stage_count());
        self.execute(workflow, &mut run).await?;
        Ok(run)
    }

    /// Execute the workflow, appending every record to `run`
    ///
    /// `run` keeps whatever was recorded before a failure, so callers can
    /// persist partial runs.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        run: &mut WorkflowRun,
    ) -> Result<(), WorkflowError> {
        workflow
            .validate()
            .map_err(|e| WorkflowError::Invalid(format!("{:#}", e)))?;

        let execution_id = run.execution_id;
        info!("Starting workflow execution: {} ({})", workflow.name, execution_id);
        self.emit(ExecutionEvent::WorkflowStarted {
            execution_id,
            workflow_name: workflow.name.clone(),
        });

        run.start();
        let mut input =
            StepInput::new(run.message.clone()).with_variables(workflow.variables.clone());

        let result = self
            .run_items(workflow, workflow.items(), None, &mut input, run)
            .await;

        match &result {
            Ok(()) => run.complete(),
            Err(e) => {
                error!("Workflow {} aborted: {}", workflow.name, e);
                run.fail();
            }
        }

        info!(
            "Workflow execution finished: {} - {:?}",
            workflow.name, run.status
        );
        self.emit(ExecutionEvent::WorkflowCompleted {
            execution_id,
            status: run.status,
        });

        result
    }

    fn run_items<'a>(
        &'a self,
        workflow: &'a Workflow,
        items: &'a [WorkflowItem],
        group: Option<&'a str>,
        input: &'a mut StepInput,
        run: &'a mut WorkflowRun,
    ) -> BoxFuture<'a, Result<(), WorkflowError>> {
        Box::pin(async move {
            for item in items {
                match item {
                    WorkflowItem::Stage(stage) => {
                        self.run_stage(stage, group, input, run).await?;
                    }
                    WorkflowItem::Parallel(parallel) => {
                        self.run_parallel(parallel, input, run).await?;
                    }
                    WorkflowItem::Conditional(conditional) => {
                        self.run_conditional(workflow, conditional, input, run)
                            .await?;
                    }
                }
            }
            Ok(())
        })
    }

    async fn run_stage(
        &self,
        stage: &Stage,
        group: Option<&str>,
        input: &mut StepInput,
        run: &mut WorkflowRun,
    ) -> Result<(), WorkflowError> {
        let stage_input = input.for_stage(&stage.name);
        let (started_at, completed_at, result) = self.invoke(stage, group, &stage_input).await;

        let content = self.record(run, stage, group, started_at, completed_at, result)?;
        input.set_output(&stage.name, content.clone());
        input.set_previous(content);
        Ok(())
    }

    async fn run_parallel(
        &self,
        group: &ParallelGroup,
        input: &mut StepInput,
        run: &mut WorkflowRun,
    ) -> Result<(), WorkflowError> {
        info!(
            "Starting parallel group {} ({} stages)",
            group.name,
            group.stages.len()
        );
        self.emit(ExecutionEvent::ParallelStarted {
            group: group.name.clone(),
            stages: group.stages.iter().map(|s| s.name.clone()).collect(),
        });

        // Every member sees the same snapshot of the input
        let snapshots: Vec<StepInput> = group
            .stages
            .iter()
            .map(|s| input.for_stage(&s.name))
            .collect();

        let results = join_all(
            group
                .stages
                .iter()
                .zip(snapshots.iter())
                .map(|(stage, stage_input)| self.invoke(stage, Some(&group.name), stage_input)),
        )
        .await;

        let mut first_error = None;
        let mut sections = Vec::with_capacity(group.stages.len());
        let mut structured = Map::new();

        for (stage, (started_at, completed_at, result)) in group.stages.iter().zip(results) {
            match self.record(run, stage, Some(&group.name), started_at, completed_at, result) {
                Ok(content) => {
                    sections.push(format!("## {}\n{}", stage.name, content.text.trim_end()));
                    structured.insert(
                        stage.name.clone(),
                        content
                            .structured
                            .clone()
                            .unwrap_or_else(|| Value::String(content.text.clone())),
                    );
                    input.set_output(&stage.name, content);
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        input.set_previous(StepContent {
            text: sections.join("\n\n"),
            structured: Some(Value::Object(structured)),
        });

        debug!("Parallel group {} joined", group.name);
        self.emit(ExecutionEvent::ParallelCompleted {
            group: group.name.clone(),
        });
        Ok(())
    }

    async fn run_conditional(
        &self,
        workflow: &Workflow,
        group: &ConditionalGroup,
        input: &mut StepInput,
        run: &mut WorkflowRun,
    ) -> Result<(), WorkflowError> {
        let (holds, failure) = match group.condition.evaluate(input) {
            Ok(holds) => (holds, None),
            Err(e) => (false, Some(e)),
        };
        let error_text = failure.as_ref().map(|e| e.to_string());

        debug!(
            "Condition {} ({}) evaluated to {}",
            group.name,
            group.condition.describe(),
            holds
        );
        run.conditions.push(ConditionRecord {
            condition: group.name.clone(),
            result: holds,
            error: error_text.clone(),
            evaluated_at: Utc::now(),
        });
        self.emit(ExecutionEvent::ConditionEvaluated {
            condition: group.name.clone(),
            result: holds,
            error: error_text,
        });

        if let Some(source) = failure {
            if workflow.predicate_policy == PredicateFailurePolicy::Fail {
                error!("Condition {} failed: {}", group.name, source);
                return Err(WorkflowError::Predicate {
                    condition: group.name.clone(),
                    source,
                });
            }
            warn!(
                "Condition {} failed to evaluate, treating as false: {}",
                group.name, source
            );
        }

        if !holds {
            let skipped = group.stage_names();
            info!("Skipping {} stage(s) under condition {}", skipped.len(), group.name);
            for stage in &skipped {
                self.emit(ExecutionEvent::StageSkipped {
                    stage: stage.clone(),
                    condition: group.name.clone(),
                });
            }
            run.skipped_stages.extend(skipped);
            return Ok(());
        }

        info!("Condition {} holds", group.name);
        self.run_items(workflow, &group.items, Some(&group.name), input, run)
            .await
    }

    /// Invoke a stage's executor once
    async fn invoke(&self, stage: &Stage, group: Option<&str>, input: &StepInput) -> StageResult {
        info!("Starting stage {}", stage.name);
        self.emit(ExecutionEvent::StageStarted {
            stage: stage.name.clone(),
            group: group.map(str::to_string),
        });

        let started_at = Utc::now();
        let result = if self.stream {
            let callback = StageCallback {
                handlers: &self.event_handlers,
                stage: &stage.name,
            };
            stage.executor().run(input, Some(&callback)).await
        } else {
            stage.executor().run(input, None).await
        };
        (started_at, Utc::now(), result)
    }

    /// Append a stage record and emit its outcome
    fn record(
        &self,
        run: &mut WorkflowRun,
        stage: &Stage,
        group: Option<&str>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        result: Result<StepContent, AgentError>,
    ) -> Result<StepContent, WorkflowError> {
        let group = group.map(str::to_string);
        match result {
            Ok(content) => {
                info!("Stage {} completed", stage.name);
                run.records.push(StageRecord {
                    stage: stage.name.clone(),
                    group,
                    outcome: StageOutcome::Completed {
                        content: content.clone(),
                    },
                    started_at,
                    completed_at,
                });
                self.emit(ExecutionEvent::StageCompleted {
                    stage: stage.name.clone(),
                    content: content.clone(),
                });
                Ok(content)
            }
            Err(source) => {
                error!("Stage {} failed: {}", stage.name, source);
                run.records.push(StageRecord {
                    stage: stage.name.clone(),
                    group,
                    outcome: StageOutcome::Failed {
                        error: source.to_string(),
                    },
                    started_at,
                    completed_at,
                });
                self.emit(ExecutionEvent::StageFailed {
                    stage: stage.name.clone(),
                    error: source.to_string(),
                });
                Err(WorkflowError::StageFailed {
                    stage: stage.name.clone(),
                    source,
                })
            }
        }
    }
}

fn emit_to(handlers: &[EventHandler], event: ExecutionEvent) {
    for handler in handlers {
        handler(event.clone());
    }
}

/// Forwards an executor's stream as `StageChunk` events
struct StageCallback<'a> {
    handlers: &'a [EventHandler],
    stage: &'a str,
}

impl ProgressCallback for StageCallback<'_> {
    fn on_event(&self, event: &StreamEvent) {
        if let StreamEvent::TextDelta { delta } = event {
            emit_to(
                self.handlers,
                ExecutionEvent::StageChunk {
                    stage: self.stage.to_string(),
                    delta: delta.clone(),
                },
            );
        }
    }
}

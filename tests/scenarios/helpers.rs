//! Test utility functions for agent-workflow

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use workflow::{
    AgentError, AgentExecutor, AgentResponse, ExecutionStatus, ProgressCallback, Stage,
    StageExecutor, StepContent, StepInput, StreamEvent, WorkflowRun,
};

/// Tracks how many executors are running at the same time
#[derive(Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of overlapping invocations seen
    pub fn max_in_flight(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Stage executor that returns a predefined output
///
/// Every invocation is counted and its input kept, so tests can check
/// what a stage saw and how often it ran.
pub struct MockStage {
    response: StepContent,
    fail_with: Option<String>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<StepInput>>,
    simulate_delay: Option<Duration>,
    probe: Option<Arc<ConcurrencyProbe>>,
}

impl MockStage {
    pub fn new(text: &str) -> Self {
        Self {
            response: StepContent::text(text),
            fail_with: None,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
            simulate_delay: None,
            probe: None,
        }
    }

    /// Output with both text and a structured value
    pub fn structured(text: &str, structured: Value) -> Self {
        let mut stage = Self::new(text);
        stage.response = StepContent::text(text).with_structured(structured);
        stage
    }

    /// Executor that always fails with an API error
    pub fn failing(message: &str) -> Self {
        let mut stage = Self::new("");
        stage.fail_with = Some(message.to_string());
        stage
    }

    /// Add artificial delay to simulate a slow agent
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.simulate_delay = Some(delay);
        self
    }

    pub fn with_probe(mut self, probe: &Arc<ConcurrencyProbe>) -> Self {
        self.probe = Some(probe.clone());
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of times the stage ran
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Inputs received, in invocation order
    pub fn inputs(&self) -> Vec<StepInput> {
        self.inputs.lock().unwrap().clone()
    }

    /// Previous-output text seen by the most recent invocation
    pub fn last_previous_text(&self) -> Option<String> {
        self.inputs
            .lock()
            .unwrap()
            .last()
            .and_then(|input| input.previous_text().map(str::to_string))
    }
}

#[async_trait]
impl StageExecutor for MockStage {
    async fn run(
        &self,
        input: &StepInput,
        callback: Option<&dyn ProgressCallback>,
    ) -> Result<StepContent, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.clone());

        if let Some(probe) = &self.probe {
            probe.enter();
        }
        if let Some(delay) = self.simulate_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(probe) = &self.probe {
            probe.leave();
        }

        if let Some(message) = &self.fail_with {
            return Err(AgentError::Api(message.clone()));
        }

        if let Some(cb) = callback {
            cb.on_event(&StreamEvent::Start);
            for line in self.response.text.lines() {
                cb.on_event(&StreamEvent::TextDelta {
                    delta: format!("{}\n", line),
                });
            }
            cb.on_event(&StreamEvent::End {
                content: self.response.text.clone(),
            });
        }

        Ok(self.response.clone())
    }
}

/// Build a stage bound to a shared mock
pub fn stage(name: &str, mock: &Arc<MockStage>) -> Stage {
    Stage::new(name, mock.clone())
}

/// Agent that returns predefined responses in order and keeps every prompt
pub struct MockAgent {
    responses: Arc<Vec<String>>,
    index: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockAgent {
    pub fn new(responses: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            responses: Arc::new(responses.into_iter().map(str::to_string).collect()),
            index: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Get the current response index (how many have been used)
    pub fn current_index(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentExecutor for MockAgent {
    async fn execute(&self, prompt: &str) -> Result<AgentResponse, AgentError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let idx = self.index.fetch_add(1, Ordering::SeqCst);

        match self.responses.get(idx) {
            Some(response) => Ok(AgentResponse::new(response.clone())),
            None => Err(AgentError::Internal(format!(
                "MockAgent: No response available for request {}",
                idx + 1
            ))),
        }
    }
}

/// Assert that the run finished successfully
pub fn assert_workflow_completed(run: &WorkflowRun) {
    assert_eq!(
        run.status,
        ExecutionStatus::Completed,
        "Workflow should complete, got {:?} with records {:?}",
        run.status,
        run.execution_order()
    );
    assert!(run.completed_at.is_some(), "Completed run should have an end time");
}

/// Assert that the run was aborted
pub fn assert_workflow_failed(run: &WorkflowRun) {
    assert_eq!(
        run.status,
        ExecutionStatus::Failed,
        "Workflow should fail, got {:?}",
        run.status
    );
}

/// Assert the exact order in which stages were recorded
pub fn assert_execution_order(run: &WorkflowRun, expected: &[&str]) {
    assert_eq!(
        run.execution_order(),
        expected,
        "Stages should be recorded in order {:?}",
        expected
    );
}

/// Assert the stages skipped by false conditions
pub fn assert_skipped(run: &WorkflowRun, expected: &[&str]) {
    let skipped: Vec<&str> = run.skipped_stages.iter().map(String::as_str).collect();
    assert_eq!(skipped, expected, "Skipped stages should be {:?}", expected);
}

/// Assert how many times a mock stage was invoked
pub fn assert_invoked(mock: &MockStage, name: &str, times: usize) {
    assert_eq!(
        mock.calls(),
        times,
        "Stage '{}' should be invoked {} time(s), was invoked {}",
        name,
        times,
        mock.calls()
    );
}

/// Assert the output text a stage produced
pub fn assert_output(run: &WorkflowRun, stage: &str, expected: &str) {
    let output = run
        .output_of(stage)
        .unwrap_or_else(|| panic!("Stage '{}' should have an output", stage));
    assert_eq!(output.text, expected, "Unexpected output for stage '{}'", stage);
}

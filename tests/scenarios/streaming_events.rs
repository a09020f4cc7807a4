//! Test: Streaming Events - chunk forwarding and event order

use crate::helpers::*;
use std::sync::{Arc, Mutex};
use workflow::{
    ConditionalGroup, ExecutionEvent, ExecutionStatus, OutputCondition, ParallelGroup, Workflow,
    WorkflowRunner,
};

fn collecting_runner(stream: bool) -> (WorkflowRunner, Arc<Mutex<Vec<ExecutionEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let mut runner = WorkflowRunner::new().with_streaming(stream);
    {
        let events = events.clone();
        runner.add_event_handler(move |event| events.lock().unwrap().push(event));
    }
    (runner, events)
}

fn chunks(events: &[ExecutionEvent]) -> Vec<(String, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::StageChunk { stage, delta } => Some((stage.clone(), delta.clone())),
            _ => None,
        })
        .collect()
}

/// Streamed chunks are tagged with the stage that produced them
#[tokio::test]
async fn test_chunks_carry_stage_names() {
    let oven = MockStage::new("Forno F001\n1000C").into_arc();
    let quality = MockStage::new("Lote aprovado").into_arc();

    let workflow = Workflow::new("w").then(ParallelGroup::new(
        "monitoramento_paralelo",
        vec![stage("monitorar_forno", &oven), stage("controle_qualidade", &quality)],
    ));

    let (runner, events) = collecting_runner(true);
    runner.run(&workflow, "m").await.unwrap();

    let mut received = chunks(&events.lock().unwrap());
    received.sort();
    assert_eq!(
        received,
        vec![
            ("controle_qualidade".to_string(), "Lote aprovado\n".to_string()),
            ("monitorar_forno".to_string(), "1000C\n".to_string()),
            ("monitorar_forno".to_string(), "Forno F001\n".to_string()),
        ]
    );
}

/// Without streaming no chunk events are emitted
#[tokio::test]
async fn test_no_chunks_without_streaming() {
    let oven = MockStage::new("Forno F001\n1000C").into_arc();
    let workflow = Workflow::new("w").then(stage("monitorar_forno", &oven));

    let (runner, events) = collecting_runner(false);
    runner.run(&workflow, "m").await.unwrap();

    assert!(chunks(&events.lock().unwrap()).is_empty());
}

/// Events follow the run from start to completion
#[tokio::test]
async fn test_event_sequence() {
    let monitor = MockStage::new("tudo normal").into_arc();
    let maintenance = MockStage::new("x").into_arc();

    let workflow = Workflow::new("industrial")
        .then(stage("monitorar", &monitor))
        .then(ConditionalGroup::new(
            "verificar_manutencao",
            Arc::new(OutputCondition::contains_any(["alerta"], true)),
            vec![stage("executar_manutencao", &maintenance).into()],
        ));

    let (runner, events) = collecting_runner(false);
    let run = runner.run(&workflow, "m").await.unwrap();

    let events = events.lock().unwrap();
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            ExecutionEvent::WorkflowStarted { .. } => "workflow_started",
            ExecutionEvent::StageStarted { .. } => "stage_started",
            ExecutionEvent::StageChunk { .. } => "stage_chunk",
            ExecutionEvent::StageCompleted { .. } => "stage_completed",
            ExecutionEvent::StageFailed { .. } => "stage_failed",
            ExecutionEvent::StageSkipped { .. } => "stage_skipped",
            ExecutionEvent::ParallelStarted { .. } => "parallel_started",
            ExecutionEvent::ParallelCompleted { .. } => "parallel_completed",
            ExecutionEvent::ConditionEvaluated { .. } => "condition_evaluated",
            ExecutionEvent::WorkflowCompleted { .. } => "workflow_completed",
        })
        .collect();

    assert_eq!(
        kinds,
        vec![
            "workflow_started",
            "stage_started",
            "stage_completed",
            "condition_evaluated",
            "stage_skipped",
            "workflow_completed",
        ]
    );

    match events.last() {
        Some(ExecutionEvent::WorkflowCompleted {
            execution_id,
            status,
        }) => {
            assert_eq!(*execution_id, run.execution_id);
            assert_eq!(*status, ExecutionStatus::Completed);
        }
        other => panic!("expected WorkflowCompleted, got {:?}", other),
    }
}

//! Test: Parallel Join - concurrent members merged in declaration order

use crate::helpers::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use workflow::{
    ConditionalGroup, ExecutionEvent, OutputCondition, ParallelGroup, Workflow, WorkflowRunner,
};

/// Every member is invoked, and they overlap in time
#[tokio::test]
async fn test_parallel_members_run_concurrently() {
    let probe = ConcurrencyProbe::new();
    let delay = Duration::from_millis(50);
    let oven = MockStage::new("Forno ok")
        .with_delay(delay)
        .with_probe(&probe)
        .into_arc();
    let quality = MockStage::new("Qualidade ok")
        .with_delay(delay)
        .with_probe(&probe)
        .into_arc();
    let stock = MockStage::new("Estoque ok")
        .with_delay(delay)
        .with_probe(&probe)
        .into_arc();

    let workflow = Workflow::new("w").then(ParallelGroup::new(
        "monitoramento_paralelo",
        vec![
            stage("monitorar_forno", &oven),
            stage("controle_qualidade", &quality),
            stage("estoque", &stock),
        ],
    ));

    let run = WorkflowRunner::new().run(&workflow, "m").await.unwrap();

    assert_workflow_completed(&run);
    assert_invoked(&oven, "monitorar_forno", 1);
    assert_invoked(&quality, "controle_qualidade", 1);
    assert_invoked(&stock, "estoque", 1);
    assert_eq!(probe.max_in_flight(), 3, "All members should be in flight together");
}

/// The merged output follows declaration order, not completion order
#[tokio::test]
async fn test_merge_uses_declaration_order() {
    let slow = MockStage::new("Forno: 1000C\n")
        .with_delay(Duration::from_millis(60))
        .into_arc();
    let fast = MockStage::new("Lote aprovado").into_arc();
    let next = MockStage::new("Relatório").into_arc();

    let workflow = Workflow::new("w")
        .then(ParallelGroup::new(
            "monitoramento_paralelo",
            vec![
                stage("monitorar_forno", &slow),
                stage("controle_qualidade", &fast),
            ],
        ))
        .then(stage("relatorio", &next));

    let run = WorkflowRunner::new().run(&workflow, "m").await.unwrap();

    assert_execution_order(&run, &["monitorar_forno", "controle_qualidade", "relatorio"]);
    assert_eq!(
        next.last_previous_text().as_deref(),
        Some("## monitorar_forno\nForno: 1000C\n\n## controle_qualidade\nLote aprovado")
    );

    let merged = next.inputs()[0].previous_content.clone().unwrap();
    assert_eq!(
        merged.structured,
        Some(json!({
            "monitorar_forno": "Forno: 1000C\n",
            "controle_qualidade": "Lote aprovado",
        }))
    );
}

/// Members all receive the same input, and their outputs stay addressable
#[tokio::test]
async fn test_members_share_the_incoming_input() {
    let intake = MockStage::new("Lote L001 recebido").into_arc();
    let oven = MockStage::structured("Forno ok", json!({ "temperatura": 1000 })).into_arc();
    let quality = MockStage::new("Qualidade ok").into_arc();
    let next = MockStage::new("fim").into_arc();

    let workflow = Workflow::new("w")
        .then(stage("receber_lote", &intake))
        .then(ParallelGroup::new(
            "monitoramento_paralelo",
            vec![stage("monitorar_forno", &oven), stage("controle_qualidade", &quality)],
        ))
        .then(stage("fechar", &next));

    WorkflowRunner::new().run(&workflow, "m").await.unwrap();

    for mock in [&oven, &quality] {
        let inputs = mock.inputs();
        let input = &inputs[0];
        assert_eq!(input.previous_text(), Some("Lote L001 recebido"));
        assert!(input.get_output("monitorar_forno").is_none());
        assert!(input.get_output("controle_qualidade").is_none());
    }

    let inputs = next.inputs();
    let after = &inputs[0];
    assert_eq!(after.get_output("controle_qualidade").unwrap().text, "Qualidade ok");
    assert_eq!(
        after.previous_content.as_ref().unwrap().field("/monitorar_forno/temperatura"),
        Some(&json!(1000))
    );
}

/// A condition after a parallel group evaluates the merged output
#[tokio::test]
async fn test_condition_sees_merged_parallel_output() {
    let oven = MockStage::new("Temperatura 1200C - alerta").into_arc();
    let quality = MockStage::new("Lote aprovado").into_arc();
    let maintenance = MockStage::new("Manutenção executada").into_arc();

    let workflow = Workflow::new("w")
        .then(ParallelGroup::new(
            "monitoramento_paralelo",
            vec![stage("monitorar_forno", &oven), stage("controle_qualidade", &quality)],
        ))
        .then(ConditionalGroup::new(
            "verificar_manutencao",
            Arc::new(OutputCondition::contains_any(["alerta", "problema"], true)),
            vec![stage("executar_manutencao", &maintenance).into()],
        ));

    let run = WorkflowRunner::new().run(&workflow, "m").await.unwrap();

    assert_workflow_completed(&run);
    assert_invoked(&maintenance, "executar_manutencao", 1);
    let previous = maintenance.last_previous_text().unwrap();
    assert!(previous.contains("## monitorar_forno"));
    assert!(previous.contains("## controle_qualidade"));
}

/// Group events bracket the member events
#[tokio::test]
async fn test_parallel_events() {
    let a = MockStage::new("a").into_arc();
    let b = MockStage::new("b").into_arc();
    let workflow = Workflow::new("w").then(ParallelGroup::new(
        "grupo",
        vec![stage("a", &a), stage("b", &b)],
    ));

    let events = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut runner = WorkflowRunner::new();
    {
        let events = events.clone();
        runner.add_event_handler(move |event| events.lock().unwrap().push(event));
    }
    runner.run(&workflow, "m").await.unwrap();

    let events = events.lock().unwrap();
    let started = events
        .iter()
        .position(|e| matches!(e, ExecutionEvent::ParallelStarted { .. }))
        .unwrap();
    let joined = events
        .iter()
        .position(|e| matches!(e, ExecutionEvent::ParallelCompleted { .. }))
        .unwrap();
    let member_events: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| {
            matches!(
                e,
                ExecutionEvent::StageStarted { .. } | ExecutionEvent::StageCompleted { .. }
            )
        })
        .map(|(i, _)| i)
        .collect();

    assert_eq!(member_events.len(), 4);
    assert!(member_events.iter().all(|&i| i > started && i < joined));

    match &events[started] {
        ExecutionEvent::ParallelStarted { group, stages } => {
            assert_eq!(group, "grupo");
            assert_eq!(stages, &vec!["a".to_string(), "b".to_string()]);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

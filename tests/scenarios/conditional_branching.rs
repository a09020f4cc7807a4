//! Test: Conditional Branching - groups gated by the previous output

use crate::helpers::*;
use serde_json::json;
use std::sync::Arc;
use workflow::{
    ConditionalGroup, FnCondition, OutputCondition, Workflow, WorkflowItem, WorkflowRunner,
};

fn gate(name: &str, condition: OutputCondition, items: Vec<WorkflowItem>) -> ConditionalGroup {
    ConditionalGroup::new(name, Arc::new(condition), items)
}

/// A false condition skips every nested stage without invoking it
#[tokio::test]
async fn test_false_condition_never_invokes_nested_stages() {
    let monitor = MockStage::new("Temperatura 1000C, pressão normal").into_arc();
    let maintenance = MockStage::new("Manutenção executada").into_arc();
    let report = MockStage::new("Relatório emitido").into_arc();

    let workflow = Workflow::new("industrial")
        .then(stage("monitorar_forno", &monitor))
        .then(gate(
            "verificar_manutencao",
            OutputCondition::contains_any(["alerta", "problema"], true),
            vec![stage("executar_manutencao", &maintenance).into()],
        ))
        .then(stage("relatorio", &report));

    let run = WorkflowRunner::new()
        .run(&workflow, "Iniciar ciclo")
        .await
        .unwrap();

    assert_workflow_completed(&run);
    assert_execution_order(&run, &["monitorar_forno", "relatorio"]);
    assert_skipped(&run, &["executar_manutencao"]);
    assert_invoked(&maintenance, "executar_manutencao", 0);

    assert_eq!(run.conditions.len(), 1);
    assert!(!run.conditions[0].result);
    assert!(run.conditions[0].error.is_none());

    // A skipped group leaves the previous output untouched
    assert_eq!(
        report.last_previous_text().as_deref(),
        Some("Temperatura 1000C, pressão normal")
    );
}

/// A true condition runs each nested stage exactly once, in order
#[tokio::test]
async fn test_true_condition_runs_nested_stages_in_order() {
    let monitor = MockStage::new("ALERTA: temperatura acima do limite").into_arc();
    let adjust = MockStage::new("Ajuste aplicado").into_arc();
    let verify = MockStage::new("Ajuste verificado").into_arc();

    let workflow = Workflow::new("industrial")
        .then(stage("monitorar_forno", &monitor))
        .then(gate(
            "verificar_manutencao",
            OutputCondition::contains_any(["alerta", "problema"], true),
            vec![
                stage("ajustar", &adjust).into(),
                stage("verificar_ajuste", &verify).into(),
            ],
        ));

    let run = WorkflowRunner::new()
        .run(&workflow, "Iniciar ciclo")
        .await
        .unwrap();

    assert_workflow_completed(&run);
    assert_execution_order(&run, &["monitorar_forno", "ajustar", "verificar_ajuste"]);
    assert_skipped(&run, &[]);
    assert_invoked(&adjust, "ajustar", 1);
    assert_invoked(&verify, "verificar_ajuste", 1);

    // Nested stages thread output like top-level ones
    assert_eq!(
        adjust.last_previous_text().as_deref(),
        Some("ALERTA: temperatura acima do limite")
    );
    assert_eq!(verify.last_previous_text().as_deref(), Some("Ajuste aplicado"));

    let gated: Vec<Option<&str>> = run.records.iter().map(|r| r.group.as_deref()).collect();
    assert_eq!(
        gated,
        vec![None, Some("verificar_manutencao"), Some("verificar_manutencao")]
    );
}

/// The condition only sees the output immediately before the group
#[tokio::test]
async fn test_condition_reads_immediately_preceding_output() {
    let first = MockStage::new("alerta no forno").into_arc();
    let second = MockStage::new("tudo normal").into_arc();
    let gated = MockStage::new("manutenção").into_arc();

    let workflow = Workflow::new("w")
        .then(stage("primeiro", &first))
        .then(stage("segundo", &second))
        .then(gate(
            "verificar",
            OutputCondition::contains_any(["alerta"], true),
            vec![stage("manutencao", &gated).into()],
        ));

    let run = WorkflowRunner::new().run(&workflow, "m").await.unwrap();

    assert_skipped(&run, &["manutencao"]);
    assert_invoked(&gated, "manutencao", 0);
}

/// Branching on a structured field picks exactly one path
#[tokio::test]
async fn test_branch_on_structured_output() {
    let inspect = MockStage::structured(
        "Inspeção concluída",
        json!({ "lote": "L001", "qualidade": { "status": "reprovado" } }),
    )
    .into_arc();
    let ship = MockStage::new("Expedido").into_arc();
    let rework = MockStage::new("Reprocessado").into_arc();

    let workflow = Workflow::new("qualidade")
        .then(stage("inspecionar", &inspect))
        .then(gate(
            "aprovado",
            OutputCondition::field_equals("qualidade.status", json!("aprovado")),
            vec![stage("expedir", &ship).into()],
        ))
        .then(gate(
            "reprovado",
            OutputCondition::field_equals("qualidade.status", json!("aprovado")).negated(),
            vec![stage("reprocessar", &rework).into()],
        ));

    let run = WorkflowRunner::new().run(&workflow, "m").await.unwrap();

    assert_workflow_completed(&run);
    assert_execution_order(&run, &["inspecionar", "reprocessar"]);
    assert_skipped(&run, &["expedir"]);
    assert_invoked(&ship, "expedir", 0);
    assert_invoked(&rework, "reprocessar", 1);
    assert_output(&run, "reprocessar", "Reprocessado");
}

/// Conditional groups nest, and an inner false condition only skips its own stages
#[tokio::test]
async fn test_nested_conditional_groups() {
    let monitor = MockStage::new("alerta: pressão alta").into_arc();
    let diagnose = MockStage::new("Diagnóstico: válvula ok").into_arc();
    let replace = MockStage::new("Válvula substituída").into_arc();
    let close = MockStage::new("Ordem encerrada").into_arc();

    let inner = gate(
        "valvula_defeituosa",
        OutputCondition::contains_any(["defeito"], true),
        vec![stage("substituir_valvula", &replace).into()],
    );
    let outer = gate(
        "verificar_manutencao",
        OutputCondition::contains_any(["alerta"], true),
        vec![
            stage("diagnosticar", &diagnose).into(),
            inner.into(),
            stage("encerrar_ordem", &close).into(),
        ],
    );

    let workflow = Workflow::new("w")
        .then(stage("monitorar", &monitor))
        .then(outer);

    let run = WorkflowRunner::new().run(&workflow, "m").await.unwrap();

    assert_workflow_completed(&run);
    assert_execution_order(&run, &["monitorar", "diagnosticar", "encerrar_ordem"]);
    assert_skipped(&run, &["substituir_valvula"]);
    assert_eq!(run.conditions.len(), 2);
    assert_eq!(run.conditions[0].condition, "verificar_manutencao");
    assert!(run.conditions[0].result);
    assert_eq!(run.conditions[1].condition, "valvula_defeituosa");
    assert!(!run.conditions[1].result);

    // The stage after the skipped inner group still sees the diagnosis
    assert_eq!(
        close.last_previous_text().as_deref(),
        Some("Diagnóstico: válvula ok")
    );
}

/// Closures work as predicates and see every earlier output
#[tokio::test]
async fn test_fn_condition_over_earlier_outputs() {
    let oven = MockStage::new("1200C").into_arc();
    let quality = MockStage::new("Lote aprovado").into_arc();
    let cool = MockStage::new("Resfriamento iniciado").into_arc();

    let too_hot = FnCondition::new("forno acima de 1150C", |input| {
        Ok(input
            .get_output("monitorar_forno")
            .and_then(|c| c.text.trim_end_matches('C').parse::<u32>().ok())
            .map(|t| t > 1150)
            .unwrap_or(false))
    });

    let workflow = Workflow::new("w")
        .then(stage("monitorar_forno", &oven))
        .then(stage("controle_qualidade", &quality))
        .then(ConditionalGroup::new(
            "resfriar",
            Arc::new(too_hot),
            vec![stage("resfriar_forno", &cool).into()],
        ));

    let run = WorkflowRunner::new().run(&workflow, "m").await.unwrap();

    assert_execution_order(
        &run,
        &["monitorar_forno", "controle_qualidade", "resfriar_forno"],
    );
    assert_invoked(&cool, "resfriar_forno", 1);
}

/// Running the same workflow twice gives the same decisions and outputs
#[tokio::test]
async fn test_repeated_runs_are_idempotent() {
    let monitor = MockStage::new("alerta de temperatura").into_arc();
    let maintenance = MockStage::new("Manutenção executada").into_arc();
    let rework = MockStage::new("Reprocessado").into_arc();

    let workflow = Workflow::new("w")
        .then(stage("monitorar", &monitor))
        .then(gate(
            "verificar_manutencao",
            OutputCondition::contains_any(["alerta"], true),
            vec![stage("manutencao", &maintenance).into()],
        ))
        .then(gate(
            "verificar_reprocessamento",
            OutputCondition::contains_any(["reprovado"], true),
            vec![stage("reprocessar", &rework).into()],
        ));

    let runner = WorkflowRunner::new();
    let first = runner.run(&workflow, "m").await.unwrap();
    let second = runner.run(&workflow, "m").await.unwrap();

    assert_ne!(first.execution_id, second.execution_id);
    assert_eq!(first.execution_order(), second.execution_order());
    assert_eq!(first.skipped_stages, second.skipped_stages);
    assert_eq!(first.report(), second.report());
    assert_invoked(&maintenance, "manutencao", 2);
    assert_invoked(&rework, "reprocessar", 0);
}

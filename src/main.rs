use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;
use workflow::cli::commands::{HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use workflow::cli::output::*;
use workflow::cli::terminal_output::TerminalOutput;
use workflow::cli::{Cli, Command};
use workflow::core::config::{CommandAgentProvider, WorkflowConfig};
use workflow::core::{ExecutionStatus, WorkflowRun};
use workflow::execution::WorkflowRunner;
use workflow::persistence::{
    save_run, ExecutionSummary, PersistenceBackend, SqliteExecutionStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // RUST_LOG takes precedence over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    match &cli.command {
        Command::Run(cmd) => run_workflow(cmd, &cli).await?,
        Command::Validate(cmd) => validate_workflow(cmd)?,
        Command::List(cmd) => list_workflows(cmd, &cli).await?,
        Command::History(cmd) => show_history(cmd, &cli).await?,
    }

    Ok(())
}

async fn open_store(cli: &Cli) -> Result<SqliteExecutionStore> {
    match &cli.db {
        Some(path) => SqliteExecutionStore::open(path).await,
        None => SqliteExecutionStore::with_default_path().await,
    }
    .context("Failed to open history database")
}

async fn run_workflow(cmd: &RunCommand, cli: &Cli) -> Result<()> {
    let mut config =
        WorkflowConfig::from_file(&cmd.file).context("Failed to load workflow config")?;

    println!("{} Loaded workflow: {}", INFO, style(&config.name).bold());

    for (key, value) in &cmd.variable {
        config.set_variable(key, value);
        println!(
            "{} Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let workflow = config
        .build(&CommandAgentProvider::default())
        .context("Failed to build workflow")?;

    let store = if cmd.no_history {
        None
    } else {
        Some(open_store(cli).await?)
    };

    let message = cmd
        .message
        .clone()
        .or_else(|| workflow.description.clone())
        .unwrap_or_else(|| workflow.name.clone());

    let terminal = Arc::new(TerminalOutput::new(workflow.stage_count(), cli.stream));
    let mut runner = WorkflowRunner::new().with_streaming(cli.stream);
    {
        let terminal = terminal.clone();
        runner.add_event_handler(move |event| terminal.on_event(&event));
    }

    println!();
    let mut run = WorkflowRun::new(&workflow.name, message, workflow.stage_count());
    let result = runner.execute(&workflow, &mut run).await;
    terminal.finish();

    if !run.records.is_empty() {
        terminal.print_report(&run);
    }

    if let Some(store) = &store {
        save_run(store, &run).await?;
        println!(
            "\n{} Execution saved to history (ID: {})",
            INFO,
            style(&run.execution_id.to_string()[..8]).dim()
        );
    }

    match result {
        Ok(()) => {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(&workflow.name).bold(),
                style("successfully").green()
            );
            Ok(())
        }
        Err(e) => {
            println!(
                "\n{} {} {}",
                CROSS,
                style(&workflow.name).bold(),
                style("failed").red()
            );
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn validate_workflow(cmd: &ValidateCommand) -> Result<()> {
    if !cmd.json {
        println!("{} Validating workflow...", INFO);
    }

    match WorkflowConfig::from_file(&cmd.file) {
        Ok(config) => {
            let stages = config.stage_names();
            if cmd.json {
                let data = serde_json::json!({
                    "valid": true,
                    "name": config.name,
                    "stages": stages,
                    "config": config,
                });
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                println!("{} Workflow configuration is valid!", CHECK);
                println!("  Name: {}", style(&config.name).bold());
                println!("  Items: {}", style(config.steps.len()).cyan());
                println!("  Stages: {}", style(stages.join(", ")).cyan());
                println!("  Agents: {}", style(config.agents.len()).cyan());
            }
            Ok(())
        }
        Err(e) => {
            if cmd.json {
                let data = serde_json::json!({ "valid": false, "error": format!("{:#}", e) });
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                println!("{} Validation failed:", CROSS);
                println!("  {}", style(format!("{:#}", e)).red());
            }
            std::process::exit(1);
        }
    }
}

async fn list_workflows(cmd: &ListCommand, cli: &Cli) -> Result<()> {
    let store = open_store(cli).await?;
    let workflows = store.list_workflows().await?;

    if cmd.json {
        let mut json_data = Vec::new();
        for name in &workflows {
            let executions = store.list_executions(name).await?;
            json_data.push(serde_json::json!({
                "name": name,
                "execution_count": executions.len(),
            }));
        }
        let data = serde_json::json!({ "workflows": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if workflows.is_empty() {
        println!("{} No workflows found in history", INFO);
        return Ok(());
    }

    println!("{} Workflows in history:", INFO);

    for name in &workflows {
        if cmd.with_counts {
            let executions = store.list_executions(name).await?;
            let completed = executions
                .iter()
                .filter(|e| e.status == ExecutionStatus::Completed)
                .count();
            let failed = executions
                .iter()
                .filter(|e| e.status == ExecutionStatus::Failed)
                .count();
            println!(
                "  {} ({} runs: {} succeeded, {} failed)",
                style(name).bold(),
                style(executions.len()).cyan(),
                style(completed).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(name).bold());
        }
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand, cli: &Cli) -> Result<()> {
    let store = open_store(cli).await?;

    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id =
            uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;

        match store.load_execution(exec_id).await? {
            Some(summary) => print_execution_details(&store, &summary, cli.verbose, cmd.json).await?,
            None => println!("{} Execution not found", WARN),
        }
        return Ok(());
    }

    let mut executions = match &cmd.workflow {
        Some(name) => store.list_executions(name).await?,
        None => {
            let mut all = Vec::new();
            for name in store.list_workflows().await? {
                all.extend(store.list_executions(&name).await?);
            }
            all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all
        }
    };
    executions.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!("{} No executions found", INFO);
        return Ok(());
    }

    println!("{} Execution history (showing latest {}):", INFO, executions.len());
    for summary in &executions {
        println!("  {}", format_execution_summary(summary));
        if cli.verbose {
            println!("      {}", style(&summary.message).dim());
        }
    }

    Ok(())
}

async fn print_execution_details(
    store: &dyn PersistenceBackend,
    summary: &ExecutionSummary,
    verbose: bool,
    json: bool,
) -> Result<()> {
    let stages = store.load_stage_records(summary.execution_id).await?;

    if json {
        let data = serde_json::json!({ "execution": summary, "stages": stages });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{} Execution Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Workflow: {}", style(&summary.workflow_name).bold());
    println!("  Message: {}", summary.message);
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Progress: {} ({}/{} completed, {} failed, {} skipped)",
        style(format!("{:.0}%", summary.progress * 100.0)).cyan(),
        summary.completed_stages,
        summary.total_stages,
        summary.failed_stages,
        summary.skipped_stages
    );

    if !stages.is_empty() {
        println!("\n  {}", style("Stages:").bold());
        for row in &stages {
            println!("    {}", format_stage_row(row));
            if verbose {
                if let Some(output) = &row.output {
                    for line in format_output(output, 20).lines() {
                        println!("        {}", line);
                    }
                }
            }
        }
    }

    Ok(())
}

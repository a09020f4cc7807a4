//! CLI output formatting

use crate::{
    core::ExecutionStatus,
    execution::ExecutionEvent,
    persistence::{ExecutionSummary, StageRecordRow, StageRowStatus},
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static FORK: Emoji<'_, '_> = Emoji("🔀 ", "* ");

/// Create a progress bar over the declared stages
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format execution summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Pending => INFO,
    };

    let mut line = format!(
        "{} {} - {} - {} ({}/{} stages",
        status_icon,
        style(short_id(&summary.execution_id)).dim(),
        style(&summary.workflow_name).bold(),
        format_status(summary.status),
        summary.completed_stages,
        summary.total_stages,
    );
    if summary.skipped_stages > 0 {
        line.push_str(&format!(", {} skipped", summary.skipped_stages));
    }
    line.push_str(&format!(
        ") - {}",
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    ));
    line
}

/// Format one stored stage record
pub fn format_stage_row(row: &StageRecordRow) -> String {
    let (icon, status) = match row.status {
        StageRowStatus::Completed => (CHECK, style("completed").green().to_string()),
        StageRowStatus::Failed => (CROSS, style("failed").red().to_string()),
        StageRowStatus::Skipped => (SKIP, style("skipped").dim().to_string()),
    };
    let group = row
        .group
        .as_deref()
        .map(|g| format!(" [{}]", style(g).dim()))
        .unwrap_or_default();

    let mut line = format!("{}{}{} - {}", icon, style(&row.stage).bold(), group, status);
    if let Some(error) = &row.error {
        line.push_str(&format!(": {}", style(error).red()));
    }
    line
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::WorkflowStarted {
            execution_id,
            workflow_name,
        } => format!(
            "{} Starting workflow {} ({})",
            ROCKET,
            style(workflow_name).bold(),
            style(short_id(execution_id)).dim()
        ),
        ExecutionEvent::StageStarted { stage, group } => match group {
            Some(group) => format!(
                "{} {} {}",
                SPINNER,
                style(stage).cyan(),
                style(format!("({})", group)).dim()
            ),
            None => format!("{} {}", SPINNER, style(stage).cyan()),
        },
        ExecutionEvent::StageChunk { delta, .. } => delta.clone(),
        ExecutionEvent::StageCompleted { stage, content } => {
            let preview = content.text.lines().next().unwrap_or("").trim();
            if preview.is_empty() {
                format!("{} {}", CHECK, style(stage).green())
            } else {
                format!(
                    "{} {}: {}",
                    CHECK,
                    style(stage).green(),
                    style(truncate(preview, 80)).dim()
                )
            }
        }
        ExecutionEvent::StageFailed { stage, error } => {
            format!("{} {}: {}", CROSS, style(stage).red(), style(error).dim())
        }
        ExecutionEvent::StageSkipped { stage, condition } => format!(
            "{} {} {}",
            SKIP,
            style(stage).dim(),
            style(format!("(skipped by {})", condition)).dim()
        ),
        ExecutionEvent::ParallelStarted { group, stages } => format!(
            "{} {} running {} stages in parallel: {}",
            FORK,
            style(group).bold(),
            stages.len(),
            stages.join(", ")
        ),
        ExecutionEvent::ParallelCompleted { group } => {
            format!("{} {} joined", INFO, style(group).bold())
        }
        ExecutionEvent::ConditionEvaluated {
            condition,
            result,
            error,
        } => match error {
            Some(error) => format!(
                "{} {} could not be evaluated ({}), treated as {}",
                WARN,
                style(condition).yellow(),
                style(error).dim(),
                result
            ),
            None => {
                let result = if *result {
                    style("true").green()
                } else {
                    style("false").dim()
                };
                format!("{} {} → {}", INFO, style(condition).bold(), result)
            }
        },
        ExecutionEvent::WorkflowCompleted {
            execution_id,
            status,
        } => {
            let status_str = match status {
                ExecutionStatus::Completed => {
                    format!("{} completed", style("successfully").green())
                }
                ExecutionStatus::Failed => style("failed").red().to_string(),
                other => format!("{:?}", other),
            };
            format!(
                "{} Workflow ({}) {}",
                INFO,
                style(short_id(execution_id)).dim(),
                status_str
            )
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}

/// Format stage output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

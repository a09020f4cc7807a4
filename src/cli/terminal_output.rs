//! Terminal rendering of a running workflow
//!
//! `TerminalOutput` receives every [`ExecutionEvent`] of a run. Without
//! streaming it prints one line per event above a progress bar. With
//! streaming it prints a `[N/M] stage` header per stage and the agent's
//! output as it arrives, each line prefixed by its stage so parallel
//! members stay readable.

use crate::cli::output::{create_progress_bar, format_execution_event, INFO, SKIP};
use crate::core::WorkflowRun;
use crate::execution::ExecutionEvent;
use console::style;
use indicatif::ProgressBar;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Event handler that renders a run to the terminal
pub struct TerminalOutput {
    stream: bool,
    total_stages: usize,
    started: AtomicUsize,
    progress: ProgressBar,
}

impl TerminalOutput {
    /// Create terminal output for a run of `total_stages` stages
    ///
    /// The progress bar is only drawn when not streaming.
    pub fn new(total_stages: usize, stream: bool) -> Self {
        let progress = if stream {
            ProgressBar::hidden()
        } else {
            create_progress_bar(total_stages)
        };
        Self::with_progress(total_stages, stream, progress)
    }

    pub fn with_progress(total_stages: usize, stream: bool, progress: ProgressBar) -> Self {
        Self {
            stream,
            total_stages,
            started: AtomicUsize::new(0),
            progress,
        }
    }

    fn println(&self, line: &str) {
        if self.progress.is_hidden() {
            println!("{}", line);
        } else {
            self.progress.println(line);
        }
    }

    /// Flush stdout to ensure immediate display
    fn flush_stdout(&self) {
        let _ = io::stdout().flush();
    }

    pub fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::StageStarted { stage, .. } => {
                let number = self.started.fetch_add(1, Ordering::SeqCst) + 1;
                if self.stream {
                    self.println(&stage_header(number, self.total_stages, stage));
                } else {
                    self.progress.set_message(stage.clone());
                    self.println(&format_execution_event(event));
                }
            }
            ExecutionEvent::StageChunk { stage, delta } => {
                if self.stream {
                    for line in delta.lines() {
                        println!("{} {}", style(format!("[{}]", stage)).dim(), line);
                    }
                    self.flush_stdout();
                }
            }
            ExecutionEvent::StageCompleted { .. }
            | ExecutionEvent::StageFailed { .. }
            | ExecutionEvent::StageSkipped { .. } => {
                self.progress.inc(1);
                self.println(&format_execution_event(event));
            }
            _ => self.println(&format_execution_event(event)),
        }
    }

    /// Number of stages finished or skipped so far
    pub fn position(&self) -> u64 {
        self.progress.position()
    }

    pub fn finish(&self) {
        self.progress.finish_and_clear();
    }

    /// Print a separator line spanning the terminal width
    pub fn print_separator(&self) {
        let width = term_size::dimensions_stdout()
            .map(|(w, _)| w)
            .unwrap_or(80);
        println!("{}", "─".repeat(width));
    }

    /// Print the concatenated stage outputs of a run
    pub fn print_report(&self, run: &WorkflowRun) {
        println!();
        self.print_separator();
        println!("{} {}", INFO, style("Cycle report").bold());
        self.print_separator();

        let report = run.report();
        if report.is_empty() {
            println!("{}", style("(no stage output)").dim());
        } else {
            println!("{}", report);
        }

        if !run.skipped_stages.is_empty() {
            println!();
            println!(
                "{} Skipped: {}",
                SKIP,
                style(run.skipped_stages.join(", ")).dim()
            );
        }
        self.print_separator();
    }
}

/// Header shown before a streamed stage, e.g. `[2/4] controle_qualidade`
pub fn stage_header(number: usize, total: usize, stage: &str) -> String {
    format!(
        "\n[{}/{}] {}",
        style(number).cyan(),
        style(total).dim(),
        style(stage).bold()
    )
}

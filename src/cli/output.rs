//! CLI output formatting

use crate::{
    core::{ExecutionStatus, JobResult, JobStatus, StepStatus},
    execution::ExecutionEvent,
    persistence::RunSummary,
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

/// Create a progress bar over jobs
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} jobs {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a pipeline status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::NotTriggered => style("NOT TRIGGERED").dim().to_string(),
    }
}

pub fn format_job_status(status: JobStatus) -> String {
    match status {
        JobStatus::Pending => style("PENDING").dim().to_string(),
        JobStatus::Running => style("RUNNING").yellow().to_string(),
        JobStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        JobStatus::Failed => style("FAILED").red().to_string(),
        JobStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

pub fn format_step_status(status: StepStatus) -> String {
    match status {
        StepStatus::Succeeded => style("ok").green().to_string(),
        StepStatus::Failed => style("failed").red().to_string(),
        StepStatus::Skipped => style("skipped").dim().to_string(),
        StepStatus::Cancelled => style("cancelled").yellow().to_string(),
    }
}

/// Format a run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Succeeded => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        _ => INFO,
    };

    format!(
        "{} {} - {} - {} - {} @ {} ({}/{} jobs succeeded)",
        status_icon,
        style(short_id(&summary.run_id.to_string())).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.trigger_event,
        summary.trigger_ref,
        summary.succeeded_jobs,
        summary.total_jobs
    )
}

/// Format an execution event for display
///
/// Returns `None` for events too fine-grained for the default console view.
pub fn format_execution_event(event: &ExecutionEvent) -> Option<String> {
    let line = match event {
        ExecutionEvent::PipelineStarted {
            run_id,
            pipeline_name,
            total_jobs,
        } => format!(
            "{} Starting pipeline {} ({}) with {} jobs",
            ROCKET,
            style(pipeline_name).bold(),
            style(short_id(&run_id.to_string())).dim(),
            style(total_jobs).cyan()
        ),
        ExecutionEvent::JobStarted { job_id } => {
            format!("{} {}", SPINNER, style(job_id).cyan())
        }
        ExecutionEvent::StepStarted { .. } => return None,
        ExecutionEvent::StepRetrying {
            job_id,
            step_name,
            attempt,
            max_attempts,
        } => format!(
            "{} {} / {} (attempt {}/{})",
            WARN,
            style(job_id).dim(),
            style(step_name).yellow(),
            attempt,
            max_attempts
        ),
        ExecutionEvent::StepFinished {
            job_id,
            step_name,
            status,
            error,
        } => match status {
            StepStatus::Succeeded => return None,
            _ => format!(
                "{} {} / {}: {}{}",
                CROSS,
                style(job_id).dim(),
                style(step_name).red(),
                format_step_status(*status),
                error
                    .as_ref()
                    .map(|e| format!(" ({})", style(e).dim()))
                    .unwrap_or_default()
            ),
        },
        ExecutionEvent::JobFinished { job_id, status } => {
            let icon = if *status == JobStatus::Succeeded {
                CHECK
            } else {
                CROSS
            };
            format!("{} {} {}", icon, style(job_id).bold(), format_job_status(*status))
        }
        ExecutionEvent::JobsCancelled { reason } => format!(
            "{} Cancelling remaining jobs: {}",
            WARN,
            style(reason).yellow()
        ),
        ExecutionEvent::PipelineFinished { run_id, status } => format!(
            "{} Pipeline ({}) {}",
            INFO,
            style(short_id(&run_id.to_string())).dim(),
            format_status(*status)
        ),
    };
    Some(line)
}

/// Format one job's result with its per-step table
///
/// The failing step's captured output is included, truncated.
pub fn format_job_result(job: &JobResult, max_output_lines: usize) -> String {
    let mut lines = vec![format!(
        "{} {} ({})",
        style(&job.job_id).bold(),
        format_job_status(job.status),
        format_duration(Duration::from_millis(job.duration_ms()))
    )];

    if let Some(error) = &job.error {
        lines.push(format!("    {}", style(error).dim()));
    }

    for step in &job.steps {
        let icon = match step.status {
            StepStatus::Succeeded => CHECK,
            StepStatus::Failed => CROSS,
            StepStatus::Skipped => SKIP,
            StepStatus::Cancelled => WARN,
        };
        let mut line = format!(
            "    {}{} {}",
            icon,
            step.name,
            format_step_status(step.status)
        );
        if step.attempts > 1 {
            line.push_str(&format!(" after {} attempts", step.attempts));
        }
        lines.push(line);
    }

    if let Some(failed) = job.failed_step() {
        if let Some(error) = &failed.error {
            lines.push(format!("    {} {}", style("error:").red(), error));
        }
        for (label, output) in [("stdout", &failed.stdout), ("stderr", &failed.stderr)] {
            if !output.trim().is_empty() {
                lines.push(format!("    {}:", style(label).dim()));
                for line in format_output(output, max_output_lines).lines() {
                    lines.push(format!("      {}", line));
                }
            }
        }
    }

    lines.join("\n")
}

/// Format step output, keeping the last `max_lines` lines
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.trim_end().to_string()
    } else {
        let kept = lines[lines.len() - max_lines..].join("\n");
        format!(
            "{}... ({} earlier lines)\n{}",
            style("[truncated]").dim(),
            lines.len() - max_lines,
            kept
        )
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 1 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

//! CLI output formatting

use crate::{
    core::{ExecutionStatus, Job, StepState, TriggerDecision, Workflow},
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

/// Create a progress bar over the steps of a run
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(bar_style.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Horizontal rule as wide as the terminal
pub fn separator() -> String {
    let width = term_size::dimensions().map(|(w, _)| w).unwrap_or(80).min(120);
    style("─".repeat(width)).dim().to_string()
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { attempt, .. } => {
            style(format!("RUNNING (attempt {})", attempt)).yellow().to_string()
        }
        StepState::Completed { .. } => style("COMPLETED").green().to_string(),
        StepState::Degraded { .. } => style("DEGRADED").yellow().to_string(),
        StepState::Failed { .. } => style("FAILED").red().to_string(),
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format a run status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Ignored => style("IGNORED").dim().to_string(),
    }
}

/// Format a trigger decision for display
pub fn format_decision(decision: &TriggerDecision) -> String {
    match decision {
        TriggerDecision::Activated => format!("{} {}", CHECK, style("activated").green()),
        TriggerDecision::Ignored { reason } => {
            format!("{} {} ({})", SKIP, style("ignored").dim(), reason)
        }
    }
}

/// Format run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Ignored => SKIP,
        _ => INFO,
    };

    format!(
        "{} {} - {} - {} {} - {} ({}/{} jobs)",
        status_icon,
        style(short_id(&summary.run_id.to_string())).dim(),
        style(&summary.workflow_name).bold(),
        summary.event,
        style(&summary.git_ref).cyan(),
        format_status(summary.status),
        summary.completed_jobs,
        summary.total_jobs,
    )
}

/// Per-job step table printed after a run
pub fn format_job_report(job: &Job) -> String {
    let mut lines = vec![format!("{} {}", style("Job").bold(), style(&job.name).cyan())];
    for step in &job.steps {
        let detail = match &step.state {
            StepState::Degraded { reason, .. } | StepState::Skipped { reason } => {
                format!(" {}", style(format!("({})", reason)).dim())
            }
            StepState::Failed { error, .. } => format!(" {}", style(format!("({})", error)).red()),
            _ => String::new(),
        };
        lines.push(format!(
            "  {:>2}. {:<48} {}{}",
            step.index + 1,
            truncate(&step.name, 48),
            format_step_state(&step.state),
            detail
        ));
    }
    lines.join("\n")
}

/// Plan printed by `run --dry-run`
pub fn format_plan(workflow: &Workflow) -> String {
    let mut lines = Vec::new();
    for job_id in workflow.job_order() {
        let Some(job) = workflow.job(job_id) else {
            continue;
        };
        let needs = if job.needs.is_empty() {
            String::new()
        } else {
            format!(" (needs {})", job.needs.join(", "))
        };
        lines.push(format!(
            "{} {} on {}{}",
            ROCKET,
            style(&job.id).bold(),
            style(job.runner.join(", ")).cyan(),
            needs
        ));
        for step in &job.steps {
            lines.push(format!(
                "    {:>2}. [{}] {}",
                step.index + 1,
                style(step.kind.label()).dim(),
                step.name
            ));
        }
    }
    lines.join("\n")
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> Option<String> {
    let line = match event {
        ExecutionEvent::RunIgnored {
            workflow_name,
            reason,
            ..
        } => format!(
            "{} {} not triggered: {}",
            SKIP,
            style(workflow_name).bold(),
            reason
        ),
        ExecutionEvent::RunStarted {
            run_id,
            workflow_name,
            total_jobs,
        } => format!(
            "{} Starting {} ({}, {} job{})",
            ROCKET,
            style(workflow_name).bold(),
            style(short_id(&run_id.to_string())).dim(),
            total_jobs,
            if *total_jobs == 1 { "" } else { "s" }
        ),
        ExecutionEvent::JobStarted { job_id, runner, .. } => format!(
            "{}\n{} Job {} on {}",
            separator(),
            INFO,
            style(job_id).bold(),
            style(runner).cyan()
        ),
        ExecutionEvent::JobSkipped { job_id, reason } => {
            format!("{} Job {} skipped: {}", SKIP, style(job_id).dim(), reason)
        }
        ExecutionEvent::StepStarted {
            step_name, attempt, ..
        } => {
            if *attempt > 1 {
                format!("{} {} (attempt {})", SPINNER, style(step_name).cyan(), attempt)
            } else {
                format!("{} {}", SPINNER, style(step_name).cyan())
            }
        }
        ExecutionEvent::StepCompleted {
            step_name,
            duration_ms,
            ..
        } => format!(
            "{} {} {}",
            CHECK,
            style(step_name).green(),
            style(format_duration(Duration::from_millis(*duration_ms))).dim()
        ),
        ExecutionEvent::StepDegraded {
            step_name, reason, ..
        } => format!("{} {}: {}", WARN, style(step_name).yellow(), style(reason).dim()),
        ExecutionEvent::StepFailed {
            step_name, error, ..
        } => format!("{} {}: {}", CROSS, style(step_name).red(), style(error).dim()),
        ExecutionEvent::StepSkipped { step_name, .. } => {
            format!("{} {}", SKIP, style(step_name).dim())
        }
        ExecutionEvent::StepRetrying {
            step_name, reason, ..
        } => format!("{} {}: {}", WARN, style(step_name).yellow(), reason),
        ExecutionEvent::JobCompleted { job_id, status } => {
            format!("{} Job {} {}", INFO, style(job_id).bold(), format_status(*status))
        }
        // The caller prints its own final line
        ExecutionEvent::RunCompleted { .. } => return None,
    };
    Some(line)
}

/// Last `max_lines` lines of step output
pub fn format_output_tail(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.trim_end().to_string()
    } else {
        let tail = lines[lines.len() - max_lines..].join("\n");
        format!(
            "{}\n{}",
            style(format!("... ({} earlier lines)", lines.len() - max_lines)).dim(),
            tail
        )
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
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

fn truncate(text: &str, max: usize) -> String {
    let first = text.lines().next().unwrap_or_default();
    if first.chars().count() <= max {
        first.to_string()
    } else {
        let cut: String = first.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

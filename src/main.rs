use anyhow::{Context, Result};
use cirun::cache::CacheConfig;
use cirun::cli::commands::{HistoryCommand, ListCommand, RunCommand, TriggerCommand, ValidateCommand};
use cirun::cli::output::*;
use cirun::cli::{Cli, Command};
use cirun::core::config::WorkflowConfig;
use cirun::core::{ExecutionStatus, RepositoryEvent, TriggerDecision};
use cirun::execution::{ExecutionEngine, ExecutionEvent};
use cirun::persistence::{create_summary, PersistenceBackend, RunSummary};
use cirun::runner::LocalRunner;
use cirun::settings::RunnerSettings;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    match &cli.command {
        Command::Run(cmd) => run_workflow(cmd).await?,
        Command::Validate(cmd) => validate_workflow(cmd)?,
        Command::Trigger(cmd) => evaluate_trigger(cmd)?,
        Command::List(cmd) => list_workflows(cmd).await?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

/// Open the run history store
async fn open_store() -> Result<Box<dyn PersistenceBackend>> {
    #[cfg(feature = "sqlite")]
    {
        let store = cirun::persistence::SqliteRunStore::with_default_path()
            .await
            .context("Failed to open run history")?;
        Ok(Box::new(store))
    }
    #[cfg(not(feature = "sqlite"))]
    {
        Ok(Box::new(cirun::persistence::InMemoryPersistence::new()))
    }
}

fn event_for(kind: cirun::core::EventKind, git_ref: &str, sha: Option<&str>) -> RepositoryEvent {
    let event = RepositoryEvent::new(kind, git_ref);
    match sha {
        Some(sha) => event.with_sha(sha),
        None => event,
    }
}

fn settings_for(cmd: &RunCommand) -> Result<RunnerSettings> {
    let mut settings = RunnerSettings::from_env();

    if let Some(workdir) = &cmd.workdir {
        let workdir = workdir
            .canonicalize()
            .with_context(|| format!("Working directory {} not found", workdir.display()))?;
        settings = settings.with_workspace(workdir);
    }
    if cmd.isolated {
        settings = settings.isolated();
    }
    if let Some(shell) = &cmd.shell {
        settings = settings.with_shell(shell);
    }
    if !cmd.runner_labels.is_empty() {
        settings = settings.with_runner_labels(cmd.runner_labels.iter().cloned());
    }

    let mut cache = match &cmd.cache_wrapper {
        Some(wrapper) => CacheConfig::new(wrapper),
        None => settings.cache.clone(),
    };
    if cmd.no_cache {
        cache = cache.disabled();
    }
    settings = settings.with_cache(cache);

    for (key, value) in &cmd.env {
        settings = settings.with_env(key, value);
    }

    Ok(settings)
}

async fn run_workflow(cmd: &RunCommand) -> Result<()> {
    let config = WorkflowConfig::from_file(&cmd.file).context("Failed to load workflow")?;
    let mut workflow = config.to_workflow()?;
    let event = event_for(cmd.event, &cmd.git_ref, cmd.sha.as_deref());

    println!(
        "{} Loaded workflow: {} ({} {})",
        INFO,
        style(&workflow.name).bold(),
        event.kind,
        style(&event.git_ref).cyan()
    );

    if cmd.dry_run {
        let decision = workflow.triggers.evaluate(&event);
        println!("{} Trigger: {}", INFO, format_decision(&decision));
        if decision.is_activated() {
            println!("{}", format_plan(&workflow));
        }
        return Ok(());
    }

    let settings = settings_for(cmd)?;
    for (key, value) in &settings.extra_env {
        println!(
            "{} Env override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let runner = LocalRunner::from_settings(&settings);
    let engine = ExecutionEngine::new(runner, settings, cmd.strategy);

    let total_steps: usize = workflow.jobs.values().map(|j| j.steps.len()).sum();
    let progress = create_progress_bar(total_steps);
    let output_lines = cmd.output_lines;
    let handler_progress = progress.clone();
    engine.add_event_handler(move |event| {
        if let Some(line) = format_execution_event(&event) {
            handler_progress.suspend(|| println!("{}", line));
        }
        match &event {
            ExecutionEvent::StepFailed { output, .. } => {
                if !output.trim().is_empty() {
                    handler_progress
                        .suspend(|| println!("{}", format_output_tail(output, output_lines)));
                }
                handler_progress.inc(1);
            }
            ExecutionEvent::StepCompleted { .. }
            | ExecutionEvent::StepDegraded { .. }
            | ExecutionEvent::StepSkipped { .. } => handler_progress.inc(1),
            ExecutionEvent::StepStarted { step_name, .. } => {
                handler_progress.set_message(step_name.clone())
            }
            _ => {}
        }
    });

    println!();
    let result = engine.execute(&mut workflow, &event).await;
    progress.finish_and_clear();

    if workflow.state.status != ExecutionStatus::Ignored {
        println!("\n{}", separator());
        for job_id in workflow.job_order() {
            if let Some(job) = workflow.job(job_id) {
                println!("{}", format_job_report(job));
            }
        }
    }

    if !cmd.no_history {
        let summary = create_summary(&workflow, &event);
        let store = open_store().await?;
        store.save_run(&summary).await?;
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(summary.run_id.to_string().get(..8).unwrap_or_default()).dim()
        );
    }

    match result {
        Ok(ExecutionStatus::Completed) => {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(&workflow.name).bold(),
                style("successfully").green()
            );
        }
        Ok(ExecutionStatus::Ignored) => {
            println!(
                "\n{} {} was not triggered by this event",
                SKIP,
                style(&workflow.name).bold()
            );
        }
        Ok(status) => {
            println!(
                "\n{} {} {}",
                CROSS,
                style(&workflow.name).bold(),
                format_status(status)
            );
            std::process::exit(1);
        }
        Err(e) => {
            println!("\n{} {} {}", CROSS, style(&workflow.name).bold(), style("failed").red());
            error!("{:#}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn validate_workflow(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating workflow...", INFO);

    let result = WorkflowConfig::from_file(&cmd.file).and_then(|config| {
        let workflow = config.to_workflow()?;
        Ok((config, workflow))
    });

    match result {
        Ok((config, workflow)) => {
            println!("{} Workflow configuration is valid!", CHECK);
            println!("  Name: {}", style(&workflow.name).bold());
            println!("  Jobs: {}", style(workflow.jobs.len()).cyan());
            println!("  Steps: {}", style(config.step_count()).cyan());
            println!("  Order: {}", style(workflow.job_order().join(" -> ")).dim());
            println!("  Digest: {}", style(workflow.digest()).dim());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn evaluate_trigger(cmd: &TriggerCommand) -> Result<()> {
    let workflow = WorkflowConfig::from_file(&cmd.file)
        .context("Failed to load workflow")?
        .to_workflow()?;
    let event = RepositoryEvent::new(cmd.event, &cmd.git_ref);

    let decision = workflow.triggers.evaluate(&event);
    println!(
        "{} {} on {} {}: {}",
        INFO,
        style(&workflow.name).bold(),
        event.kind,
        style(&event.git_ref).cyan(),
        format_decision(&decision)
    );
    if let TriggerDecision::Activated = decision {
        println!("{}", format_plan(&workflow));
    }

    Ok(())
}

async fn list_workflows(cmd: &ListCommand) -> Result<()> {
    let store = open_store().await?;
    let workflows = store.list_workflows().await?;

    if workflows.is_empty() {
        println!("{} No workflows found in history", INFO);
        return Ok(());
    }

    if cmd.json {
        let mut json_data = Vec::new();
        for name in &workflows {
            let runs = store.list_runs(name).await?;
            json_data.push(serde_json::json!({
                "name": name,
                "run_count": runs.len(),
            }));
        }
        let data = serde_json::json!({ "workflows": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{} Workflows in history:", INFO);
    for name in &workflows {
        if cmd.with_counts {
            let runs = store.list_runs(name).await?;
            let count = |status: ExecutionStatus| runs.iter().filter(|r| r.status == status).count();
            println!(
                "  {} ({} runs: {} succeeded, {} failed, {} ignored)",
                style(name).bold(),
                style(runs.len()).cyan(),
                style(count(ExecutionStatus::Completed)).green(),
                style(count(ExecutionStatus::Failed)).red(),
                style(count(ExecutionStatus::Ignored)).dim()
            );
        } else {
            println!("  {}", style(name).bold());
        }
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_store().await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) => print_run_details(&summary, cmd.verbose || cmd.json)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let mut runs = match &cmd.workflow {
        Some(name) => store.list_runs(name).await?,
        None => {
            let mut all_runs = Vec::new();
            for name in store.list_workflows().await? {
                all_runs.extend(store.list_runs(&name).await?);
            }
            all_runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all_runs
        }
    };
    runs.truncate(cmd.limit);

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for summary in &runs {
        println!("  {}", format_run_summary(summary));
        if cmd.verbose {
            println!("      digest {}", style(&summary.workflow_digest).dim());
        }
    }

    Ok(())
}

fn print_run_details(summary: &RunSummary, verbose: bool) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Workflow: {}", style(&summary.workflow_name).bold());
    println!("  Event: {} {}", summary.event, style(&summary.git_ref).cyan());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Progress: {} ({}/{} jobs)",
        style(format!("{:.0}%", summary.progress * 100.0)).cyan(),
        summary.completed_jobs,
        summary.total_jobs
    );

    if verbose {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}

use anyhow::{Context, Result};
use matrixci::cli::commands::{
    ExpandCommand, HistoryCommand, ListCommand, RunCommand, ValidateCommand,
};
use matrixci::cli::output::*;
use matrixci::cli::{Cli, Command};
use matrixci::persistence::{
    open_history, record_run, InMemoryPersistence, PersistenceBackend, RunSummary,
};
use matrixci::{
    ExecutionEngine, ExecutionEvent, ExecutionStatus, Pipeline, PipelineConfig, SecretStore,
    ShellRunner, Trigger,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

const EXIT_FAILED: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;

/// Lines of captured output shown for a failing step
const FAILURE_OUTPUT_LINES: usize = 20;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    let outcome = match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await,
        Command::Validate(cmd) => validate_pipeline(cmd),
        Command::Expand(cmd) => expand_pipeline(cmd),
        Command::List(cmd) => list_pipelines(cmd).await,
        Command::History(cmd) => show_history(cmd).await,
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {}", CROSS, style(format!("{:#}", e)).red());
            ExitCode::from(EXIT_FAILED)
        }
    }
}

/// Load and validate a pipeline file
fn load_pipeline(file: &str) -> Result<(PipelineConfig, Pipeline)> {
    let config = PipelineConfig::from_file(file)
        .with_context(|| format!("Failed to load pipeline config {}", file))?;
    let pipeline = config.to_pipeline()?;
    Ok((config, pipeline))
}

fn report_config_error(e: &anyhow::Error) -> ExitCode {
    eprintln!("{} Invalid pipeline configuration:", CROSS);
    for cause in e.chain() {
        eprintln!("  {}", style(cause).red());
    }
    ExitCode::from(EXIT_CONFIG_ERROR)
}

async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    #[cfg(feature = "sqlite")]
    {
        let store = matrixci::persistence::SqliteRunStore::with_default_path().await?;
        Ok(Arc::new(store))
    }
    #[cfg(not(feature = "sqlite"))]
    {
        Ok(Arc::new(InMemoryPersistence::new()))
    }
}

async fn run_pipeline(cmd: &RunCommand) -> Result<ExitCode> {
    let pipeline = match load_pipeline(&cmd.file) {
        Ok((_, pipeline)) => pipeline,
        Err(e) => return Ok(report_config_error(&e)),
    };

    println!(
        "{} Loaded pipeline: {} ({} jobs x {} steps)",
        INFO,
        style(&pipeline.name).bold(),
        pipeline.job_count(),
        pipeline.steps.len()
    );

    let secrets = SecretStore::from_env(&pipeline.secret_names);
    let missing = secrets.missing();
    if !missing.is_empty() {
        println!(
            "{} Secrets not set: {} (steps that use them will fail)",
            WARN,
            style(missing.join(", ")).yellow()
        );
    }

    // History problems are logged, never fatal to the run
    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        open_history().await
    };

    let mut engine = ExecutionEngine::new(ShellRunner::default(), cmd.scheduling_strategy())
        .with_secrets(secrets)
        .with_fail_fast(cmd.fail_fast_override())
        .with_max_parallel(cmd.max_parallel_override())
        .with_keep_workspaces(cmd.keep_workspaces);
    if let Some(root) = &cmd.workspace {
        engine = engine.with_workspace_root(root);
    }

    // Console output goes through the progress bar so lines don't tear
    let progress = create_progress_bar(pipeline.job_count());
    let bar = progress.clone();
    engine.add_event_handler(move |event| {
        if let Some(line) = format_execution_event(event) {
            bar.println(line);
        }
        if let ExecutionEvent::JobFinished { .. } = event {
            bar.inc(1);
        }
    });

    let trigger = Trigger::new(&cmd.event, &cmd.source_ref);
    debug!("Running {} for {}", pipeline.name, trigger);
    let result = engine.execute(&pipeline, trigger).await;
    progress.finish_and_clear();

    if result.status == ExecutionStatus::NotTriggered {
        println!(
            "{} {} does not run on '{}' (listens on: {})",
            INFO,
            style(&pipeline.name).bold(),
            cmd.event,
            pipeline.events.join(", ")
        );
        return Ok(ExitCode::SUCCESS);
    }

    println!();
    for job in &result.jobs {
        println!("{}", format_job_result(job, FAILURE_OUTPUT_LINES));
    }

    // Save to history
    if !cmd.no_history {
        match record_run(store.as_ref(), &result).await {
            Some(summary) => println!(
                "\n{} Run saved to history (ID: {})",
                INFO,
                style(&summary.run_id.to_string()[..8]).dim()
            ),
            None => println!("\n{} Run could not be saved to history", WARN),
        }
    }

    println!(
        "\n{} jobs: {} succeeded, {} failed, {} cancelled ({})",
        INFO,
        style(result.succeeded_jobs().len()).green(),
        style(result.failed_jobs().len()).red(),
        style(result.cancelled_jobs().len()).yellow(),
        format_duration(
            (result.finished_at - result.started_at)
                .to_std()
                .unwrap_or_default()
        )
    );

    if result.succeeded() {
        println!(
            "{} {} completed {}",
            CHECK,
            style(&pipeline.name).bold(),
            style("successfully").green()
        );
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "{} {} {}",
            CROSS,
            style(&pipeline.name).bold(),
            style("failed").red()
        );
        Ok(ExitCode::from(EXIT_FAILED))
    }
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<ExitCode> {
    println!("{} Validating pipeline...", INFO);

    let (config, pipeline) = match load_pipeline(&cmd.file) {
        Ok(loaded) => loaded,
        Err(e) => return Ok(report_config_error(&e)),
    };

    println!("{} Pipeline configuration is valid!", CHECK);
    println!("  Name: {}", style(&pipeline.name).bold());
    println!("  Triggers: {}", style(pipeline.events.join(", ")).cyan());
    for dimension in pipeline.matrix.dimensions() {
        println!(
            "  Matrix {}: {}",
            style(&dimension.name).bold(),
            dimension.values.join(", ")
        );
    }
    println!("  Jobs: {}", style(pipeline.job_count()).cyan());
    println!("  Steps: {}", style(pipeline.steps.len()).cyan());
    for step in &pipeline.steps {
        println!("    {}. {} ({})", step.index + 1, step.name, style(step.describe()).dim());
    }
    if !pipeline.secret_names.is_empty() {
        let names: Vec<&str> = pipeline.secret_names.iter().map(String::as_str).collect();
        println!("  Secrets: {}", style(names.join(", ")).cyan());
    }

    if cmd.json {
        let json = serde_json::to_string_pretty(&config)?;
        println!("\n{}", json);
    }
    Ok(ExitCode::SUCCESS)
}

fn expand_pipeline(cmd: &ExpandCommand) -> Result<ExitCode> {
    let pipeline = match load_pipeline(&cmd.file) {
        Ok((_, pipeline)) => pipeline,
        Err(e) => return Ok(report_config_error(&e)),
    };
    let jobs = pipeline.expand();

    if cmd.json {
        let data: Vec<_> = jobs
            .iter()
            .map(|job| {
                let matrix: serde_json::Map<String, serde_json::Value> = job
                    .cell
                    .values()
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                    .collect();
                serde_json::json!({
                    "index": job.index,
                    "id": job.id,
                    "slug": job.slug(),
                    "matrix": matrix,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "jobs": data }))?);
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{} {} expands to {} jobs:",
        INFO,
        style(&pipeline.name).bold(),
        style(jobs.len()).cyan()
    );
    for job in &jobs {
        println!("  {:>3}. {}", job.index + 1, job.id);
    }
    Ok(ExitCode::SUCCESS)
}

async fn list_pipelines(cmd: &ListCommand) -> Result<ExitCode> {
    let store = open_store().await?;
    let pipelines = store.list_pipelines().await?;

    if pipelines.is_empty() {
        println!("{} No pipelines found in history", INFO);
        return Ok(ExitCode::SUCCESS);
    }

    if cmd.json {
        let mut json_data = Vec::new();
        for pipeline in &pipelines {
            let runs = store.list_runs(pipeline).await?;
            json_data.push(serde_json::json!({
                "name": pipeline,
                "run_count": runs.len()
            }));
        }
        let data = serde_json::json!({ "pipelines": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} Pipelines in history:", INFO);
    for pipeline_name in &pipelines {
        if cmd.with_counts {
            let runs = store.list_runs(pipeline_name).await?;
            let succeeded = runs
                .iter()
                .filter(|r| r.status == ExecutionStatus::Succeeded)
                .count();
            let failed = runs
                .iter()
                .filter(|r| r.status == ExecutionStatus::Failed)
                .count();
            println!(
                "  {} ({} runs: {} succeeded, {} failed)",
                style(pipeline_name).bold(),
                style(runs.len()).cyan(),
                style(succeeded).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(pipeline_name).bold());
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn show_history(cmd: &HistoryCommand) -> Result<ExitCode> {
    let store = open_store().await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) => print_run_details(&summary, cmd.json)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut runs = match &cmd.pipeline {
        Some(pipeline_name) => store.list_runs(pipeline_name).await?,
        None => {
            let mut all = Vec::new();
            for pipeline in store.list_pipelines().await? {
                all.extend(store.list_runs(&pipeline).await?);
            }
            all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all
        }
    };
    runs.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(ExitCode::SUCCESS);
    }

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for summary in &runs {
        println!("  {}", format_run_summary(summary));
    }

    Ok(ExitCode::SUCCESS)
}

fn print_run_details(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Trigger: {} @ {}", summary.trigger_event, summary.trigger_ref);
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Jobs: {} total, {} succeeded, {} failed",
        summary.total_jobs,
        style(summary.succeeded_jobs).green(),
        style(summary.failed_jobs).red()
    );

    Ok(())
}

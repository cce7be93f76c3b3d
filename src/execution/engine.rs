//! Main execution engine - orchestrates the entire pipeline run

use crate::{
    core::{
        ExecutionStatus, Job, JobContext, JobResult, JobStatus, Pipeline, PipelineResult,
        SecretStore, StepStatus, Trigger,
    },
    execution::{CancelHandle, ExecutionScheduler, JobExecutor, SchedulingStrategy},
    runner::StepRunner,
};
use chrono::Utc;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        run_id: Uuid,
        pipeline_name: String,
        total_jobs: usize,
    },
    JobStarted {
        job_id: String,
    },
    StepStarted {
        job_id: String,
        step_name: String,
        attempt: usize,
    },
    StepRetrying {
        job_id: String,
        step_name: String,
        attempt: usize,
        max_attempts: usize,
    },
    StepFinished {
        job_id: String,
        step_name: String,
        status: StepStatus,
        error: Option<String>,
    },
    JobFinished {
        job_id: String,
        status: JobStatus,
    },
    JobsCancelled {
        reason: String,
    },
    PipelineFinished {
        run_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&ExecutionEvent) + Send + Sync>;

/// Fan-out of execution events to registered handlers
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Vec<EventHandler>,
}

impl EventBus {
    pub fn subscribe(&mut self, handler: EventHandler) {
        self.handlers.push(handler);
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: ExecutionEvent) {
        for handler in &self.handlers {
            handler(&event);
        }
    }
}

/// Main pipeline execution engine
pub struct ExecutionEngine<R> {
    runner: Arc<R>,
    strategy: SchedulingStrategy,
    secrets: Arc<SecretStore>,
    fail_fast: Option<bool>,
    max_parallel: Option<usize>,
    workspace_root: PathBuf,
    keep_workspaces: bool,
    events: EventBus,
}

impl<R: StepRunner + 'static> ExecutionEngine<R> {
    pub fn new(runner: R, strategy: SchedulingStrategy) -> Self {
        Self {
            runner: Arc::new(runner),
            strategy,
            secrets: Arc::new(SecretStore::new()),
            fail_fast: None,
            max_parallel: None,
            workspace_root: std::env::temp_dir().join("matrixci"),
            keep_workspaces: false,
            events: EventBus::default(),
        }
    }

    pub fn with_secrets(mut self, secrets: SecretStore) -> Self {
        self.secrets = Arc::new(secrets);
        self
    }

    /// Override the pipeline's own `fail_fast` setting
    pub fn with_fail_fast(mut self, fail_fast: Option<bool>) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Replace the pipeline's own `max_parallel` setting
    pub fn with_max_parallel(mut self, max_parallel: Option<usize>) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// Leave job workspaces on disk after the run
    pub fn with_keep_workspaces(mut self, keep: bool) -> Self {
        self.keep_workspaces = keep;
        self
    }

    /// Directory under which each run gets its job workspaces
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(&ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(Arc::new(handler));
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Jobs this engine would run for `pipeline`
    pub fn expand(&self, pipeline: &Pipeline) -> Vec<Job> {
        pipeline.expand()
    }

    /// Execute the entire pipeline for one trigger
    ///
    /// Every job runs in its own task. The run only succeeds if every job
    /// succeeded; one job's failure never stops its siblings unless
    /// fail-fast is enabled.
    pub async fn execute(&self, pipeline: &Pipeline, trigger: Trigger) -> PipelineResult {
        let run_id = Uuid::new_v4();

        if !pipeline.is_triggered_by(&trigger) {
            info!(
                "Pipeline {} not triggered by {} (listens on {:?})",
                pipeline.name, trigger, pipeline.events
            );
            self.events.emit(ExecutionEvent::PipelineFinished {
                run_id,
                status: ExecutionStatus::NotTriggered,
            });
            return PipelineResult::not_triggered(run_id, &pipeline.name, trigger);
        }

        let started_at = Utc::now();
        let jobs = self.expand(pipeline);
        let fail_fast = self.fail_fast.unwrap_or(pipeline.fail_fast);
        let scheduler = ExecutionScheduler::new(
            self.strategy,
            self.max_parallel.or(pipeline.max_parallel),
        );

        info!(
            "Starting pipeline {} ({}): {} jobs, limit {:?}, fail_fast {}",
            pipeline.name,
            run_id,
            jobs.len(),
            scheduler.limit(),
            fail_fast
        );
        self.events.emit(ExecutionEvent::PipelineStarted {
            run_id,
            pipeline_name: pipeline.name.clone(),
            total_jobs: jobs.len(),
        });

        let executor = Arc::new(
            JobExecutor::new(self.runner.clone(), self.secrets.clone())
                .with_events(self.events.clone())
                .with_job_timeout(pipeline.job_timeout),
        );
        let cancel = CancelHandle::new();
        let run_root = self.workspace_root.join(run_id.to_string());
        let (tx, mut rx) = mpsc::unbounded_channel::<JobResult>();

        let mut handles = Vec::with_capacity(jobs.len());
        for job in &jobs {
            let mut job = job.clone();
            let executor = executor.clone();
            let gate = scheduler.gate();
            let signal = cancel.subscribe();
            let tx = tx.clone();
            let ctx = JobContext::new(
                run_id,
                job.id.clone(),
                job.cell.clone(),
                trigger.clone(),
                run_root.join(job.slug()),
            );

            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire().await;
                let result = executor.run(&mut job, &ctx, signal).await;
                // Receiver only goes away if the engine itself was dropped
                let _ = tx.send(result);
            }));
        }
        drop(tx);

        let mut results = Vec::with_capacity(jobs.len());
        while let Some(result) = rx.recv().await {
            if fail_fast && result.status == JobStatus::Failed && !cancel.is_cancelled() {
                let reason = format!("job {} failed", result.job_id);
                warn!("Fail-fast: cancelling remaining jobs ({})", reason);
                cancel.cancel();
                self.events.emit(ExecutionEvent::JobsCancelled { reason });
            }
            results.push(result);
        }

        let reported: BTreeSet<usize> = results.iter().map(|r| r.index).collect();
        for (job, handle) in jobs.iter().zip(handles) {
            if let Err(e) = handle.await {
                error!("Job task for {} failed: {}", job.id, e);
            }
            if !reported.contains(&job.index) {
                results.push(JobResult::not_started(
                    job,
                    JobStatus::Failed,
                    "job task ended without reporting a result",
                ));
            }
        }

        if !self.keep_workspaces {
            remove_workspaces(&run_root).await;
        }

        let result = PipelineResult::aggregate(run_id, &pipeline.name, trigger, results, started_at);
        info!(
            "Pipeline {} finished: {:?} ({} succeeded, {} failed, {} cancelled)",
            pipeline.name,
            result.status,
            result.succeeded_jobs().len(),
            result.failed_jobs().len(),
            result.cancelled_jobs().len()
        );
        self.events.emit(ExecutionEvent::PipelineFinished {
            run_id,
            status: result.status,
        });
        result
    }
}

/// Delete a run's workspaces once every job task has finished
async fn remove_workspaces(run_root: &Path) {
    match tokio::fs::remove_dir_all(run_root).await {
        Ok(()) => debug!("Removed workspaces under {}", run_root.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            "Failed to remove workspaces under {}: {}",
            run_root.display(),
            e
        ),
    }
}

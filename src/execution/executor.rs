//! Job executor - runs one job's steps in order

use crate::{
    core::{
        expression::ExpressionError, Job, JobContext, JobResult, JobStatus, SecretStore, Step,
        StepAction, StepResult, StepStatus,
    },
    execution::{engine::EventBus, CancelSignal, ExecutionEvent},
    runner::{RunnerError, StepInvocation, StepOutput, StepRunner},
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

/// Reasons a step attempt did not succeed
#[derive(Debug, Error)]
pub enum StepError {
    #[error("configuration error: {0}")]
    Config(#[from] ExpressionError),

    #[error("exited with code {0}")]
    ExitCode(i32),

    #[error("terminated by signal")]
    Signal,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("job timed out after {0:?}")]
    JobTimeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

/// Executes the steps of a single job
pub struct JobExecutor<R> {
    runner: Arc<R>,
    secrets: Arc<SecretStore>,
    events: EventBus,
    job_timeout: Duration,
}

impl<R: StepRunner> JobExecutor<R> {
    pub fn new(runner: Arc<R>, secrets: Arc<SecretStore>) -> Self {
        Self {
            runner,
            secrets,
            events: EventBus::default(),
            job_timeout: Duration::from_secs(crate::core::config::DEFAULT_JOB_TIMEOUT_SECS),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_job_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = job_timeout;
        self
    }

    /// Run every step of `job` in order, stopping at the first failure
    ///
    /// Steps after a failure are recorded as skipped and never invoked.
    pub async fn run(&self, job: &mut Job, ctx: &JobContext, mut cancel: CancelSignal) -> JobResult {
        if cancel.is_cancelled() {
            info!("Job {} cancelled before start", job.id);
            job.transition(JobStatus::Cancelled);
            self.events.emit(ExecutionEvent::JobFinished {
                job_id: job.id.clone(),
                status: job.status,
            });
            return JobResult::not_started(job, JobStatus::Cancelled, "cancelled before start");
        }

        job.transition(JobStatus::Running);
        let started_at = Utc::now();
        info!("Starting job: {}", job.id);
        self.events.emit(ExecutionEvent::JobStarted {
            job_id: job.id.clone(),
        });

        if let Err(e) = tokio::fs::create_dir_all(&ctx.workspace).await {
            let reason = format!(
                "failed to create workspace {}: {}",
                ctx.workspace.display(),
                e
            );
            error!("Job {}: {}", job.id, reason);
            job.transition(JobStatus::Failed);
            self.events.emit(ExecutionEvent::JobFinished {
                job_id: job.id.clone(),
                status: job.status,
            });
            let mut result = JobResult::not_started(job, JobStatus::Failed, &reason);
            result.started_at = started_at;
            return result;
        }

        let deadline = Instant::now() + self.job_timeout;
        let mut status = JobStatus::Succeeded;
        let mut halted: Option<String> = None;
        let mut steps = Vec::with_capacity(job.steps.len());

        for step in &job.steps {
            if halted.is_none() && cancel.is_cancelled() {
                status = JobStatus::Cancelled;
                halted = Some("job cancelled".to_string());
            }

            if let Some(reason) = &halted {
                debug!("Skipping step {} of job {}: {}", step.index, job.id, reason);
                steps.push(StepResult::skipped(step, step_name(step, ctx), reason.clone()));
                continue;
            }

            let result = self.run_step(step, ctx, deadline, &mut cancel).await;
            match result.status {
                StepStatus::Cancelled => {
                    status = JobStatus::Cancelled;
                    halted = Some("job cancelled".to_string());
                }
                StepStatus::Failed if result.continue_on_error => {
                    warn!(
                        "Step '{}' of job {} failed, continuing (continue_on_error)",
                        result.name, job.id
                    );
                }
                StepStatus::Failed => {
                    status = JobStatus::Failed;
                    halted = Some(format!("step '{}' failed", result.name));
                }
                _ => {}
            }
            steps.push(result);
        }

        job.transition(status);
        debug_assert!(job.status.is_terminal());
        info!("Job {} finished: {:?}", job.id, status);
        self.events.emit(ExecutionEvent::JobFinished {
            job_id: job.id.clone(),
            status,
        });

        JobResult {
            index: job.index,
            job_id: job.id.clone(),
            matrix: job.cell.values().to_vec(),
            status,
            steps,
            error: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Run one step, including retries
    ///
    /// A step whose configuration cannot be resolved (e.g. a missing secret)
    /// fails without invoking the tool.
    pub async fn run_step(
        &self,
        step: &Step,
        ctx: &JobContext,
        deadline: Instant,
        cancel: &mut CancelSignal,
    ) -> StepResult {
        let clock = Instant::now();
        let mut result = StepResult {
            index: step.index,
            name: step_name(step, ctx),
            status: StepStatus::Failed,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error: None,
            attempts: 0,
            continue_on_error: step.continue_on_error,
            started_at: Some(Utc::now()),
            duration_ms: 0,
        };

        let invocation = match self.prepare(step, ctx) {
            Ok(invocation) => invocation,
            Err(e) => {
                error!("Step '{}' of job {}: {}", result.name, ctx.job_id, e);
                result.error = Some(e.to_string());
                return self.finish_step(ctx, result, clock);
            }
        };

        let max_attempts = step.retries + 1;
        for attempt in 1..=max_attempts {
            result.attempts = attempt;
            self.events.emit(ExecutionEvent::StepStarted {
                job_id: ctx.job_id.clone(),
                step_name: result.name.clone(),
                attempt,
            });
            debug!("Running step {:?}", invocation);

            match self.attempt(step, &invocation, deadline, cancel).await {
                Ok(output) => {
                    result.exit_code = output.exit_code;
                    result.stdout = self.secrets.redact(&output.stdout);
                    result.stderr = self.secrets.redact(&output.stderr);
                    if output.success() {
                        result.status = StepStatus::Succeeded;
                        result.error = None;
                        break;
                    }
                    let failure = match output.exit_code {
                        Some(code) => StepError::ExitCode(code),
                        None => StepError::Signal,
                    };
                    result.status = StepStatus::Failed;
                    result.error = Some(failure.to_string());
                }
                Err(StepError::Cancelled) => {
                    result.status = StepStatus::Cancelled;
                    result.error = Some(StepError::Cancelled.to_string());
                    break;
                }
                Err(e @ StepError::JobTimeout(_)) => {
                    result.status = StepStatus::Failed;
                    result.error = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    result.status = StepStatus::Failed;
                    result.error = Some(self.secrets.redact(&e.to_string()));
                }
            }

            if attempt < max_attempts {
                warn!(
                    "Step '{}' of job {} failed (attempt {}/{}), retrying",
                    result.name, ctx.job_id, attempt, max_attempts
                );
                self.events.emit(ExecutionEvent::StepRetrying {
                    job_id: ctx.job_id.clone(),
                    step_name: result.name.clone(),
                    attempt: attempt + 1,
                    max_attempts,
                });
            }
        }

        self.finish_step(ctx, result, clock)
    }

    async fn attempt(
        &self,
        step: &Step,
        invocation: &StepInvocation,
        deadline: Instant,
        cancel: &mut CancelSignal,
    ) -> Result<StepOutput, StepError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(StepError::JobTimeout(self.job_timeout));
        }
        let (limit, job_bound) = if step.timeout <= remaining {
            (step.timeout, false)
        } else {
            (remaining, true)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StepError::Cancelled),
            outcome = timeout(limit, self.runner.run(invocation)) => match outcome {
                Ok(result) => result.map_err(StepError::from),
                Err(_) if job_bound => Err(StepError::JobTimeout(self.job_timeout)),
                Err(_) => Err(StepError::Timeout(step.timeout)),
            },
        }
    }

    fn finish_step(&self, ctx: &JobContext, mut result: StepResult, clock: Instant) -> StepResult {
        result.duration_ms = clock.elapsed().as_millis() as u64;
        match result.status {
            StepStatus::Succeeded => info!("Step '{}' of job {} succeeded", result.name, ctx.job_id),
            _ => warn!(
                "Step '{}' of job {} {:?}: {}",
                result.name,
                ctx.job_id,
                result.status,
                result.error.as_deref().unwrap_or("")
            ),
        }
        self.events.emit(ExecutionEvent::StepFinished {
            job_id: ctx.job_id.clone(),
            step_name: result.name.clone(),
            status: result.status,
            error: result.error.clone(),
        });
        result
    }

    /// Resolve a step into a concrete invocation for this job
    ///
    /// Secrets are looked up here, so a missing secret is reported before
    /// any tool runs.
    pub fn prepare(&self, step: &Step, ctx: &JobContext) -> Result<StepInvocation, StepError> {
        let scope = ctx.scope();

        let command = match &step.action {
            StepAction::Run { command } => scope.render(command)?,
            StepAction::Uses {
                template, inputs, ..
            } => {
                let rendered_inputs = inputs
                    .iter()
                    .map(|(name, value)| Ok((name.clone(), scope.render(value)?)))
                    .collect::<Result<BTreeMap<_, _>, ExpressionError>>()?;
                scope.with_inputs(&rendered_inputs).render(template)?
            }
        };

        let secret_scope = scope.with_secrets(&self.secrets);
        let mut env: BTreeMap<String, String> = ctx.base_env().into_iter().collect();
        for (key, value) in &step.env {
            env.insert(key.clone(), secret_scope.render(value)?);
        }

        let working_dir = match &step.working_directory {
            Some(dir) => ctx.workspace.join(scope.render(dir)?),
            None => ctx.workspace.clone(),
        };

        Ok(StepInvocation {
            step_name: step_name(step, ctx),
            command,
            env,
            remove_env: self.secrets.known_names().map(str::to_string).collect(),
            working_dir,
        })
    }
}

/// Step name with matrix values substituted
fn step_name(step: &Step, ctx: &JobContext) -> String {
    ctx.scope()
        .render(&step.name)
        .unwrap_or_else(|_| step.name.clone())
}

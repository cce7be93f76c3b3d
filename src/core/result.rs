//! Step, job and pipeline results

use crate::core::{
    job::Job,
    state::{ExecutionStatus, JobStatus, StepStatus},
    step::Step,
    trigger::Trigger,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    pub name: String,
    pub status: StepStatus,

    /// Exit code of the last attempt, if the tool ran to exit
    pub exit_code: Option<i32>,

    /// Captured stdout (secret values redacted)
    pub stdout: String,

    /// Captured stderr (secret values redacted)
    pub stderr: String,

    /// Failure description
    pub error: Option<String>,

    /// How many times the tool was invoked
    pub attempts: usize,

    pub continue_on_error: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
}

impl StepResult {
    /// A step that was never invoked
    pub fn skipped(step: &Step, name: String, reason: impl Into<String>) -> Self {
        Self {
            index: step.index,
            name,
            status: StepStatus::Skipped,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(reason.into()),
            attempts: 0,
            continue_on_error: step.continue_on_error,
            started_at: None,
            duration_ms: 0,
        }
    }

    /// Whether this result should fail its job
    pub fn fails_job(&self) -> bool {
        matches!(self.status, StepStatus::Failed) && !self.continue_on_error
    }
}

/// Result of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub index: usize,
    pub job_id: String,
    pub matrix: Vec<(String, String)>,
    pub status: JobStatus,
    pub steps: Vec<StepResult>,

    /// Job-level failure not tied to a step (e.g. workspace setup)
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    /// A job that never started, with every step skipped
    pub fn not_started(job: &Job, status: JobStatus, reason: &str) -> Self {
        let now = Utc::now();
        Self {
            index: job.index,
            job_id: job.id.clone(),
            matrix: job.cell.values().to_vec(),
            status,
            steps: job
                .steps
                .iter()
                .map(|step| StepResult::skipped(step, step.name.clone(), reason))
                .collect(),
            error: Some(reason.to_string()),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    /// The step that failed the job, if any
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.fails_job())
    }

    /// Steps whose tool was invoked
    pub fn executed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| s.status.was_executed())
    }

    /// Steps that were never invoked
    pub fn skipped_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| s.status == StepStatus::Skipped)
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as u64
    }
}

/// Aggregate result of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub pipeline_name: String,
    pub trigger: Trigger,
    pub status: ExecutionStatus,

    /// Job results ordered by expansion index
    pub jobs: Vec<JobResult>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineResult {
    /// Combine job results: the run succeeds only if every job succeeded
    pub fn aggregate(
        run_id: Uuid,
        pipeline_name: impl Into<String>,
        trigger: Trigger,
        mut jobs: Vec<JobResult>,
        started_at: DateTime<Utc>,
    ) -> Self {
        jobs.sort_by_key(|j| j.index);
        let status = if jobs.iter().all(JobResult::succeeded) {
            ExecutionStatus::Succeeded
        } else {
            ExecutionStatus::Failed
        };

        Self {
            run_id,
            pipeline_name: pipeline_name.into(),
            trigger,
            status,
            jobs,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// A run whose trigger did not match the pipeline's events
    pub fn not_triggered(run_id: Uuid, pipeline_name: impl Into<String>, trigger: Trigger) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            pipeline_name: pipeline_name.into(),
            trigger,
            status: ExecutionStatus::NotTriggered,
            jobs: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(
            self.status,
            ExecutionStatus::Succeeded | ExecutionStatus::NotTriggered
        )
    }

    pub fn job(&self, job_id: &str) -> Option<&JobResult> {
        self.jobs.iter().find(|j| j.job_id == job_id)
    }

    pub fn succeeded_jobs(&self) -> Vec<&JobResult> {
        self.jobs_with(JobStatus::Succeeded)
    }

    pub fn failed_jobs(&self) -> Vec<&JobResult> {
        self.jobs_with(JobStatus::Failed)
    }

    pub fn cancelled_jobs(&self) -> Vec<&JobResult> {
        self.jobs_with(JobStatus::Cancelled)
    }

    fn jobs_with(&self, status: JobStatus) -> Vec<&JobResult> {
        self.jobs.iter().filter(|j| j.status == status).collect()
    }
}

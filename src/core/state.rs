//! Execution state models

use serde::{Deserialize, Serialize};

/// Overall pipeline run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Run has not started
    Pending,
    /// Jobs are running
    Running,
    /// Every job succeeded
    Succeeded,
    /// At least one job did not succeed
    Failed,
    /// The trigger did not match the pipeline's events
    NotTriggered,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Succeeded => "Succeeded",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::NotTriggered => "NotTriggered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(ExecutionStatus::Pending),
            "Running" => Some(ExecutionStatus::Running),
            "Succeeded" => Some(ExecutionStatus::Succeeded),
            "Failed" => Some(ExecutionStatus::Failed),
            "NotTriggered" => Some(ExecutionStatus::NotTriggered),
            _ => None,
        }
    }
}

/// Status of a single job
///
/// `Pending -> Running -> {Succeeded, Failed}`. `Cancelled` is only reached
/// when the cross-job fail-fast policy stops a sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Check if job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

/// Outcome of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// Tool exited successfully
    Succeeded,
    /// Tool failed, timed out, or the step was misconfigured
    Failed,
    /// Never invoked because an earlier step failed
    Skipped,
    /// Interrupted by sibling-job cancellation
    Cancelled,
}

impl StepStatus {
    /// Whether the external tool was (at least) started for this step
    pub fn was_executed(&self) -> bool {
        !matches!(self, StepStatus::Skipped)
    }
}

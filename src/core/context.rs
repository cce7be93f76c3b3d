//! Job context - per-job runtime data handed to each step

use crate::core::{expression::ExpressionScope, matrix::MatrixCell, trigger::Trigger};
use std::path::PathBuf;
use uuid::Uuid;

/// Execution context for one job
///
/// Built by the engine when a job is scheduled. Jobs never share a context.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Pipeline run this job belongs to
    pub run_id: Uuid,

    /// Job identifier (e.g. `ci (ubuntu-latest, 3.8)`)
    pub job_id: String,

    /// Matrix values assigned to the job
    pub cell: MatrixCell,

    /// Event that started the run
    pub trigger: Trigger,

    /// Isolated working directory for the job's steps
    pub workspace: PathBuf,
}

impl JobContext {
    pub fn new(
        run_id: Uuid,
        job_id: impl Into<String>,
        cell: MatrixCell,
        trigger: Trigger,
        workspace: PathBuf,
    ) -> Self {
        Self {
            run_id,
            job_id: job_id.into(),
            cell,
            trigger,
            workspace,
        }
    }

    /// Expression scope without access to secrets
    pub fn scope(&self) -> ExpressionScope<'_> {
        ExpressionScope::new(&self.cell).with_trigger(&self.trigger)
    }

    /// Base environment every step in this job receives
    pub fn base_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("CI".to_string(), "true".to_string()),
            ("PIPELINE_RUN_ID".to_string(), self.run_id.to_string()),
            ("PIPELINE_JOB".to_string(), self.job_id.clone()),
            ("PIPELINE_EVENT".to_string(), self.trigger.event.clone()),
            ("PIPELINE_REF".to_string(), self.trigger.source_ref.clone()),
        ];
        env.extend(self.cell.env_vars());
        env
    }
}

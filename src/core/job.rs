//! Job domain model - one cell of the build matrix

use crate::core::{
    matrix::{Matrix, MatrixCell},
    state::JobStatus,
    step::Step,
};
use tracing::warn;

/// One cell of the matrix with its own copy of the step template
#[derive(Debug, Clone)]
pub struct Job {
    /// Position in the expansion (stable for a given matrix)
    pub index: usize,

    /// Display identifier, e.g. `ci (ubuntu-latest, 3.8)`
    pub id: String,

    /// Assigned dimension values
    pub cell: MatrixCell,

    /// Ordered steps
    pub steps: Vec<Step>,

    /// Lifecycle status
    pub status: JobStatus,
}

impl Job {
    /// Expand a matrix into one job per cell, each with the full step list
    pub fn expand(pipeline_name: &str, matrix: &Matrix, steps: &[Step]) -> Vec<Job> {
        matrix
            .cells()
            .into_iter()
            .enumerate()
            .map(|(index, cell)| Job {
                index,
                id: Self::job_id(pipeline_name, &cell),
                cell,
                steps: steps.to_vec(),
                status: JobStatus::Pending,
            })
            .collect()
    }

    fn job_id(pipeline_name: &str, cell: &MatrixCell) -> String {
        if cell.is_empty() {
            pipeline_name.to_string()
        } else {
            format!("{} ({})", pipeline_name, cell.label())
        }
    }

    /// Move to `next`, checking the lifecycle
    ///
    /// An illegal transition is a bug in the executor: it panics in debug
    /// builds and is logged in release builds.
    pub fn transition(&mut self, next: JobStatus) {
        if !self.status.can_transition_to(next) {
            debug_assert!(
                false,
                "job {}: illegal transition {:?} -> {:?}",
                self.id, self.status, next
            );
            warn!(
                "Job {}: illegal status transition {:?} -> {:?}",
                self.id, self.status, next
            );
        }
        self.status = next;
    }

    /// Directory name for the job's workspace
    pub fn slug(&self) -> String {
        if self.cell.is_empty() {
            format!("job-{}", self.index)
        } else {
            format!("{}-{}", self.index, self.cell.slug())
        }
    }
}

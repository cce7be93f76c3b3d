//! Pipeline domain model

use crate::core::{
    config::{PipelineConfig, DEFAULT_JOB_TIMEOUT_SECS, DEFAULT_STEP_TIMEOUT_SECS},
    job::Job,
    matrix::Matrix,
    step::{Step, StepDefaults},
    trigger::Trigger,
};
use std::collections::BTreeSet;
use std::time::Duration;

/// A pipeline definition
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Trigger events the pipeline responds to
    pub events: Vec<String>,

    /// Build matrix
    pub matrix: Matrix,

    /// Step template, identical for every job
    pub steps: Vec<Step>,

    /// Cancel siblings once a job fails
    pub fail_fast: bool,

    /// Cap on concurrently running jobs
    pub max_parallel: Option<usize>,

    /// Upper bound for a single job
    pub job_timeout: Duration,

    /// Secret names referenced by any step
    pub secret_names: BTreeSet<String>,
}

impl Pipeline {
    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> anyhow::Result<Self> {
        let defaults = StepDefaults {
            retries: config.defaults.retries.unwrap_or(0),
            timeout_secs: config
                .defaults
                .step_timeout_secs
                .unwrap_or(DEFAULT_STEP_TIMEOUT_SECS),
        };

        let steps = config
            .steps
            .iter()
            .enumerate()
            .map(|(index, step_config)| {
                Step::from_config(index, step_config, &config.actions, &defaults)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Pipeline {
            name: config.name.clone(),
            events: config.on.clone(),
            matrix: config.matrix()?,
            steps,
            fail_fast: config.fail_fast,
            max_parallel: config.max_parallel,
            job_timeout: Duration::from_secs(
                config
                    .defaults
                    .job_timeout_secs
                    .unwrap_or(DEFAULT_JOB_TIMEOUT_SECS),
            ),
            secret_names: config.secret_names(),
        })
    }

    /// Build a pipeline directly from a matrix and step template
    pub fn new(name: impl Into<String>, matrix: Matrix, steps: Vec<Step>) -> Self {
        let secret_names = steps.iter().flat_map(Step::required_secrets).collect();
        Pipeline {
            name: name.into(),
            events: vec!["push".to_string()],
            matrix,
            steps,
            fail_fast: false,
            max_parallel: None,
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            secret_names,
        }
    }

    /// Expand the matrix into jobs (stable order)
    pub fn expand(&self) -> Vec<Job> {
        Job::expand(&self.name, &self.matrix, &self.steps)
    }

    /// Whether `trigger` should start this pipeline
    pub fn is_triggered_by(&self, trigger: &Trigger) -> bool {
        trigger.matches(&self.events)
    }

    /// Number of jobs the matrix expands to
    pub fn job_count(&self) -> usize {
        self.matrix.size()
    }
}

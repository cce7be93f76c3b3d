//! Test utility functions for matrixci scenarios

use async_trait::async_trait;
use matrixci::core::config::PipelineConfig;
use matrixci::{
    ExecutionEngine, JobResult, JobStatus, Pipeline, PipelineResult, RunnerError,
    SchedulingStrategy, SecretStore, StepInvocation, StepOutput, StepRunner, StepStatus, Trigger,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// One recorded tool invocation
#[derive(Debug, Clone)]
pub struct Call {
    pub job_id: String,
    pub command: String,
    pub env: BTreeMap<String, String>,
    pub removed_env: Vec<String>,
    pub working_dir: PathBuf,
}

/// Mock runner that succeeds unless told otherwise
///
/// This is useful for:
/// - Fast, deterministic tests without subprocess overhead
/// - Asserting exactly which steps of which job were invoked
/// - Injecting failures, spawn errors and slow tools per job
#[derive(Default)]
pub struct MockRunner {
    failures: Vec<(String, String)>,
    spawn_errors: Vec<String>,
    delays: Vec<(String, Duration)>,
    echo_env: Vec<String>,
    calls: Mutex<Vec<Call>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit non-zero when `job_id` runs `command`
    pub fn fail(mut self, job_id: &str, command: &str) -> Self {
        self.failures.push((job_id.to_string(), command.to_string()));
        self
    }

    /// Fail to spawn `command` in every job
    pub fn spawn_error(mut self, command: &str) -> Self {
        self.spawn_errors.push(command.to_string());
        self
    }

    /// Make `command` take `delay` in every job
    pub fn delay(mut self, command: &str, delay: Duration) -> Self {
        self.delays.push((command.to_string(), delay));
        self
    }

    /// Print `KEY=value` for this env var to stdout, like a chatty tool would
    pub fn echo_env(mut self, key: &str) -> Self {
        self.echo_env.push(key.to_string());
        self
    }

    /// All invocations, in call order
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Commands invoked by one job, in order
    pub fn commands_for(&self, job_id: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.job_id == job_id)
            .map(|c| c.command)
            .collect()
    }
}

#[async_trait]
impl StepRunner for MockRunner {
    async fn run(&self, invocation: &StepInvocation) -> Result<StepOutput, RunnerError> {
        let job_id = invocation
            .env
            .get("PIPELINE_JOB")
            .cloned()
            .unwrap_or_default();

        self.calls.lock().unwrap().push(Call {
            job_id: job_id.clone(),
            command: invocation.command.clone(),
            env: invocation.env.clone(),
            removed_env: invocation.remove_env.clone(),
            working_dir: invocation.working_dir.clone(),
        });

        if self.spawn_errors.contains(&invocation.command) {
            return Err(RunnerError::Spawn {
                program: invocation.command.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            });
        }

        if let Some((_, delay)) = self.delays.iter().find(|(c, _)| *c == invocation.command) {
            tokio::time::sleep(*delay).await;
        }

        let mut stdout = format!("ran {}\n", invocation.command);
        for key in &self.echo_env {
            if let Some(value) = invocation.env.get(key) {
                stdout.push_str(&format!("{}={}\n", key, value));
            }
        }

        let failed = self
            .failures
            .iter()
            .any(|(job, command)| *job == job_id && *command == invocation.command);
        if failed {
            Ok(StepOutput::new(1)
                .with_stdout(stdout)
                .with_stderr(format!("{} failed", invocation.command)))
        } else {
            Ok(StepOutput::new(0).with_stdout(stdout))
        }
    }
}

/// Parse a pipeline, panicking on invalid test fixtures
pub fn pipeline(yaml: &str) -> Pipeline {
    PipelineConfig::from_yaml(yaml)
        .expect("Should parse YAML")
        .to_pipeline()
        .expect("Should build pipeline")
}

/// Shared workspace root; every run removes its own `<run_id>` directory
pub fn workspace_root() -> std::path::PathBuf {
    std::env::temp_dir().join("matrixci-scenarios")
}

/// Engine over a mock runner
pub fn engine(runner: MockRunner, secrets: SecretStore) -> ExecutionEngine<MockRunner> {
    ExecutionEngine::new(runner, SchedulingStrategy::Parallel)
        .with_secrets(secrets)
        .with_workspace_root(workspace_root())
}

/// Run a pipeline on a push to main
pub async fn run_push(engine: &ExecutionEngine<MockRunner>, pipeline: &Pipeline) -> PipelineResult {
    engine
        .execute(pipeline, Trigger::push("refs/heads/main"))
        .await
}

// Assertion helpers

pub fn job<'a>(result: &'a PipelineResult, job_id: &str) -> &'a JobResult {
    result
        .job(job_id)
        .unwrap_or_else(|| panic!("Job '{}' not found in result", job_id))
}

pub fn assert_job_succeeded(result: &PipelineResult, job_id: &str) {
    let job = job(result, job_id);
    assert_eq!(
        job.status,
        JobStatus::Succeeded,
        "Job '{}' should have succeeded: {:?}",
        job_id,
        job.steps
    );
    assert!(job.steps.iter().all(|s| s.status == StepStatus::Succeeded));
}

/// Assert a job failed at step `index` (zero-based) and skipped the rest
pub fn assert_job_failed_at(result: &PipelineResult, job_id: &str, index: usize) {
    let job = job(result, job_id);
    assert_eq!(job.status, JobStatus::Failed, "Job '{}' should have failed", job_id);

    for step in &job.steps[..index] {
        assert_eq!(step.status, StepStatus::Succeeded, "step {} before failure", step.index);
    }
    assert_eq!(job.steps[index].status, StepStatus::Failed);
    for step in &job.steps[index + 1..] {
        assert_eq!(step.status, StepStatus::Skipped, "step {} after failure", step.index);
        assert_eq!(step.attempts, 0);
    }
}

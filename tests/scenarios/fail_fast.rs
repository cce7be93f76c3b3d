//! Test: Cross-job fail-fast and concurrency limits

use crate::helpers::*;
use matrixci::{
    ExecutionEngine, ExecutionStatus, JobStatus, SchedulingStrategy, SecretStore, StepStatus,
};
use std::time::Duration;

fn yaml(fail_fast: bool) -> String {
    format!(
        r#"
name: "ci"
fail_fast: {}
matrix:
  os: [A, B, C]
steps:
  - name: "Build"
    run: "build-${{{{ matrix.os }}}}"
  - name: "Test"
    run: "test"
"#,
        fail_fast
    )
}

fn slow_runner() -> MockRunner {
    MockRunner::new()
        .fail("ci (A)", "build-A")
        .delay("build-B", Duration::from_secs(30))
        .delay("build-C", Duration::from_secs(30))
}

#[tokio::test]
async fn test_fail_fast_cancels_running_siblings() {
    let pipeline = pipeline(&yaml(true));
    let engine = engine(slow_runner(), SecretStore::new());

    let result = tokio::time::timeout(Duration::from_secs(10), run_push(&engine, &pipeline))
        .await
        .expect("fail-fast should stop slow siblings");

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_job_failed_at(&result, "ci (A)", 0);

    for job_id in ["ci (B)", "ci (C)"] {
        let job = job(&result, job_id);
        assert_eq!(job.status, JobStatus::Cancelled);
        // Killed mid-build, or cancelled before it started
        assert!(matches!(
            job.steps[0].status,
            StepStatus::Cancelled | StepStatus::Skipped
        ));
        assert_eq!(job.steps[1].status, StepStatus::Skipped);
        assert!(!engine.runner().commands_for(job_id).contains(&"test".to_string()));
    }
}

#[tokio::test]
async fn test_siblings_complete_without_fail_fast() {
    let pipeline = pipeline(&yaml(false));
    let runner = MockRunner::new()
        .fail("ci (A)", "build-A")
        .delay("build-B", Duration::from_millis(50));
    let engine = engine(runner, SecretStore::new());

    let result = run_push(&engine, &pipeline).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.failed_jobs().len(), 1);
    assert_eq!(result.succeeded_jobs().len(), 2);
    assert!(result.cancelled_jobs().is_empty());
}

#[tokio::test]
async fn test_sequential_fail_fast_never_starts_later_jobs() {
    let pipeline = pipeline(&yaml(true));
    let engine = ExecutionEngine::new(slow_runner(), SchedulingStrategy::Sequential)
        .with_workspace_root(workspace_root());

    let result = tokio::time::timeout(Duration::from_secs(10), run_push(&engine, &pipeline))
        .await
        .expect("later jobs should never start");

    assert_eq!(result.jobs[0].status, JobStatus::Failed);
    assert_eq!(result.jobs[1].status, JobStatus::Cancelled);
    assert_eq!(result.jobs[2].status, JobStatus::Cancelled);
    assert_eq!(engine.runner().commands_for("ci (A)"), vec!["build-A"]);
}

#[tokio::test]
async fn test_max_parallel_serializes_jobs() {
    let pipeline = pipeline(
        r#"
name: "ci"
max_parallel: 1
matrix:
  os: [A, B, C]
steps:
  - name: "Build"
    run: "build"
"#,
    );
    let runner = MockRunner::new().delay("build", Duration::from_millis(30));
    let engine = engine(runner, SecretStore::new());

    let result = run_push(&engine, &pipeline).await;
    assert!(result.succeeded());

    // With one slot, job windows never overlap
    let mut windows: Vec<_> = result
        .jobs
        .iter()
        .map(|j| (j.started_at, j.finished_at))
        .collect();
    windows.sort();
    for pair in windows.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "jobs overlapped: {:?}", pair);
    }
}

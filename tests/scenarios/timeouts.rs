//! Test: Step and job timeouts

use crate::helpers::*;
use matrixci::{ExecutionStatus, SecretStore, StepStatus};
use std::time::Duration;

#[tokio::test]
async fn test_step_timeout_fails_only_that_job() {
    let pipeline = pipeline(
        r#"
name: "ci"
matrix:
  os: [A, B]
steps:
  - name: "Hang"
    run: "hang-${{ matrix.os }}"
    timeout_secs: 1
  - name: "Lint"
    run: "lint"
"#,
    );
    let runner = MockRunner::new().delay("hang-A", Duration::from_secs(30));
    let engine = engine(runner, SecretStore::new());

    let result = tokio::time::timeout(Duration::from_secs(10), run_push(&engine, &pipeline))
        .await
        .expect("step timeout should fire");

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_job_failed_at(&result, "ci (A)", 0);
    assert!(job(&result, "ci (A)").steps[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("timed out after"));
    assert_job_succeeded(&result, "ci (B)");
}

#[tokio::test]
async fn test_job_timeout_bounds_whole_job() {
    let pipeline = pipeline(
        r#"
name: "ci"
defaults:
  job_timeout_secs: 1
steps:
  - name: "Quick"
    run: "quick"
  - name: "Slow"
    run: "slow"
  - name: "Never"
    run: "never"
"#,
    );
    let runner = MockRunner::new().delay("slow", Duration::from_secs(30));
    let engine = engine(runner, SecretStore::new());

    let result = tokio::time::timeout(Duration::from_secs(10), run_push(&engine, &pipeline))
        .await
        .expect("job timeout should fire");

    assert_job_failed_at(&result, "ci", 1);
    let job = job(&result, "ci");
    assert!(job.steps[1]
        .error
        .as_deref()
        .unwrap()
        .starts_with("job timed out"));
    assert_eq!(job.steps[2].status, StepStatus::Skipped);
    assert_eq!(engine.runner().commands_for("ci"), vec!["quick", "slow"]);
}

#[tokio::test]
async fn test_timed_out_step_is_not_retried_past_job_deadline() {
    let pipeline = pipeline(
        r#"
name: "ci"
defaults:
  job_timeout_secs: 1
steps:
  - name: "Slow"
    run: "slow"
    retries: 3
"#,
    );
    let runner = MockRunner::new().delay("slow", Duration::from_secs(30));
    let engine = engine(runner, SecretStore::new());

    let result = tokio::time::timeout(Duration::from_secs(10), run_push(&engine, &pipeline))
        .await
        .expect("job timeout should stop retries");

    assert_job_failed_at(&result, "ci", 0);
    assert_eq!(job(&result, "ci").steps[0].attempts, 1);
}

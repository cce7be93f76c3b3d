//! Test: Failure Handling - fail-fast within a job, isolation across jobs

use crate::helpers::*;
use matrixci::{ExecutionStatus, JobStatus, SecretStore, StepStatus};

const CI_YAML: &str = r#"
name: "ci"
matrix:
  os: [A, B, C]
  version: ["1", "2", "3", "4"]
steps:
  - name: "Checkout"
    run: "checkout"
  - name: "Set up runtime"
    run: "setup"
  - name: "Upgrade installer"
    run: "upgrade"
  - name: "Install"
    run: "install"
  - name: "Test"
    run: "test"
  - name: "Upload coverage"
    run: "upload"
  - name: "Lint"
    run: "lint"
"#;

/// 12 jobs, one of which fails at its fifth step
#[tokio::test]
async fn test_single_job_failure_in_twelve_job_matrix() {
    let pipeline = pipeline(CI_YAML);
    let engine = engine(MockRunner::new().fail("ci (A, 1)", "test"), SecretStore::new());

    let result = run_push(&engine, &pipeline).await;

    // Aggregate is failed
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(!result.succeeded());
    assert_eq!(result.succeeded_jobs().len(), 11);
    assert_eq!(result.failed_jobs().len(), 1);

    // Steps 1-4 executed, 5 failed, 6-7 never invoked
    assert_job_failed_at(&result, "ci (A, 1)", 4);
    assert_eq!(
        engine.runner().commands_for("ci (A, 1)"),
        vec!["checkout", "setup", "upgrade", "install", "test"]
    );

    let failing = job(&result, "ci (A, 1)").failed_step().unwrap();
    assert_eq!(failing.name, "Test");
    assert_eq!(failing.exit_code, Some(1));
    assert_eq!(failing.stderr, "test failed");

    // Siblings, including the same OS, ran to completion
    assert_job_succeeded(&result, "ci (A, 2)");
    assert_eq!(engine.runner().commands_for("ci (C, 4)").len(), 7);
}

#[tokio::test]
async fn test_failure_at_first_step_skips_everything_else() {
    let pipeline = pipeline(CI_YAML);
    let engine = engine(MockRunner::new().fail("ci (B, 2)", "checkout"), SecretStore::new());

    let result = run_push(&engine, &pipeline).await;

    assert_job_failed_at(&result, "ci (B, 2)", 0);
    assert_eq!(engine.runner().commands_for("ci (B, 2)"), vec!["checkout"]);
    assert_eq!(job(&result, "ci (B, 2)").skipped_steps().count(), 6);
}

#[tokio::test]
async fn test_failure_at_last_step() {
    let pipeline = pipeline(CI_YAML);
    let engine = engine(MockRunner::new().fail("ci (C, 3)", "lint"), SecretStore::new());

    let result = run_push(&engine, &pipeline).await;

    assert_job_failed_at(&result, "ci (C, 3)", 6);
    assert_eq!(job(&result, "ci (C, 3)").executed_steps().count(), 7);
}

#[tokio::test]
async fn test_every_job_failing_fails_aggregate() {
    let pipeline = pipeline(CI_YAML);
    let mut runner = MockRunner::new();
    for job in pipeline.expand() {
        runner = runner.fail(&job.id, "install");
    }
    let engine = engine(runner, SecretStore::new());

    let result = run_push(&engine, &pipeline).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.failed_jobs().len(), 12);
    // 4 steps per job, none after the failing install
    assert_eq!(engine.runner().calls().len(), 48);
}

#[tokio::test]
async fn test_spawn_error_fails_job() {
    let pipeline = pipeline(
        r#"
name: "ci"
matrix:
  os: [A, B]
steps:
  - name: "Install"
    run: "install"
  - name: "Missing tool"
    run: "no-such-tool"
  - name: "Lint"
    run: "lint"
"#,
    );
    let engine = engine(MockRunner::new().spawn_error("no-such-tool"), SecretStore::new());

    let result = run_push(&engine, &pipeline).await;

    assert_eq!(result.failed_jobs().len(), 2);
    for job in &result.jobs {
        assert_eq!(job.steps[1].status, StepStatus::Failed);
        assert!(job.steps[1]
            .error
            .as_deref()
            .unwrap()
            .contains("failed to spawn 'no-such-tool'"));
        assert_eq!(job.steps[1].exit_code, None);
        assert_eq!(job.steps[2].status, StepStatus::Skipped);
    }
}

#[tokio::test]
async fn test_continue_on_error_does_not_fail_job() {
    let pipeline = pipeline(
        r#"
name: "ci"
matrix:
  os: [A]
steps:
  - name: "Test"
    run: "test"
  - name: "Upload coverage"
    run: "upload"
    continue_on_error: true
  - name: "Lint"
    run: "lint"
"#,
    );
    let engine = engine(MockRunner::new().fail("ci (A)", "upload"), SecretStore::new());

    let result = run_push(&engine, &pipeline).await;

    assert!(result.succeeded());
    let job = job(&result, "ci (A)");
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.steps[1].status, StepStatus::Failed);
    assert_eq!(job.steps[2].status, StepStatus::Succeeded);
}

#[tokio::test]
async fn test_retries_recover_nothing_when_tool_keeps_failing() {
    let pipeline = pipeline(
        r#"
name: "ci"
matrix:
  os: [A]
steps:
  - name: "Flaky"
    run: "flaky"
    retries: 2
  - name: "After"
    run: "after"
"#,
    );
    let engine = engine(MockRunner::new().fail("ci (A)", "flaky"), SecretStore::new());

    let result = run_push(&engine, &pipeline).await;

    assert_job_failed_at(&result, "ci (A)", 0);
    assert_eq!(job(&result, "ci (A)").steps[0].attempts, 3);
    assert_eq!(engine.runner().commands_for("ci (A)"), vec!["flaky"; 3]);
}

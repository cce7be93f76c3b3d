//! Test: Matrix expansion and the all-green path

use crate::helpers::*;
use matrixci::{ExecutionStatus, SecretStore};
use std::collections::HashSet;

const CI_YAML: &str = r#"
name: "ci"
on: [push, pull_request]
matrix:
  os: [A, B, C]
  version: ["1", "2", "3", "4"]
actions:
  setup-runtime:
    inputs:
      version:
        required: true
    run: "setup-runtime ${{ inputs.version }}"
steps:
  - name: "Checkout"
    run: "checkout"
  - name: "Set up ${{ matrix.version }}"
    uses: setup-runtime
    with:
      version: "${{ matrix.version }}"
  - name: "Upgrade installer"
    run: "upgrade-installer"
  - name: "Install"
    run: "install"
  - name: "Test"
    run: "test"
  - name: "Upload coverage"
    run: "upload"
  - name: "Lint"
    run: "lint"
"#;

#[tokio::test]
async fn test_matrix_expands_to_every_combination() {
    let pipeline = pipeline(CI_YAML);
    let jobs = pipeline.expand();

    assert_eq!(jobs.len(), 12);
    let combos: HashSet<_> = jobs
        .iter()
        .map(|j| (j.cell.get("os").unwrap().to_string(), j.cell.get("version").unwrap().to_string()))
        .collect();
    assert_eq!(combos.len(), 12);

    // First dimension varies slowest
    assert_eq!(jobs[0].id, "ci (A, 1)");
    assert_eq!(jobs[3].id, "ci (A, 4)");
    assert_eq!(jobs[4].id, "ci (B, 1)");
    assert_eq!(jobs[11].id, "ci (C, 4)");
}

#[tokio::test]
async fn test_all_steps_succeed_in_every_job() {
    let pipeline = pipeline(CI_YAML);
    let engine = engine(MockRunner::new(), SecretStore::new());

    let result = run_push(&engine, &pipeline).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.jobs.len(), 12);
    for job in &result.jobs {
        assert_job_succeeded(&result, &job.job_id);
        assert!(job.steps.iter().all(|s| s.attempts == 1));
    }

    // Each step invoked exactly once per job, in template order
    assert_eq!(
        engine.runner().commands_for("ci (B, 3)"),
        vec![
            "checkout",
            "setup-runtime 3",
            "upgrade-installer",
            "install",
            "test",
            "upload",
            "lint"
        ]
    );
}

#[tokio::test]
async fn test_step_environment_carries_matrix_values() {
    let pipeline = pipeline(CI_YAML);
    let engine = engine(MockRunner::new(), SecretStore::new());

    let result = run_push(&engine, &pipeline).await;
    assert!(result.succeeded());

    let calls = engine.runner().calls();
    let call = calls
        .iter()
        .find(|c| c.job_id == "ci (C, 2)" && c.command == "test")
        .unwrap();
    assert_eq!(call.env.get("MATRIX_OS").map(String::as_str), Some("C"));
    assert_eq!(call.env.get("MATRIX_VERSION").map(String::as_str), Some("2"));
    assert_eq!(call.env.get("CI").map(String::as_str), Some("true"));
    assert_eq!(call.env.get("PIPELINE_EVENT").map(String::as_str), Some("push"));
    assert_eq!(
        call.env.get("PIPELINE_RUN_ID").map(String::as_str),
        Some(result.run_id.to_string().as_str())
    );
}

#[tokio::test]
async fn test_jobs_get_isolated_workspaces() {
    let pipeline = pipeline(CI_YAML);
    let root = tempfile::tempdir().unwrap();
    let engine = engine(MockRunner::new(), SecretStore::new())
        .with_workspace_root(root.path())
        .with_keep_workspaces(true);

    let result = run_push(&engine, &pipeline).await;

    let workspaces: HashSet<_> = engine.runner().calls()
        .into_iter()
        .map(|c| c.working_dir)
        .collect();
    assert_eq!(workspaces.len(), 12);
    assert!(workspaces
        .iter()
        .all(|w| w.exists() && w.starts_with(root.path().join(result.run_id.to_string()))));
}

#[tokio::test]
async fn test_workspaces_cleaned_up_after_run() {
    let pipeline = pipeline(CI_YAML);
    let engine = engine(MockRunner::new(), SecretStore::new());

    let result = run_push(&engine, &pipeline).await;

    assert!(result.succeeded());
    assert!(!workspace_root().join(result.run_id.to_string()).exists());
    assert!(engine.runner().calls().iter().all(|c| !c.working_dir.exists()));
}

#[tokio::test]
async fn test_empty_matrix_runs_single_job() {
    let pipeline = pipeline(
        r#"
name: "docs"
steps:
  - name: "Build"
    run: "build-docs"
"#,
    );
    let engine = engine(MockRunner::new(), SecretStore::new());

    let result = run_push(&engine, &pipeline).await;

    assert!(result.succeeded());
    assert_eq!(result.jobs.len(), 1);
    assert_job_succeeded(&result, "docs");
}

#[tokio::test]
async fn test_unlisted_event_is_not_triggered() {
    let pipeline = pipeline(CI_YAML);
    let engine = engine(MockRunner::new(), SecretStore::new());

    let result = engine
        .execute(&pipeline, matrixci::Trigger::new("schedule", "refs/heads/main"))
        .await;

    assert_eq!(result.status, ExecutionStatus::NotTriggered);
    assert!(result.succeeded());
    assert!(engine.runner().calls().is_empty());
}

#[tokio::test]
async fn test_bundled_ci_pipeline_loads() {
    let pipeline = pipeline(include_str!("../../pipelines/ci.yml"));

    assert_eq!(pipeline.job_count(), 12);
    assert_eq!(pipeline.steps.len(), 7);
    assert!(pipeline.secret_names.contains("CODECOV_TOKEN"));
    assert_eq!(pipeline.expand()[0].id, "test (ubuntu-latest, 3.6)");
}

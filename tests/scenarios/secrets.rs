//! Test: Secret injection, missing secrets and redaction

use crate::helpers::*;
use matrixci::{ExecutionStatus, SecretStore, StepStatus};

const UPLOAD_YAML: &str = r#"
name: "ci"
matrix:
  os: [A, B]
steps:
  - name: "Test"
    run: "test"
  - name: "Upload coverage"
    run: "upload"
    env:
      CODECOV_TOKEN: "${{ secrets.CODECOV_TOKEN }}"
  - name: "Lint"
    run: "lint"
"#;

fn store_with_token() -> SecretStore {
    let mut secrets = SecretStore::new();
    secrets.insert("CODECOV_TOKEN", "tok-5f2a9c");
    secrets
}

#[tokio::test]
async fn test_secret_injected_only_into_declaring_step() {
    let pipeline = pipeline(UPLOAD_YAML);
    let engine = engine(MockRunner::new(), store_with_token());

    let result = run_push(&engine, &pipeline).await;
    assert!(result.succeeded());

    for call in engine.runner().calls() {
        if call.command == "upload" {
            assert_eq!(
                call.env.get("CODECOV_TOKEN").map(String::as_str),
                Some("tok-5f2a9c")
            );
        } else {
            assert!(!call.env.contains_key("CODECOV_TOKEN"));
        }
        // Inherited copies are stripped from every step
        assert!(call.removed_env.contains(&"CODECOV_TOKEN".to_string()));
    }
}

#[tokio::test]
async fn test_missing_secret_fails_step_before_invocation() {
    let pipeline = pipeline(UPLOAD_YAML);
    let mut secrets = SecretStore::new();
    secrets.declare("CODECOV_TOKEN");
    let engine = engine(MockRunner::new(), secrets);

    let result = run_push(&engine, &pipeline).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.failed_jobs().len(), 2);
    for job in &result.jobs {
        assert_job_failed_at(&result, &job.job_id, 1);
        let upload = &job.steps[1];
        assert_eq!(upload.name, "Upload coverage");
        assert_eq!(upload.attempts, 0);
        assert!(upload
            .error
            .as_deref()
            .unwrap()
            .contains("missing required secret 'CODECOV_TOKEN'"));
        // The tool was never invoked
        assert_eq!(engine.runner().commands_for(&job.job_id), vec!["test"]);
    }
}

#[tokio::test]
async fn test_secret_value_redacted_from_captured_output() {
    let pipeline = pipeline(UPLOAD_YAML);
    let engine = engine(
        MockRunner::new()
            .echo_env("CODECOV_TOKEN")
            .fail("ci (A)", "upload"),
        store_with_token(),
    );

    let result = run_push(&engine, &pipeline).await;

    let upload = &job(&result, "ci (A)").steps[1];
    assert_eq!(upload.status, StepStatus::Failed);
    assert!(upload.stdout.contains("CODECOV_TOKEN=***"));
    assert!(!upload.stdout.contains("tok-5f2a9c"));

    let serialized = serde_json::to_string(&result).unwrap();
    assert!(!serialized.contains("tok-5f2a9c"));
}

#[tokio::test]
async fn test_secret_outside_env_is_rejected_at_load() {
    let yaml = r#"
name: "ci"
steps:
  - name: "Leak"
    run: "echo ${{ secrets.CODECOV_TOKEN }}"
"#;
    let err = matrixci::PipelineConfig::from_yaml(yaml).unwrap_err();
    assert!(format!("{:#}", err).contains("Leak"));
}

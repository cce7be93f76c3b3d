//! Shell subprocess runner - runs step commands through the configured shell

use crate::runner::{RunnerConfig, RunnerError, StepInvocation, StepOutput, StepRunner};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs each step as a child process of the configured shell
///
/// The child is killed if the returned future is dropped, which is how step
/// timeouts and cancellation stop a running tool.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    config: RunnerConfig,
}

impl ShellRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn command(&self, invocation: &StepInvocation) -> Command {
        let mut command = Command::new(&self.config.shell);
        command
            .args(&self.config.shell_args)
            .arg(&invocation.command)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for key in &invocation.remove_env {
            command.env_remove(key);
        }
        command.envs(&invocation.env);

        command
    }
}

#[async_trait]
impl StepRunner for ShellRunner {
    async fn run(&self, invocation: &StepInvocation) -> Result<StepOutput, RunnerError> {
        debug!(
            "Spawning {} for step '{}' in {}",
            self.config.shell,
            invocation.step_name,
            invocation.working_dir.display()
        );

        let output = self
            .command(invocation)
            .output()
            .await
            .map_err(|source| RunnerError::Spawn {
                program: self.config.shell.clone(),
                source,
            })?;

        let exit_code = output.status.code();
        if !output.status.success() {
            warn!(
                "Step '{}' exited with {}",
                invocation.step_name,
                exit_code.map_or_else(|| "a signal".to_string(), |c| format!("code {}", c))
            );
        }

        Ok(StepOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

//! Step invocation and output types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Error types for runner operations
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running step: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Everything needed to invoke one step's external tool
///
/// `Debug` never prints environment values since they may hold secrets.
#[derive(Clone)]
pub struct StepInvocation {
    /// Rendered step name (diagnostics only)
    pub step_name: String,

    /// Fully rendered shell command
    pub command: String,

    /// Variables set on the child process
    pub env: BTreeMap<String, String>,

    /// Inherited variables stripped from the child process
    pub remove_env: Vec<String>,

    /// Working directory for the child process
    pub working_dir: PathBuf,
}

impl std::fmt::Debug for StepInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepInvocation")
            .field("step_name", &self.step_name)
            .field("command", &self.command)
            .field("env_keys", &self.env.keys().collect::<Vec<_>>())
            .field("remove_env", &self.remove_env)
            .field("working_dir", &self.working_dir)
            .finish()
    }
}

/// Captured result of running an external tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutput {
    /// Exit code (`None` if terminated by a signal)
    pub exit_code: Option<i32>,

    pub stdout: String,
    pub stderr: String,
}

impl StepOutput {
    pub fn new(exit_code: i32) -> Self {
        Self {
            exit_code: Some(exit_code),
            ..Self::default()
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// The tool exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

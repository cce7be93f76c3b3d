//! Runner configuration

/// Configuration for the shell runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Shell program used to interpret step commands
    pub shell: String,

    /// Arguments placed before the command (e.g. `-c`)
    pub shell_args: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        if cfg!(windows) {
            Self {
                shell: "cmd".to_string(),
                shell_args: vec!["/C".to_string()],
            }
        } else {
            Self {
                shell: "sh".to_string(),
                shell_args: vec!["-c".to_string()],
            }
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different shell, e.g. `bash` with `["-eo", "pipefail", "-c"]`
    pub fn with_shell<I, S>(mut self, shell: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shell = shell.into();
        self.shell_args = args.into_iter().map(Into::into).collect();
        self
    }
}

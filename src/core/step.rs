//! Step domain model

use crate::core::{
    config::{ActionConfig, StepConfig},
    expression::{parse_expressions, Expression},
};
use std::collections::BTreeMap;
use std::time::Duration;

/// What a step invokes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// A shell command
    Run { command: String },

    /// A named action, resolved against the pipeline's `actions` at load time
    Uses {
        action: String,
        template: String,
        inputs: BTreeMap<String, String>,
    },
}

/// A single step in a job
#[derive(Debug, Clone)]
pub struct Step {
    /// Position in the job (0-based)
    pub index: usize,

    /// Optional identifier
    pub id: Option<String>,

    /// Name template (may reference matrix values)
    pub name: String,

    /// Command or action to invoke
    pub action: StepAction,

    /// Environment bindings, may reference secrets
    pub env: BTreeMap<String, String>,

    /// Failure is recorded but does not fail the job
    pub continue_on_error: bool,

    /// Timeout for a single attempt
    pub timeout: Duration,

    /// Extra attempts after a failure
    pub retries: usize,

    /// Directory relative to the job workspace
    pub working_directory: Option<String>,
}

/// Fallbacks for fields a step config leaves unset
#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub retries: usize,
    pub timeout_secs: u64,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            retries: 0,
            timeout_secs: crate::core::config::DEFAULT_STEP_TIMEOUT_SECS,
        }
    }
}

impl Step {
    /// Create a step from a step config
    ///
    /// `uses` references are resolved here; input defaults are merged under
    /// the step's `with` values.
    pub fn from_config(
        index: usize,
        config: &StepConfig,
        actions: &BTreeMap<String, ActionConfig>,
        defaults: &StepDefaults,
    ) -> anyhow::Result<Self> {
        let action = match (&config.run, &config.uses) {
            (Some(command), None) => StepAction::Run {
                command: command.clone(),
            },
            (None, Some(action_name)) => {
                let action = actions.get(action_name).ok_or_else(|| {
                    anyhow::anyhow!(
                        "Step '{}' uses unknown action '{}'",
                        config.label(),
                        action_name
                    )
                })?;

                let mut inputs: BTreeMap<String, String> = action
                    .inputs
                    .iter()
                    .filter_map(|(name, input)| {
                        input.default.as_ref().map(|d| (name.clone(), d.clone()))
                    })
                    .collect();
                inputs.extend(config.with.clone());

                StepAction::Uses {
                    action: action_name.clone(),
                    template: action.run.clone(),
                    inputs,
                }
            }
            _ => anyhow::bail!(
                "Step '{}' needs exactly one of 'run' or 'uses'",
                config.label()
            ),
        };

        Ok(Step {
            index,
            id: config.id.clone(),
            name: config.name.clone(),
            action,
            env: config.env.clone(),
            continue_on_error: config.continue_on_error,
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(defaults.timeout_secs)),
            retries: config.retries.unwrap_or(defaults.retries),
            working_directory: config.working_directory.clone(),
        })
    }

    /// Convenience constructor for a shell step
    pub fn run(index: usize, name: impl Into<String>, command: impl Into<String>) -> Self {
        Step {
            index,
            id: None,
            name: name.into(),
            action: StepAction::Run {
                command: command.into(),
            },
            env: BTreeMap::new(),
            continue_on_error: false,
            timeout: Duration::from_secs(StepDefaults::default().timeout_secs),
            retries: 0,
            working_directory: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }

    /// Secret names this step's env references
    pub fn required_secrets(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .env
            .values()
            .filter_map(|value| parse_expressions(value).ok())
            .flatten()
            .filter_map(|expression| match expression {
                Expression::Secret(name) => Some(name),
                _ => None,
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Short description of what the step invokes
    pub fn describe(&self) -> String {
        match &self.action {
            StepAction::Run { command } => command.clone(),
            StepAction::Uses { action, .. } => format!("uses {}", action),
        }
    }
}

//! Pipeline configuration from YAML

use crate::core::{
    expression::{parse_expressions, Expression},
    matrix::Matrix,
    Pipeline,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

/// Default per-step timeout (1 hour)
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 3600;

/// Default per-job timeout (6 hours)
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 21600;

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Trigger event kinds this pipeline responds to
    #[serde(default = "default_events")]
    pub on: Vec<String>,

    /// Matrix dimensions, in declaration order
    #[serde(default)]
    pub matrix: serde_yaml::Mapping,

    /// Cancel sibling jobs once any job fails
    #[serde(default)]
    pub fail_fast: bool,

    /// Maximum number of jobs running at once (unbounded if unset)
    #[serde(default)]
    pub max_parallel: Option<usize>,

    /// Defaults applied to every step and job
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Reusable actions referenced by `uses`
    #[serde(default)]
    pub actions: BTreeMap<String, ActionConfig>,

    /// Ordered step template shared by every job
    pub steps: Vec<StepConfig>,
}

/// Step and job defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Timeout for a single step (in seconds)
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,

    /// Timeout for a whole job (in seconds)
    #[serde(default)]
    pub job_timeout_secs: Option<u64>,

    /// Retries per step (0 = run once)
    #[serde(default)]
    pub retries: Option<usize>,
}

/// A named command template that steps can `use`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(default)]
    pub description: Option<String>,

    /// Declared inputs
    #[serde(default)]
    pub inputs: BTreeMap<String, InputConfig>,

    /// Command template, may reference `${{ inputs.<name> }}`
    pub run: String,
}

/// An action input declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default, deserialize_with = "optional_scalar")]
    pub default: Option<String>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Optional unique step identifier
    #[serde(default)]
    pub id: Option<String>,

    /// Human-readable step name (may reference matrix values)
    pub name: String,

    /// Shell command to run
    #[serde(default)]
    pub run: Option<String>,

    /// Action to invoke instead of a shell command
    #[serde(default)]
    pub uses: Option<String>,

    /// Inputs passed to the action
    #[serde(default, deserialize_with = "scalar_map")]
    pub with: BTreeMap<String, String>,

    /// Environment bindings, may reference `${{ secrets.<NAME> }}`
    #[serde(default, deserialize_with = "scalar_map")]
    pub env: BTreeMap<String, String>,

    /// Record a failure without failing the job
    #[serde(default)]
    pub continue_on_error: bool,

    /// Timeout for this step (overrides defaults)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Retries for this step (overrides defaults)
    #[serde(default)]
    pub retries: Option<usize>,

    /// Directory relative to the job workspace
    #[serde(default)]
    pub working_directory: Option<String>,
}

fn default_events() -> Vec<String> {
    vec!["push".to_string()]
}

/// Render a YAML scalar the way it was written (numbers, bools, strings)
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| match scalar_to_string(&value) {
            Some(s) => Ok((key, s)),
            None => Err(serde::de::Error::custom(format!(
                "value for '{}' must be a string, number or boolean",
                key
            ))),
        })
        .collect()
}

fn optional_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar_to_string(&value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("default must be a scalar")),
    }
}

fn valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl StepConfig {
    /// Label used in error messages: the id when present, else the name
    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the matrix from the raw YAML mapping
    pub fn matrix(&self) -> Result<Matrix> {
        let mut matrix = Matrix::new();

        for (key, value) in &self.matrix {
            let name = key
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("Matrix dimension names must be strings"))?;

            if !valid_identifier(name) {
                anyhow::bail!("Invalid matrix dimension name '{}'", name);
            }

            let Value::Sequence(items) = value else {
                anyhow::bail!("Matrix dimension '{}' must be a list of values", name);
            };

            if items.is_empty() {
                anyhow::bail!("Matrix dimension '{}' has no values", name);
            }

            let mut values = Vec::with_capacity(items.len());
            let mut seen = HashSet::new();
            for item in items {
                let value = scalar_to_string(item).ok_or_else(|| {
                    anyhow::anyhow!("Matrix dimension '{}' contains a non-scalar value", name)
                })?;
                if !seen.insert(value.clone()) {
                    anyhow::bail!("Matrix dimension '{}' lists '{}' more than once", name, value);
                }
                values.push(value);
            }

            matrix = matrix.with_dimension(name, values);
        }

        Ok(matrix)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.on.is_empty() {
            anyhow::bail!("Pipeline '{}' does not declare any trigger events", self.name);
        }

        let matrix = self.matrix()?;
        let dimensions: BTreeSet<&str> =
            matrix.dimensions().iter().map(|d| d.name.as_str()).collect();

        if self.max_parallel == Some(0) {
            anyhow::bail!("max_parallel must be at least 1");
        }

        // Actions: input names and template references
        for (action_name, action) in &self.actions {
            let declared: BTreeSet<&str> = action.inputs.keys().map(String::as_str).collect();
            for expression in parse_expressions(&action.run)
                .with_context(|| format!("Action '{}' has an invalid command", action_name))?
            {
                match expression {
                    Expression::Input(name) if !declared.contains(name.as_str()) => {
                        anyhow::bail!(
                            "Action '{}' references undeclared input '{}'",
                            action_name,
                            name
                        );
                    }
                    Expression::Secret(name) => {
                        anyhow::bail!(
                            "Action '{}' references secret '{}'; secrets may only be bound through step env",
                            action_name,
                            name
                        );
                    }
                    Expression::Matrix(key) if !dimensions.contains(key.as_str()) => {
                        anyhow::bail!(
                            "Action '{}' references unknown matrix dimension '{}'",
                            action_name,
                            key
                        );
                    }
                    _ => {}
                }
            }

            // Defaults are rendered in the step's scope, before inputs exist
            for (input_name, input) in &action.inputs {
                let Some(default) = &input.default else {
                    continue;
                };
                for expression in parse_expressions(default).with_context(|| {
                    format!(
                        "Action '{}' input '{}' has an invalid default",
                        action_name, input_name
                    )
                })? {
                    match expression {
                        Expression::Input(name) => {
                            anyhow::bail!(
                                "Action '{}' input '{}' default references input '{}'",
                                action_name,
                                input_name,
                                name
                            );
                        }
                        Expression::Secret(name) => {
                            anyhow::bail!(
                                "Action '{}' input '{}' default references secret '{}'; secrets may only be bound through step env",
                                action_name,
                                input_name,
                                name
                            );
                        }
                        Expression::Matrix(key) if !dimensions.contains(key.as_str()) => {
                            anyhow::bail!(
                                "Action '{}' input '{}' default references unknown matrix dimension '{}'",
                                action_name,
                                input_name,
                                key
                            );
                        }
                        _ => {}
                    }
                }
            }
        }

        // Check that all step IDs are unique
        let mut seen_ids = HashSet::new();
        for step in &self.steps {
            if let Some(id) = &step.id {
                if !seen_ids.insert(id) {
                    anyhow::bail!("Duplicate step ID: {}", id);
                }
            }
        }

        for step in &self.steps {
            let label = step.label();

            match (&step.run, &step.uses) {
                (Some(_), Some(_)) => {
                    anyhow::bail!("Step '{}' sets both 'run' and 'uses'", label)
                }
                (None, None) => anyhow::bail!("Step '{}' needs either 'run' or 'uses'", label),
                (Some(command), None) => {
                    if !step.with.is_empty() {
                        anyhow::bail!("Step '{}' sets 'with' but does not use an action", label);
                    }
                    self.check_expressions(label, "run", command, &dimensions, false)?;
                }
                (None, Some(action_name)) => {
                    let action = self.actions.get(action_name).ok_or_else(|| {
                        anyhow::anyhow!(
                            "Step '{}' uses unknown action '{}'",
                            label,
                            action_name
                        )
                    })?;

                    for key in step.with.keys() {
                        if !action.inputs.contains_key(key) {
                            anyhow::bail!(
                                "Step '{}' passes unknown input '{}' to action '{}'",
                                label,
                                key,
                                action_name
                            );
                        }
                    }

                    for (input_name, input) in &action.inputs {
                        if input.required
                            && input.default.is_none()
                            && !step.with.contains_key(input_name)
                        {
                            anyhow::bail!(
                                "Step '{}' is missing required input '{}' for action '{}'",
                                label,
                                input_name,
                                action_name
                            );
                        }
                    }

                    for (key, value) in &step.with {
                        self.check_expressions(label, key, value, &dimensions, false)?;
                    }
                }
            }

            self.check_expressions(label, "name", &step.name, &dimensions, false)?;

            for (key, value) in &step.env {
                self.check_expressions(label, key, value, &dimensions, true)?;
            }

            if step.timeout_secs == Some(0) {
                anyhow::bail!("Step '{}' has a zero timeout", label);
            }
        }

        Ok(())
    }

    fn check_expressions(
        &self,
        step: &str,
        field: &str,
        text: &str,
        dimensions: &BTreeSet<&str>,
        secrets_allowed: bool,
    ) -> Result<()> {
        let expressions = parse_expressions(text)
            .with_context(|| format!("Step '{}' field '{}' has an invalid expression", step, field))?;

        for expression in expressions {
            match expression {
                Expression::Matrix(key) if !dimensions.contains(key.as_str()) => {
                    anyhow::bail!(
                        "Step '{}' field '{}' references unknown matrix dimension '{}'",
                        step,
                        field,
                        key
                    );
                }
                Expression::Input(name) => {
                    anyhow::bail!(
                        "Step '{}' field '{}' references input '{}' outside an action",
                        step,
                        field,
                        name
                    );
                }
                Expression::Secret(name) if !secrets_allowed => {
                    anyhow::bail!(
                        "Step '{}' field '{}' references secret '{}'; secrets may only be bound through env",
                        step,
                        field,
                        name
                    );
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Every secret name referenced by any step
    pub fn secret_names(&self) -> BTreeSet<String> {
        self.steps
            .iter()
            .flat_map(|step| step.env.values())
            .filter_map(|value| parse_expressions(value).ok())
            .flatten()
            .filter_map(|expression| match expression {
                Expression::Secret(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Result<Pipeline> {
        Pipeline::from_config(self)
    }
}

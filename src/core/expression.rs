//! `${{ namespace.key }}` expression parsing and rendering

use crate::core::{matrix::MatrixCell, secret::SecretStore, trigger::Trigger};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

/// A reference found inside `${{ ... }}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// `${{ matrix.<dimension> }}`
    Matrix(String),
    /// `${{ inputs.<name> }}` (action templates only)
    Input(String),
    /// `${{ trigger.event }}` / `${{ trigger.ref }}`
    Trigger(String),
    /// `${{ secrets.<NAME> }}` (step env only)
    Secret(String),
}

/// Errors raised while parsing or resolving expressions
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("invalid expression '{0}'")]
    Invalid(String),

    #[error("unknown expression namespace '{0}'")]
    UnknownNamespace(String),

    #[error("matrix has no dimension '{0}'")]
    UnknownMatrixKey(String),

    #[error("unknown input '{0}'")]
    UnknownInput(String),

    #[error("unknown trigger field '{0}' (expected 'event' or 'ref')")]
    UnknownTriggerField(String),

    #[error("secret '{0}' may only be referenced from a step's env")]
    SecretNotAllowed(String),

    #[error("missing required secret '{0}'")]
    MissingSecret(String),
}

fn expression_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{\{(.*?)\}\}").expect("expression regex is valid"))
}

fn parse_one(inner: &str) -> Result<Expression, ExpressionError> {
    let trimmed = inner.trim();
    let (namespace, key) = trimmed
        .split_once('.')
        .ok_or_else(|| ExpressionError::Invalid(trimmed.to_string()))?;

    let valid_key = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if !valid_key {
        return Err(ExpressionError::Invalid(trimmed.to_string()));
    }

    match namespace {
        "matrix" => Ok(Expression::Matrix(key.to_string())),
        "inputs" => Ok(Expression::Input(key.to_string())),
        "trigger" => match key {
            "event" | "ref" => Ok(Expression::Trigger(key.to_string())),
            other => Err(ExpressionError::UnknownTriggerField(other.to_string())),
        },
        "secrets" => Ok(Expression::Secret(key.to_string())),
        other => Err(ExpressionError::UnknownNamespace(other.to_string())),
    }
}

/// Parse every expression in `text`
pub fn parse_expressions(text: &str) -> Result<Vec<Expression>, ExpressionError> {
    let mut expressions = Vec::new();
    let mut last_end = 0;

    for captures in expression_regex().captures_iter(text) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        check_unterminated(&text[last_end..whole.start()])?;
        expressions.push(parse_one(&captures[1])?);
        last_end = whole.end();
    }
    check_unterminated(&text[last_end..])?;

    Ok(expressions)
}

fn check_unterminated(fragment: &str) -> Result<(), ExpressionError> {
    match fragment.find("${{") {
        Some(pos) => Err(ExpressionError::Invalid(fragment[pos..].to_string())),
        None => Ok(()),
    }
}

/// Values an expression can resolve against
#[derive(Debug, Clone, Copy)]
pub struct ExpressionScope<'a> {
    matrix: &'a MatrixCell,
    trigger: Option<&'a Trigger>,
    inputs: Option<&'a BTreeMap<String, String>>,
    secrets: Option<&'a SecretStore>,
}

impl<'a> ExpressionScope<'a> {
    pub fn new(matrix: &'a MatrixCell) -> Self {
        Self {
            matrix,
            trigger: None,
            inputs: None,
            secrets: None,
        }
    }

    pub fn with_trigger(mut self, trigger: &'a Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_inputs(mut self, inputs: &'a BTreeMap<String, String>) -> Self {
        self.inputs = Some(inputs);
        self
    }

    /// Allow `secrets.*` references to resolve against `secrets`
    pub fn with_secrets(mut self, secrets: &'a SecretStore) -> Self {
        self.secrets = Some(secrets);
        self
    }

    fn resolve(&self, expression: &Expression) -> Result<String, ExpressionError> {
        match expression {
            Expression::Matrix(key) => self
                .matrix
                .get(key)
                .map(str::to_string)
                .ok_or_else(|| ExpressionError::UnknownMatrixKey(key.clone())),
            Expression::Input(name) => self
                .inputs
                .and_then(|inputs| inputs.get(name))
                .cloned()
                .ok_or_else(|| ExpressionError::UnknownInput(name.clone())),
            Expression::Trigger(field) => {
                let trigger = self
                    .trigger
                    .ok_or_else(|| ExpressionError::UnknownTriggerField(field.clone()))?;
                match field.as_str() {
                    "event" => Ok(trigger.event.clone()),
                    "ref" => Ok(trigger.source_ref.clone()),
                    other => Err(ExpressionError::UnknownTriggerField(other.to_string())),
                }
            }
            Expression::Secret(name) => {
                let secrets = self
                    .secrets
                    .ok_or_else(|| ExpressionError::SecretNotAllowed(name.clone()))?;
                secrets
                    .get(name)
                    .map(|v| v.expose().to_string())
                    .ok_or_else(|| ExpressionError::MissingSecret(name.clone()))
            }
        }
    }

    /// Substitute every expression in `text`
    pub fn render(&self, text: &str) -> Result<String, ExpressionError> {
        let mut rendered = String::with_capacity(text.len());
        let mut last_end = 0;

        for captures in expression_regex().captures_iter(text) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let before = &text[last_end..whole.start()];
            check_unterminated(before)?;
            rendered.push_str(before);
            rendered.push_str(&self.resolve(&parse_one(&captures[1])?)?);
            last_end = whole.end();
        }

        let rest = &text[last_end..];
        check_unterminated(rest)?;
        rendered.push_str(rest);

        Ok(rendered)
    }
}

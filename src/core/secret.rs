//! Secret handling
//!
//! Secrets are resolved once per run from the orchestrator's environment and
//! handed to individual steps only when a step's `env` references them.

use std::collections::{BTreeMap, BTreeSet};

/// Replacement text for redacted secret values
pub const REDACTED: &str = "***";

/// An opaque credential. Never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value, only for injecting it into a step's process
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretValue({})", REDACTED)
    }
}

/// Secrets known to a pipeline run
///
/// `known` holds every secret name the pipeline references, whether or not a
/// value is available. Those names are stripped from the inherited
/// environment of every step.
#[derive(Debug, Clone, Default)]
pub struct SecretStore {
    known: BTreeSet<String>,
    values: BTreeMap<String, SecretValue>,
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the given secret names from the process environment
    pub fn from_env<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut store = Self::new();
        for name in names {
            let name = name.as_ref();
            store.known.insert(name.to_string());
            match std::env::var(name) {
                Ok(value) if !value.is_empty() => {
                    store.values.insert(name.to_string(), SecretValue::new(value));
                }
                _ => {}
            }
        }
        store
    }

    /// Register a secret with a value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.known.insert(name.clone());
        self.values.insert(name, SecretValue::new(value));
    }

    /// Register a secret name with no value available
    pub fn declare(&mut self, name: impl Into<String>) {
        self.known.insert(name.into());
    }

    pub fn get(&self, name: &str) -> Option<&SecretValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// All referenced secret names, with or without a value
    pub fn known_names(&self) -> impl Iterator<Item = &str> {
        self.known.iter().map(String::as_str)
    }

    /// Names that are referenced but have no value
    pub fn missing(&self) -> Vec<&str> {
        self.known
            .iter()
            .filter(|name| !self.values.contains_key(*name))
            .map(String::as_str)
            .collect()
    }

    /// Replace every secret value occurring in `text` with `***`
    pub fn redact(&self, text: &str) -> String {
        // Longest values first so a secret containing another is fully masked
        let mut values: Vec<&str> = self
            .values
            .values()
            .map(SecretValue::expose)
            .filter(|v| !v.is_empty())
            .collect();
        values.sort_by_key(|v| std::cmp::Reverse(v.len()));

        let mut redacted = text.to_string();
        for value in values {
            redacted = redacted.replace(value, REDACTED);
        }
        redacted
    }
}

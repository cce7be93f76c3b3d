//! Build matrix and its Cartesian expansion

use serde::{Deserialize, Serialize};

/// A named matrix axis with its candidate values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub values: Vec<String>,
}

/// Mapping from dimension name to candidate values
///
/// Dimensions keep their declaration order. The effective run set is the
/// full Cartesian product of all dimensions; an empty matrix has exactly one
/// (empty) cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    dimensions: Vec<Dimension>,
}

/// One combination of dimension values
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatrixCell {
    values: Vec<(String, String)>,
}

impl Matrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dimension, keeping declaration order
    pub fn with_dimension<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dimensions.push(Dimension {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    /// Number of cells the matrix expands to
    pub fn size(&self) -> usize {
        self.dimensions.iter().map(|d| d.values.len()).product()
    }

    /// Compute the Cartesian product of all dimensions.
    ///
    /// The first dimension varies slowest and values keep their declared
    /// order, so the same matrix always yields the same sequence.
    pub fn cells(&self) -> Vec<MatrixCell> {
        let mut cells = vec![MatrixCell::default()];

        for dimension in &self.dimensions {
            let mut next = Vec::with_capacity(cells.len() * dimension.values.len());
            for prefix in &cells {
                for value in &dimension.values {
                    let mut cell = prefix.clone();
                    cell.values.push((dimension.name.clone(), value.clone()));
                    next.push(cell);
                }
            }
            cells = next;
        }

        cells
    }
}

impl MatrixCell {
    /// Look up the value assigned to a dimension
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Dimension/value pairs in declaration order
    pub fn values(&self) -> &[(String, String)] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Human readable label, e.g. `ubuntu-latest, 3.8`
    pub fn label(&self) -> String {
        self.values
            .iter()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Filesystem-safe identifier for the cell, e.g. `ubuntu-latest-3.8`
    pub fn slug(&self) -> String {
        let raw = self
            .values
            .iter()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join("-");

        raw.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Environment variables describing this cell (`MATRIX_<DIMENSION>`)
    pub fn env_vars(&self) -> Vec<(String, String)> {
        self.values
            .iter()
            .map(|(name, value)| (format!("MATRIX_{}", env_key(name)), value.clone()))
            .collect()
    }
}

impl From<Vec<(String, String)>> for MatrixCell {
    fn from(values: Vec<(String, String)>) -> Self {
        Self { values }
    }
}

fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

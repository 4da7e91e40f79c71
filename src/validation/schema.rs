//! Expected dataset layout

use crate::error::{PipelineError, Result};
use crate::utils::is_numeric_dtype;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Expected dataset layout, in the YAML shape
///
/// ```yaml
/// columns:
///   - having_IP_Address: int64
///   - Result: int64
/// numerical_columns:
///   - having_IP_Address
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    /// One single-entry `name: type` map per column
    #[serde(default)]
    pub columns: Vec<BTreeMap<String, String>>,
    #[serde(default)]
    pub numerical_columns: Vec<String>,
}

impl DatasetSchema {
    /// Load a schema file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PipelineError::ConfigError(format!("Cannot read schema {}: {}", path.as_ref().display(), e))
        })?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Column names in declaration order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .flat_map(|entry| entry.keys().map(String::as_str))
            .collect()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.iter().map(BTreeMap::len).sum()
    }

    /// Problems with `df` against this schema; empty when it conforms
    pub fn check(&self, df: &DataFrame, label: &str) -> Vec<String> {
        let mut problems = Vec::new();

        if df.width() != self.n_columns() {
            problems.push(format!(
                "{} has {} columns, schema expects {}",
                label,
                df.width(),
                self.n_columns()
            ));
        }

        for name in &self.numerical_columns {
            match df.column(name) {
                Err(_) => problems.push(format!("{} is missing numerical column '{}'", label, name)),
                Ok(col) if !is_numeric_dtype(col.dtype()) => problems.push(format!(
                    "{} column '{}' is {} rather than numeric",
                    label,
                    name,
                    col.dtype()
                )),
                Ok(_) => {}
            }
        }

        problems
    }
}

/// Problems when train and test do not carry the same columns
pub fn check_same_columns(train: &DataFrame, test: &DataFrame) -> Vec<String> {
    let train_cols: BTreeSet<String> = train.get_column_names().iter().map(|s| s.to_string()).collect();
    let test_cols: BTreeSet<String> = test.get_column_names().iter().map(|s| s.to_string()).collect();

    let mut problems = Vec::new();
    let only_train: Vec<&String> = train_cols.difference(&test_cols).collect();
    let only_test: Vec<&String> = test_cols.difference(&train_cols).collect();
    if !only_train.is_empty() {
        problems.push(format!("columns missing from test: {:?}", only_train));
    }
    if !only_test.is_empty() {
        problems.push(format!("columns missing from train: {:?}", only_test));
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
columns:
  - a: float64
  - b: float64
  - Result: int64
numerical_columns:
  - a
  - b
"#;

    #[test]
    fn test_parse_schema_yaml() {
        let schema: DatasetSchema = serde_yaml::from_str(SCHEMA).unwrap();
        assert_eq!(schema.n_columns(), 3);
        assert_eq!(schema.column_names(), vec!["a", "b", "Result"]);
        assert_eq!(schema.numerical_columns, vec!["a", "b"]);
    }

    #[test]
    fn test_conforming_frame() {
        let schema: DatasetSchema = serde_yaml::from_str(SCHEMA).unwrap();
        let df = df!("a" => [1.0, 2.0], "b" => [3.0, 4.0], "Result" => [1, 0]).unwrap();
        assert!(schema.check(&df, "train").is_empty());
    }

    #[test]
    fn test_schema_violations() {
        let schema: DatasetSchema = serde_yaml::from_str(SCHEMA).unwrap();
        let df = df!("a" => ["x", "y"], "Result" => [1, 0]).unwrap();
        let problems = schema.check(&df, "test");
        assert_eq!(problems.len(), 3);
        assert!(problems[0].contains("2 columns"));
    }

    #[test]
    fn test_same_columns() {
        let train = df!("a" => [1.0], "b" => [2.0]).unwrap();
        let test = df!("b" => [1.0], "a" => [2.0]).unwrap();
        assert!(check_same_columns(&train, &test).is_empty());

        let test = df!("a" => [1.0], "c" => [2.0]).unwrap();
        assert_eq!(check_same_columns(&train, &test).len(), 2);
    }
}

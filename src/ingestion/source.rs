//! Document sources and record-to-table conversion

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One schemaless record as returned by a document store
pub type Document = Map<String, Value>;

/// Key the document store adds to every record; never a feature
pub const DOCUMENT_ID_KEY: &str = "_id";

/// Read access to a document store
pub trait DocumentSource: Send + Sync {
    /// Fetch every document of a collection
    fn fetch_collection(&self, database: &str, collection: &str) -> Result<Vec<Document>>;
}

/// Documents held in memory, keyed by database and collection
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    collections: HashMap<(String, String), Vec<Document>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a collection
    pub fn with_collection(mut self, database: &str, collection: &str, documents: Vec<Document>) -> Self {
        self.collections
            .insert((database.to_string(), collection.to_string()), documents);
        self
    }
}

impl DocumentSource for InMemorySource {
    fn fetch_collection(&self, database: &str, collection: &str) -> Result<Vec<Document>> {
        Ok(self
            .collections
            .get(&(database.to_string(), collection.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// A collection exported as JSON lines, one document per line
///
/// The file stands for a single collection, so the names passed to
/// [`DocumentSource::fetch_collection`] are only used for logging.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentSource for JsonLinesSource {
    fn fetch_collection(&self, database: &str, collection: &str) -> Result<Vec<Document>> {
        let file = File::open(&self.path).map_err(|e| {
            PipelineError::IngestionError(format!("Cannot open {}: {}", self.path.display(), e))
        })?;

        let mut documents = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| {
                PipelineError::IngestionError(format!("Failed to read {}: {}", self.path.display(), e))
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&line) {
                Ok(Value::Object(doc)) => documents.push(doc),
                Ok(_) => {
                    return Err(PipelineError::IngestionError(format!(
                        "{}:{} is not a JSON object",
                        self.path.display(),
                        line_no + 1
                    )))
                }
                Err(e) => {
                    return Err(PipelineError::IngestionError(format!(
                        "{}:{}: {}",
                        self.path.display(),
                        line_no + 1,
                        e
                    )))
                }
            }
        }

        debug!(database, collection, n_documents = documents.len(), "Read JSON lines collection");
        Ok(documents)
    }
}

/// Numeric reading of a cell, if it has one
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build a table from documents.
///
/// Columns appear in first-seen key order and [`DOCUMENT_ID_KEY`] is dropped.
/// JSON nulls, absent keys and cells equal to `missing_sentinel` become nulls.
/// A column whose remaining cells all read as numbers is `Float64`; any other
/// column keeps its text.
pub fn documents_to_frame(documents: &[Document], missing_sentinel: &str) -> Result<DataFrame> {
    let mut names: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for doc in documents {
        for key in doc.keys() {
            if key != DOCUMENT_ID_KEY && seen.insert(key.as_str()) {
                names.push(key.as_str());
            }
        }
    }

    let columns = names
        .iter()
        .map(|&name| {
            let cells: Vec<Option<&Value>> = documents
                .iter()
                .map(|doc| match doc.get(name) {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) if s == missing_sentinel => None,
                    Some(v) => Some(v),
                })
                .collect();

            let numeric: Option<Vec<Option<f64>>> = cells
                .iter()
                .map(|cell| match cell {
                    None => Some(None),
                    Some(v) => as_number(v).map(Some),
                })
                .collect();

            match numeric {
                Some(values) => Column::new(name.into(), values),
                None => {
                    let text: Vec<Option<String>> =
                        cells.iter().map(|cell| cell.map(as_text)).collect();
                    Column::new(name.into(), text)
                }
            }
        })
        .collect::<Vec<Column>>();

    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::numeric_column;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_sentinel_and_nulls_become_missing() {
        let docs = vec![
            doc(json!({"_id": "a1", "having_IP_Address": 1, "URL_Length": "na", "Result": -1})),
            doc(json!({"_id": "a2", "having_IP_Address": -1, "URL_Length": 0, "Result": 1})),
            doc(json!({"_id": "a3", "having_IP_Address": null, "Result": 1})),
        ];

        let df = documents_to_frame(&docs, "na").unwrap();

        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, ["having_IP_Address", "URL_Length", "Result"]);
        assert_eq!(df.height(), 3);
        assert_eq!(
            numeric_column(&df, "URL_Length").unwrap(),
            vec![None, Some(0.0), None]
        );
        assert_eq!(
            numeric_column(&df, "having_IP_Address").unwrap(),
            vec![Some(1.0), Some(-1.0), None]
        );
    }

    #[test]
    fn test_numeric_strings_and_text_columns() {
        let docs = vec![
            doc(json!({"a": "1.5", "b": "x"})),
            doc(json!({"a": 2, "b": 3})),
        ];
        let df = documents_to_frame(&docs, "na").unwrap();

        assert_eq!(df.column("a").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("b").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_in_memory_source() {
        let source = InMemorySource::new().with_collection("db", "coll", vec![doc(json!({"a": 1}))]);
        assert_eq!(source.fetch_collection("db", "coll").unwrap().len(), 1);
        assert!(source.fetch_collection("db", "other").unwrap().is_empty());
    }

    #[test]
    fn test_json_lines_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(file, r#"{{"a": 1, "b": "na"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"a": 2, "b": 4}}"#).unwrap();

        let docs = JsonLinesSource::new(&path).fetch_collection("db", "coll").unwrap();
        assert_eq!(docs.len(), 2);

        let bad = dir.path().join("bad.jsonl");
        std::fs::write(&bad, "[1, 2]\n").unwrap();
        assert!(matches!(
            JsonLinesSource::new(&bad).fetch_collection("db", "coll"),
            Err(PipelineError::IngestionError(_))
        ));

        assert!(JsonLinesSource::new(dir.path().join("missing.jsonl"))
            .fetch_collection("db", "coll")
            .is_err());
    }
}

//! Tabular file loading and saving

use crate::error::{PipelineError, Result};
use crate::export::atomic_write;
use ndarray::Array2;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// CSV loader for stage hand-off tables
#[derive(Debug, Clone, Default)]
pub struct DataLoader {
    /// Rows scanned for schema inference; `None` scans the whole file
    infer_schema_length: Option<usize>,
    /// Field values read as nulls in addition to empty fields
    null_values: Vec<String>,
}

impl DataLoader {
    /// Create a loader that infers the schema from every row
    pub fn new() -> Self {
        Self {
            infer_schema_length: None,
            null_values: Vec::new(),
        }
    }

    /// Limit schema inference to the first `n` rows
    pub fn with_infer_schema_length(mut self, n: usize) -> Self {
        self.infer_schema_length = Some(n);
        self
    }

    /// Read these field values as nulls in every column
    pub fn with_null_values(mut self, values: Vec<String>) -> Self {
        self.null_values = values;
        self
    }

    /// Load a CSV file with a header row. Empty fields load as nulls.
    pub fn load_csv(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path).map_err(|e| {
            PipelineError::DataError(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let mut options = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length);
        if !self.null_values.is_empty() {
            let nulls = NullValues::AllColumns(self.null_values.iter().map(|v| v.as_str().into()).collect());
            options = options.map_parse_options(|parse| parse.with_null_values(Some(nulls.clone())));
        }

        options
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| PipelineError::DataError(format!("Failed to read {}: {}", path.display(), e)))
    }
}

/// Writes tables for stage hand-offs
pub struct DataSaver;

impl DataSaver {
    /// Save to CSV with a header row, replacing any previous file atomically.
    /// Nulls are written as empty fields.
    pub fn save_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
        atomic_write(path, |writer| {
            CsvWriter::new(writer)
                .include_header(true)
                .finish(df)
                .map_err(|e| PipelineError::DataError(format!("Failed to write {}: {}", path.display(), e)))
        })
    }
}

/// Whether a column of this type holds numbers
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Boolean
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Read one column as `f64` values; nulls become `None`.
///
/// The cast is strict: a column holding text that does not parse as a number
/// is an error rather than a column of nulls.
pub fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::FeatureNotFound(name.to_string()))?;
    let series = column
        .as_materialized_series()
        .strict_cast(&DataType::Float64)
        .map_err(|e| PipelineError::DataError(format!("Column '{}' is not numeric: {}", name, e)))?;
    let values = series
        .f64()
        .map_err(|e| PipelineError::DataError(e.to_string()))?
        .into_iter()
        .collect();
    Ok(values)
}

/// Extract named columns into a row-major matrix. Nulls become NaN, the
/// missing marker understood by the imputer.
pub fn frame_to_array(df: &DataFrame, columns: &[String]) -> Result<Array2<f64>> {
    let col_data: Vec<Vec<f64>> = columns
        .iter()
        .map(|name| {
            Ok(numeric_column(df, name)?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect())
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    Ok(Array2::from_shape_fn((df.height(), columns.len()), |(r, c)| col_data[c][r]))
}

//! Data validation stage
//!
//! Checks the ingested split against the expected layout, measures
//! train/test drift per numeric column and files the split under
//! `validated/` or `invalid/` accordingly.

mod drift;
mod schema;

pub use drift::{ColumnDrift, DriftReport, KolmogorovSmirnovTest, KsOutcome};
pub use schema::{check_same_columns, DatasetSchema};

use crate::artifact::{DataIngestionArtifact, DataValidationArtifact};
use crate::config::DataValidationConfig;
use crate::error::{Result, Stage, StageContext};
use crate::utils::{is_numeric_dtype, numeric_column, DataLoader, DataSaver};
use polars::prelude::*;
use tracing::{info, warn};

/// Validation stage
#[derive(Debug, Clone)]
pub struct DataValidation {
    config: DataValidationConfig,
}

impl DataValidation {
    pub fn new(config: DataValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DataValidationConfig {
        &self.config
    }

    /// Layout problems of the split; empty when it conforms
    pub fn validate_columns(&self, train: &DataFrame, test: &DataFrame) -> Vec<String> {
        let mut problems = check_same_columns(train, test);
        if let Some(schema) = &self.config.schema {
            problems.extend(schema.check(train, "train"));
            problems.extend(schema.check(test, "test"));
        }
        problems
    }

    /// KS drift of every numeric column present in both splits
    pub fn detect_dataset_drift(&self, base: &DataFrame, current: &DataFrame) -> Result<DriftReport> {
        let ks = KolmogorovSmirnovTest::new(self.config.drift_p_value_threshold);
        let mut report = DriftReport::new();

        for column in base.get_columns() {
            let name = column.name().as_str();
            let Ok(other) = current.column(name) else { continue };
            if !is_numeric_dtype(column.dtype()) || !is_numeric_dtype(other.dtype()) {
                continue;
            }

            let a: Vec<f64> = numeric_column(base, name)?.into_iter().flatten().collect();
            let b: Vec<f64> = numeric_column(current, name)?.into_iter().flatten().collect();
            if a.is_empty() || b.is_empty() {
                continue;
            }

            let outcome = ks.test(&a, &b)?;
            report.push(
                name,
                ColumnDrift {
                    p_value: outcome.p_value,
                    drift_status: ks.is_drift(&outcome),
                },
            );
        }

        Ok(report)
    }

    /// Run the stage
    pub fn initiate(&self, ingestion: &DataIngestionArtifact) -> Result<DataValidationArtifact> {
        self.run(ingestion).in_stage(Stage::Validation)
    }

    fn run(&self, ingestion: &DataIngestionArtifact) -> Result<DataValidationArtifact> {
        info!(train = %ingestion.train_file_path.display(), "Starting data validation");

        let loader = DataLoader::new();
        let mut train = loader.load_csv(&ingestion.train_file_path)?;
        let mut test = loader.load_csv(&ingestion.test_file_path)?;

        let mut messages = self.validate_columns(&train, &test);
        for message in &messages {
            warn!(%message, "Schema check failed");
        }

        let report = self.detect_dataset_drift(&train, &test)?;
        report.save(&self.config.drift_report_file_path)?;
        let drift_detected = report.drift_detected();
        if drift_detected {
            let drifted = report.drifted_columns();
            warn!(columns = ?drifted, "Drift detected between train and test");
            if self.config.fail_on_drift {
                messages.push(format!("drift detected in columns {:?}", drifted));
            }
        }

        let validation_status = messages.is_empty();
        let mut artifact = DataValidationArtifact {
            validation_status,
            valid_train_file_path: None,
            valid_test_file_path: None,
            invalid_train_file_path: None,
            invalid_test_file_path: None,
            drift_report_file_path: self.config.drift_report_file_path.clone(),
            drift_detected,
            messages,
        };

        if validation_status {
            DataSaver::save_csv(&mut train, &self.config.valid_train_file_path)?;
            DataSaver::save_csv(&mut test, &self.config.valid_test_file_path)?;
            artifact.valid_train_file_path = Some(self.config.valid_train_file_path.clone());
            artifact.valid_test_file_path = Some(self.config.valid_test_file_path.clone());
        } else {
            DataSaver::save_csv(&mut train, &self.config.invalid_train_file_path)?;
            DataSaver::save_csv(&mut test, &self.config.invalid_test_file_path)?;
            artifact.invalid_train_file_path = Some(self.config.invalid_train_file_path.clone());
            artifact.invalid_test_file_path = Some(self.config.invalid_test_file_path.clone());
        }

        info!(
            validation_status,
            drift_detected,
            columns_checked = report.len(),
            "Data validation complete"
        );
        Ok(artifact)
    }
}

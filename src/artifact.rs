//! Stage hand-off records
//!
//! Each stage returns one of these once everything it describes has been
//! written to disk. They are plain values: the next stage reads files through
//! the paths they carry and nothing else.

use crate::selection::{CandidateKind, Hyperparams};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output of data ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataIngestionArtifact {
    pub feature_store_file_path: PathBuf,
    pub train_file_path: PathBuf,
    pub test_file_path: PathBuf,
    pub n_train_rows: usize,
    pub n_test_rows: usize,
}

/// Output of data validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValidationArtifact {
    /// Schema checks passed (and drift, when drift is configured to fail)
    pub validation_status: bool,
    pub valid_train_file_path: Option<PathBuf>,
    pub valid_test_file_path: Option<PathBuf>,
    pub invalid_train_file_path: Option<PathBuf>,
    pub invalid_test_file_path: Option<PathBuf>,
    pub drift_report_file_path: PathBuf,
    pub drift_detected: bool,
    /// Human-readable reasons for a failed validation
    pub messages: Vec<String>,
}

/// Output of data transformation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTransformationArtifact {
    pub transformed_object_file_path: PathBuf,
    pub transformed_train_file_path: PathBuf,
    pub transformed_test_file_path: PathBuf,
}

/// Binary classification quality of one model on one split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetric {
    pub f1_score: f64,
    pub precision_score: f64,
    pub recall_score: f64,
}

/// Fit-quality diagnostic raised on the selected model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FitWarning {
    /// Train F1 exceeds test F1 by more than the threshold
    Overfit { train: f64, test: f64, gap: f64 },
    /// Test F1 exceeds train F1 by more than the threshold
    Underfit { train: f64, test: f64, gap: f64 },
    /// Test F1 below the expected score
    BelowExpected { test: f64, expected: f64 },
}

impl std::fmt::Display for FitWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitWarning::Overfit { train, test, gap } => write!(
                f,
                "overfitting: train f1 {:.4} exceeds test f1 {:.4} by {:.4}",
                train, test, gap
            ),
            FitWarning::Underfit { train, test, gap } => write!(
                f,
                "underfitting: test f1 {:.4} exceeds train f1 {:.4} by {:.4}",
                test, train, gap
            ),
            FitWarning::BelowExpected { test, expected } => write!(
                f,
                "test f1 {:.4} is below the expected score {:.4}",
                test, expected
            ),
        }
    }
}

/// Search outcome of one registered candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub kind: CandidateKind,
    pub best_params: Hyperparams,
    /// Mean cross-validated accuracy of `best_params` on the training split
    pub cv_score: f64,
    /// Selection metric of the refit model on the test split
    pub test_score: f64,
    /// Number of combinations evaluated
    pub n_evaluated: usize,
}

/// Output of model selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTrainerArtifact {
    pub trained_model_file_path: PathBuf,
    pub train_metric_artifact: ClassificationMetric,
    pub test_metric_artifact: ClassificationMetric,
    pub best_model: CandidateKind,
    /// One entry per registered candidate, in registration order
    pub model_report: Vec<CandidateScore>,
    pub fit_warnings: Vec<FitWarning>,
}

impl ModelTrainerArtifact {
    /// Report entry of the selected model
    pub fn best_score(&self) -> Option<&CandidateScore> {
        self.model_report.iter().find(|s| s.kind == self.best_model)
    }
}

//! Error types for the training pipeline
//!
//! Every fallible operation returns [`PipelineError`]. Stage entry points tag
//! the error with the [`Stage`] it escaped from, so the driver can report which
//! part of the run failed without any source-location introspection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Pipeline stage, used to tag errors at stage boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Ingestion,
    Validation,
    Transformation,
    ModelTrainer,
    Inference,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Ingestion => "data ingestion",
            Stage::Validation => "data validation",
            Stage::Transformation => "data transformation",
            Stage::ModelTrainer => "model trainer",
            Stage::Inference => "inference",
        };
        f.write_str(name)
    }
}

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("Ingestion error: {0}")]
    IngestionError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Transformation error: {0}")]
    TransformationError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Stage this error was tagged with, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost untagged cause
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            PipelineError::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Wrap with a stage tag; already-tagged errors keep their original stage
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            tagged @ PipelineError::Stage { .. } => tagged,
            other => PipelineError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }
}

/// Attach a stage tag to a fallible result
pub trait StageContext<T> {
    fn in_stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageContext<T> for Result<T> {
    fn in_stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| e.in_stage(stage))
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(err: serde_yaml::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for PipelineError {
    fn from(err: bincode::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PipelineError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelineError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::TrainingError("no usable candidate".to_string());
        assert_eq!(err.to_string(), "Training error: no usable candidate");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PipelineError = io_err.into();
        assert!(matches!(err, PipelineError::IoError(_)));
    }

    #[test]
    fn test_stage_tagging() {
        let result: Result<()> = Err(PipelineError::FeatureNotFound("Result".to_string()));
        let err = result.in_stage(Stage::Transformation).unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Transformation));
        assert!(matches!(err.root_cause(), PipelineError::FeatureNotFound(_)));
        assert_eq!(
            err.to_string(),
            "data transformation stage failed: Feature not found: Result"
        );
    }

    #[test]
    fn test_stage_tagging_keeps_first_stage() {
        let err = PipelineError::Cancelled
            .in_stage(Stage::ModelTrainer)
            .in_stage(Stage::Ingestion);
        assert_eq!(err.stage(), Some(Stage::ModelTrainer));
    }
}

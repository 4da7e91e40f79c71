//! Network security training pipeline
//!
//! Turns the raw records of a document-store collection into a deployable
//! binary classifier: ingest → validate → transform → select model → persist
//! an inference bundle (fitted preprocessor + fitted model).
//!
//! # Modules
//!
//! ## Stages
//! - [`ingestion`] - Collection export, feature store snapshot, train/test split
//! - [`validation`] - Schema checks and Kolmogorov–Smirnov drift report
//! - [`transformation`] - Label remapping and the fitted KNN imputation pipeline
//! - [`selection`] - Candidate registry, parallel hyperparameter search, fit check
//! - [`pipeline`] - Driver that runs the stages in order
//!
//! ## Models
//! - [`training`] - Classifier families, cross-validation and metrics
//! - [`imputation`] - Missing value imputation
//! - [`inference`] - Preprocessor and model bundled for prediction
//!
//! ## Infrastructure
//! - [`config`] - Run settings and per-stage configuration
//! - [`artifact`] - Stage hand-off records
//! - [`export`] - Versioned, atomically written artifact files
//! - [`utils`] - CSV loading and saving
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Configuration and hand-offs
pub mod artifact;
pub mod config;

// Stages
pub mod ingestion;
pub mod pipeline;
pub mod selection;
pub mod transformation;
pub mod validation;

// Models
pub mod imputation;
pub mod inference;
pub mod training;

// Utilities
pub mod export;
pub mod utils;

// Services
pub mod cli;

pub use error::{PipelineError, Result, Stage};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{PipelineError, Result, Stage, StageContext};

    // Configuration
    pub use crate::config::{
        FitPolicy, ImputerSettings, ModelTrainerSettings, PipelineSettings, SearchStrategy, SelectionMetric,
        TrainingPipelineConfig,
    };

    // Artifacts
    pub use crate::artifact::{
        CandidateScore, ClassificationMetric, DataIngestionArtifact, DataTransformationArtifact,
        DataValidationArtifact, FitWarning, ModelTrainerArtifact,
    };

    // Stages
    pub use crate::ingestion::{DataIngestion, Document, DocumentSource, InMemorySource, JsonLinesSource};
    pub use crate::pipeline::{PipelineOutcome, TrainingPipeline};
    pub use crate::selection::{CancellationToken, CandidateKind, CandidateRegistry, ModelTrainer, SearchSpace};
    pub use crate::transformation::{DataTransformation, FeaturePipeline};
    pub use crate::validation::DataValidation;

    // Models
    pub use crate::imputation::{Imputer, KNNImputer, WeightScheme};
    pub use crate::inference::InferenceBundle;
    pub use crate::training::{Model, TrainedModel};
}

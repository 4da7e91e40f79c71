//! Training pipeline driver
//!
//! Runs ingestion, validation, transformation and model selection in order on
//! the calling thread. Each stage only sees the artifact of the one before it.

use crate::artifact::{
    DataIngestionArtifact, DataTransformationArtifact, DataValidationArtifact, ModelTrainerArtifact,
};
use crate::config::TrainingPipelineConfig;
use crate::error::{PipelineError, Result, Stage};
use crate::ingestion::{DataIngestion, DocumentSource};
use crate::selection::{CancellationToken, CandidateRegistry, ModelTrainer};
use crate::transformation::DataTransformation;
use crate::validation::DataValidation;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info};

/// Artifacts of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub run_id: String,
    pub data_ingestion: DataIngestionArtifact,
    pub data_validation: DataValidationArtifact,
    pub data_transformation: DataTransformationArtifact,
    pub model_trainer: ModelTrainerArtifact,
}

/// Sequences the four training stages
#[derive(Debug, Clone)]
pub struct TrainingPipeline {
    config: TrainingPipelineConfig,
    registry: CandidateRegistry,
    cancel: CancellationToken,
}

impl TrainingPipeline {
    pub fn new(config: TrainingPipelineConfig) -> Self {
        Self {
            config,
            registry: CandidateRegistry::standard(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the standard candidate set
    pub fn with_registry(mut self, registry: CandidateRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Token that stops model selection at its next work unit
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &TrainingPipelineConfig {
        &self.config
    }

    pub fn start_data_ingestion(&self, source: &dyn DocumentSource) -> Result<DataIngestionArtifact> {
        DataIngestion::new(self.config.data_ingestion()).initiate(source)
    }

    pub fn start_data_validation(&self, ingestion: &DataIngestionArtifact) -> Result<DataValidationArtifact> {
        DataValidation::new(self.config.data_validation()).initiate(ingestion)
    }

    pub fn start_data_transformation(
        &self,
        validation: &DataValidationArtifact,
    ) -> Result<DataTransformationArtifact> {
        DataTransformation::new(self.config.data_transformation()).initiate(validation)
    }

    pub fn start_model_trainer(&self, transformation: &DataTransformationArtifact) -> Result<ModelTrainerArtifact> {
        ModelTrainer::new(self.config.model_trainer())
            .with_registry(self.registry.clone())
            .with_cancellation(self.cancel.clone())
            .initiate(transformation)
    }

    /// Run every stage, stopping at the first failure
    pub fn run(&self, source: &dyn DocumentSource) -> Result<PipelineOutcome> {
        let start = Instant::now();
        info!(
            pipeline = %self.config.pipeline_name,
            run_id = %self.config.run_id,
            artifact_root = %self.config.artifact_root.display(),
            "Training pipeline started"
        );

        let outcome = self.run_stages(source);
        match &outcome {
            Ok(outcome) => info!(
                run_id = %outcome.run_id,
                best_model = %outcome.model_trainer.best_model,
                test_f1 = outcome.model_trainer.test_metric_artifact.f1_score,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Training pipeline finished"
            ),
            Err(e) => error!(stage = ?e.stage(), error = %e, "Training pipeline failed"),
        }
        outcome
    }

    fn run_stages(&self, source: &dyn DocumentSource) -> Result<PipelineOutcome> {
        let data_ingestion = self.start_data_ingestion(source)?;
        let data_validation = self.start_data_validation(&data_ingestion)?;
        if !data_validation.validation_status {
            return Err(PipelineError::ValidationError(format!(
                "Data validation failed: {}",
                data_validation.messages.join("; ")
            ))
            .in_stage(Stage::Validation));
        }
        let data_transformation = self.start_data_transformation(&data_validation)?;
        let model_trainer = self.start_model_trainer(&data_transformation)?;

        Ok(PipelineOutcome {
            run_id: self.config.run_id.clone(),
            data_ingestion,
            data_validation,
            data_transformation,
            model_trainer,
        })
    }
}

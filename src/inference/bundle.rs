//! Fitted preprocessor and selected model, persisted as one file

use crate::error::{PipelineError, Result, Stage, StageContext};
use crate::export::{load_sections, save_sections, Section};
use crate::training::{Model, TrainedModel};
use crate::transformation::{FeaturePipeline, PREPROCESSOR_SECTION, PREPROCESSOR_VERSION};
use crate::utils::{frame_to_array, DataLoader, DataSaver};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Section kind of the persisted model
pub const MODEL_SECTION: &str = "model";
/// Layout version of the persisted model
pub const MODEL_VERSION: u32 = 1;

/// Column appended by [`InferenceBundle::predict_csv`]
pub const PREDICTION_COLUMN: &str = "predicted_column";

/// Read-only pairing of a fitted [`FeaturePipeline`] and a fitted model
#[derive(Debug, Clone)]
pub struct InferenceBundle {
    preprocessor: FeaturePipeline,
    model: TrainedModel,
}

impl InferenceBundle {
    /// Pair two fitted components; only model selection builds bundles
    pub(crate) fn new(preprocessor: FeaturePipeline, model: TrainedModel) -> Result<Self> {
        if !preprocessor.is_fitted() {
            return Err(PipelineError::InferenceError("Preprocessor is not fitted".to_string()));
        }
        if !model.is_fitted() {
            return Err(PipelineError::InferenceError(format!("{} is not fitted", model.name())));
        }
        Ok(Self { preprocessor, model })
    }

    pub fn preprocessor(&self) -> &FeaturePipeline {
        &self.preprocessor
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    /// Training feature names, in the column order `predict` expects
    pub fn feature_names(&self) -> &[String] {
        self.preprocessor.feature_names()
    }

    /// Transform raw features and predict one label per row
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.predict_features(x).in_stage(Stage::Inference)
    }

    fn predict_features(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let expected = self.preprocessor.n_features();
        if x.ncols() != expected {
            return Err(PipelineError::InferenceError(format!(
                "Expected {} features, got {}",
                expected,
                x.ncols()
            )));
        }
        let transformed = self.preprocessor.transform(x)?;
        self.model.predict(&transformed)
    }

    /// Predict from a table holding at least the training feature columns
    pub fn predict_frame(&self, df: &DataFrame) -> Result<Array1<f64>> {
        let x = frame_to_array(df, self.feature_names()).in_stage(Stage::Inference)?;
        debug!(rows = x.nrows(), "Predicting from frame");
        self.predict(&x)
    }

    /// Predict every row of a CSV file and write it back with the predictions
    /// as an extra column. Fields equal to `missing_sentinel` load as missing
    /// values, as empty fields do. Returns the number of rows.
    pub fn predict_csv(&self, input: &Path, output: &Path, missing_sentinel: &str) -> Result<usize> {
        self.write_predictions(input, output, missing_sentinel)
            .in_stage(Stage::Inference)
    }

    fn write_predictions(&self, input: &Path, output: &Path, missing_sentinel: &str) -> Result<usize> {
        let mut df = DataLoader::new()
            .with_null_values(vec![missing_sentinel.to_string()])
            .load_csv(input)?;
        let predictions = self.predict_frame(&df)?;
        df.with_column(Column::new(PREDICTION_COLUMN.into(), predictions.to_vec()))?;
        DataSaver::save_csv(&mut df, output)?;
        info!(rows = df.height(), output = %output.display(), "Wrote predictions");
        Ok(df.height())
    }

    /// Persist both components as separately versioned sections
    pub fn save(&self, path: &Path) -> Result<()> {
        let sections = vec![
            Section::encode(PREPROCESSOR_SECTION, PREPROCESSOR_VERSION, &self.preprocessor)?,
            Section::encode(MODEL_SECTION, MODEL_VERSION, &self.model)?,
        ];
        save_sections(path, sections)
    }

    /// Load a bundle written by [`InferenceBundle::save`]
    pub fn load(path: &Path) -> Result<Self> {
        Self::read(path).in_stage(Stage::Inference)
    }

    fn read(path: &Path) -> Result<Self> {
        let sections = load_sections(path)?;
        let find = |kind: &str| {
            sections
                .iter()
                .find(|s| s.kind == kind)
                .ok_or_else(|| PipelineError::SerializationError(format!("Bundle has no {} section", kind)))
        };
        let preprocessor: FeaturePipeline = find(PREPROCESSOR_SECTION)?.decode(PREPROCESSOR_SECTION, PREPROCESSOR_VERSION)?;
        let model: TrainedModel = find(MODEL_SECTION)?.decode(MODEL_SECTION, MODEL_VERSION)?;
        Self::new(preprocessor, model)
    }
}

//! Data transformation stage
//!
//! Separates the label from the features, fits the feature pipeline on the
//! training split only and writes `[features | label]` arrays for both splits
//! together with the fitted pipeline.

mod pipeline;

pub use pipeline::{FeaturePipeline, PipelineStep, IMPUTER_STEP, PREPROCESSOR_SECTION, PREPROCESSOR_VERSION};

use crate::artifact::{DataTransformationArtifact, DataValidationArtifact};
use crate::config::DataTransformationConfig;
use crate::error::{PipelineError, Result, Stage, StageContext};
use crate::export::save_array;
use crate::utils::{frame_to_array, numeric_column, DataLoader};
use ndarray::{concatenate, Array1, Array2, Axis};
use polars::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// Label value the source uses for the negative class
pub const NEGATIVE_LABEL_SENTINEL: f64 = -1.0;

/// Read the label column as `{0, 1}`, mapping the `-1` sentinel to `0`
pub fn binary_labels(df: &DataFrame, target_column: &str) -> Result<Array1<f64>> {
    let raw = numeric_column(df, target_column)?;
    raw.into_iter()
        .enumerate()
        .map(|(row, value)| match value {
            Some(v) if v == NEGATIVE_LABEL_SENTINEL || v == 0.0 => Ok(0.0),
            Some(v) if v == 1.0 => Ok(1.0),
            Some(v) => Err(PipelineError::TransformationError(format!(
                "Label '{}' has value {} in row {}; expected -1, 0 or 1",
                target_column, v, row
            ))),
            None => Err(PipelineError::TransformationError(format!(
                "Label '{}' is missing in row {}",
                target_column, row
            ))),
        })
        .collect()
}

/// Feature columns of the training table: everything but the label, in table order
pub fn feature_columns(df: &DataFrame, target_column: &str) -> Result<Vec<String>> {
    if df.column(target_column).is_err() {
        return Err(PipelineError::FeatureNotFound(target_column.to_string()));
    }
    Ok(df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .filter(|name| name != target_column)
        .collect())
}

/// Append the label as the last column
pub fn append_label(features: &Array2<f64>, labels: &Array1<f64>) -> Result<Array2<f64>> {
    let label_col = labels.view().insert_axis(Axis(1));
    Ok(concatenate(Axis(1), &[features.view(), label_col])?)
}

/// Transformation stage
#[derive(Debug, Clone)]
pub struct DataTransformation {
    config: DataTransformationConfig,
}

impl DataTransformation {
    pub fn new(config: DataTransformationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DataTransformationConfig {
        &self.config
    }

    /// Unfitted preprocessing pipeline
    pub fn get_data_transformer_object(&self) -> FeaturePipeline {
        debug!(
            n_neighbors = self.config.imputer.n_neighbors,
            weights = ?self.config.imputer.weights,
            "Building KNN imputation pipeline"
        );
        FeaturePipeline::knn_imputation(&self.config.imputer)
    }

    /// Run the stage
    pub fn initiate(&self, validation: &DataValidationArtifact) -> Result<DataTransformationArtifact> {
        self.run(validation).in_stage(Stage::Transformation)
    }

    fn run(&self, validation: &DataValidationArtifact) -> Result<DataTransformationArtifact> {
        let (train_path, test_path) = validated_paths(validation)?;
        info!(train = %train_path.display(), "Starting data transformation");

        let loader = DataLoader::new();
        let train_df = loader.load_csv(&train_path)?;
        let test_df = loader.load_csv(&test_path)?;

        let target = self.config.target_column.as_str();
        let features = feature_columns(&train_df, target)?;
        if test_df.column(target).is_err() {
            return Err(PipelineError::FeatureNotFound(target.to_string()));
        }

        let train_x = frame_to_array(&train_df, &features)?;
        let test_x = frame_to_array(&test_df, &features)?;
        let train_y = binary_labels(&train_df, target)?;
        let test_y = binary_labels(&test_df, target)?;

        let missing_train = train_x.iter().filter(|v| v.is_nan()).count();
        let missing_test = test_x.iter().filter(|v| v.is_nan()).count();
        debug!(missing_train, missing_test, n_features = features.len(), "Loaded features");

        let mut preprocessor = self.get_data_transformer_object();
        let train_features = preprocessor.fit_transform(&train_x, features)?;
        let test_features = preprocessor.transform(&test_x)?;

        let train_arr = append_label(&train_features, &train_y)?;
        let test_arr = append_label(&test_features, &test_y)?;

        save_array(&self.config.transformed_train_file_path, &train_arr)?;
        save_array(&self.config.transformed_test_file_path, &test_arr)?;
        preprocessor.save(&self.config.transformed_object_file_path)?;

        info!(
            train_shape = ?train_arr.dim(),
            test_shape = ?test_arr.dim(),
            dropped = ?preprocessor.dropped_features(),
            "Data transformation complete"
        );

        Ok(DataTransformationArtifact {
            transformed_object_file_path: self.config.transformed_object_file_path.clone(),
            transformed_train_file_path: self.config.transformed_train_file_path.clone(),
            transformed_test_file_path: self.config.transformed_test_file_path.clone(),
        })
    }
}

fn validated_paths(validation: &DataValidationArtifact) -> Result<(PathBuf, PathBuf)> {
    if !validation.validation_status {
        return Err(PipelineError::TransformationError(format!(
            "Refusing to transform data that failed validation: {}",
            validation.messages.join("; ")
        )));
    }
    match (&validation.valid_train_file_path, &validation.valid_test_file_path) {
        (Some(train), Some(test)) => Ok((train.clone(), test.clone())),
        _ => Err(PipelineError::TransformationError(
            "Validation artifact carries no validated files".to_string(),
        )),
    }
}

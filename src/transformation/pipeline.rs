//! Fitted feature preprocessing

use crate::config::ImputerSettings;
use crate::error::{PipelineError, Result};
use crate::export::{load_object, save_object};
use crate::imputation::{Imputer, KNNImputer};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Section kind of a persisted preprocessor
pub const PREPROCESSOR_SECTION: &str = "preprocessor";
/// Layout version of a persisted preprocessor
pub const PREPROCESSOR_VERSION: u32 = 2;

/// Name of the imputation step in the standard pipeline
pub const IMPUTER_STEP: &str = "imputer";

/// One transform of a [`FeaturePipeline`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineStep {
    KnnImputer(KNNImputer),
}

impl PipelineStep {
    fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            PipelineStep::KnnImputer(imputer) => imputer.fit_transform(x),
        }
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            PipelineStep::KnnImputer(imputer) => imputer.transform(x),
        }
    }

    /// Names of the columns a fitted step emits, given its input names
    fn output_names(&self, input: &[String]) -> Vec<String> {
        match self {
            PipelineStep::KnnImputer(imputer) => match imputer.valid_features() {
                Some(valid) => valid.iter().map(|&j| input[j].clone()).collect(),
                None => input.to_vec(),
            },
        }
    }
}

/// Ordered, named feature transforms fitted together on training features
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturePipeline {
    steps: Vec<(String, PipelineStep)>,
    /// Training feature names in column order
    feature_names: Vec<String>,
    /// Names of the emitted columns; inputs dropped by a step are absent
    output_feature_names: Vec<String>,
    is_fitted: bool,
}

impl FeaturePipeline {
    /// Empty pipeline
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            feature_names: Vec::new(),
            output_feature_names: Vec::new(),
            is_fitted: false,
        }
    }

    /// The standard pipeline: a single KNN imputation step
    pub fn knn_imputation(settings: &ImputerSettings) -> Self {
        let imputer = KNNImputer::new(settings.n_neighbors).with_weights(settings.weights);
        Self::new().with_step(IMPUTER_STEP, PipelineStep::KnnImputer(imputer))
    }

    /// Append a step
    pub fn with_step(mut self, name: &str, step: PipelineStep) -> Self {
        self.steps.push((name.to_string(), step));
        self
    }

    pub fn steps(&self) -> &[(String, PipelineStep)] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&PipelineStep> {
        self.steps.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Width of the input the pipeline accepts
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn output_feature_names(&self) -> &[String] {
        &self.output_feature_names
    }

    /// Width of the matrix the pipeline emits
    pub fn n_output_features(&self) -> usize {
        self.output_feature_names.len()
    }

    /// Input features that no step carries through to the output
    pub fn dropped_features(&self) -> Vec<&str> {
        self.feature_names
            .iter()
            .filter(|name| !self.output_feature_names.contains(name))
            .map(String::as_str)
            .collect()
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Fit every step in order and return the transformed training matrix
    pub fn fit_transform(&mut self, x: &Array2<f64>, feature_names: Vec<String>) -> Result<Array2<f64>> {
        if feature_names.len() != x.ncols() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} feature names", x.ncols()),
                actual: format!("{} feature names", feature_names.len()),
            });
        }

        let mut current = x.clone();
        let mut names = feature_names.clone();
        for (step_name, step) in self.steps.iter_mut() {
            current = step.fit_transform(&current)?;
            let emitted = step.output_names(&names);
            if emitted.len() < names.len() {
                let dropped: Vec<&String> = names.iter().filter(|n| !emitted.contains(n)).collect();
                warn!(step = %step_name, ?dropped, "Dropped features with no observed training value");
            }
            names = emitted;
        }

        self.feature_names = feature_names;
        self.output_feature_names = names;
        self.is_fitted = true;
        Ok(current)
    }

    /// Fit on training features
    pub fn fit(&mut self, x: &Array2<f64>, feature_names: Vec<String>) -> Result<&mut Self> {
        self.fit_transform(x, feature_names)?;
        Ok(self)
    }

    /// Apply the fitted steps; never refits
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(PipelineError::ModelNotFitted);
        }
        if x.ncols() != self.n_features() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", self.n_features()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut current = x.clone();
        for (_, step) in &self.steps {
            current = step.transform(&current)?;
        }
        Ok(current)
    }

    /// Persist the fitted pipeline
    pub fn save(&self, path: &Path) -> Result<()> {
        if !self.is_fitted {
            return Err(PipelineError::ModelNotFitted);
        }
        save_object(path, PREPROCESSOR_SECTION, PREPROCESSOR_VERSION, self)
    }

    /// Load a pipeline written by [`FeaturePipeline::save`]
    pub fn load(path: &Path) -> Result<Self> {
        load_object(path, PREPROCESSOR_SECTION, PREPROCESSOR_VERSION)
    }
}

impl Default for FeaturePipeline {
    fn default() -> Self {
        Self::new()
    }
}

//! Gradient Boosting implementation
//!
//! Binary gradient boosted decision trees. Each round fits a regression tree to
//! the negative gradient of the loss and adds its shrunken output to the raw
//! score of every training row.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::decision_tree::DecisionTree;
use crate::error::{PipelineError, Result};

/// Probability clamp used for the initial raw score
const PROBA_EPS: f64 = 1e-15;

/// Boosting loss for binary labels in {0, 1}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoostingLoss {
    /// Binomial deviance; raw score is log-odds
    LogLoss,
    /// AdaBoost exponential loss on labels mapped to {-1, +1}
    Exponential,
}

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Fraction of rows each tree is fit on
    pub subsample: f64,
    pub loss: BoostingLoss,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            loss: BoostingLoss::LogLoss,
            random_state: Some(42),
        }
    }
}

/// Gradient Boosting Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    trees: Vec<DecisionTree>,
    initial_score: f64,
    n_features: usize,
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            initial_score: 0.0,
            n_features: 0,
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    fn validate(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(PipelineError::TrainingError(
                "Cannot fit gradient boosting on an empty matrix".to_string(),
            ));
        }
        if y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(PipelineError::TrainingError(
                "Gradient boosting expects labels in {0, 1}".to_string(),
            ));
        }
        let c = &self.config;
        if c.n_estimators == 0 {
            return Err(PipelineError::InvalidParameter {
                name: "n_estimators".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !(c.subsample > 0.0 && c.subsample <= 1.0) {
            return Err(PipelineError::InvalidParameter {
                name: "subsample".to_string(),
                value: c.subsample.to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }
        if !(c.learning_rate > 0.0) {
            return Err(PipelineError::InvalidParameter {
                name: "learning_rate".to_string(),
                value: c.learning_rate.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Fit binary classification
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.validate(x, y)?;

        let n_samples = x.nrows();
        let n_features = x.ncols();

        let p = y.mean().unwrap_or(0.5).clamp(PROBA_EPS, 1.0 - PROBA_EPS);
        self.initial_score = match self.config.loss {
            BoostingLoss::LogLoss => (p / (1.0 - p)).ln(),
            BoostingLoss::Exponential => 0.5 * (p / (1.0 - p)).ln(),
        };

        let mut raw = Array1::from_elem(n_samples, self.initial_score);

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        self.trees.clear();
        self.n_features = n_features;

        for _ in 0..self.config.n_estimators {
            let residuals = self.negative_gradient(y, &raw);

            let sample_indices = self.subsample_indices(n_samples, &mut rng);
            let x_sub = x.select(Axis(0), &sample_indices);
            let y_sub = residuals.select(Axis(0), &sample_indices);

            // Train tree on residuals
            let mut tree = DecisionTree::new_regressor()
                .with_max_depth(self.config.max_depth)
                .with_min_samples_leaf(self.config.min_samples_leaf);
            tree.fit(&x_sub, &y_sub)?;

            // Rows left out of the subsample still move with the ensemble
            let tree_pred = tree.predict(x)?;
            raw.scaled_add(self.config.learning_rate, &tree_pred);

            self.trees.push(tree);
        }

        Ok(())
    }

    fn negative_gradient(&self, y: &Array1<f64>, raw: &Array1<f64>) -> Array1<f64> {
        match self.config.loss {
            BoostingLoss::LogLoss => y
                .iter()
                .zip(raw.iter())
                .map(|(&yi, &f)| yi - sigmoid(f))
                .collect(),
            BoostingLoss::Exponential => y
                .iter()
                .zip(raw.iter())
                .map(|(&yi, &f)| {
                    let sign = 2.0 * yi - 1.0;
                    sign * (-sign * f).exp()
                })
                .collect(),
        }
    }

    /// Raw additive score of each row
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut raw = Array1::from_elem(x.nrows(), self.initial_score);
        for tree in &self.trees {
            raw.scaled_add(self.config.learning_rate, &tree.predict(x)?);
        }
        Ok(raw)
    }

    /// Predict class labels; a zero score goes to class 0
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let raw = self.decision_function(x)?;
        Ok(raw.mapv(|f| if f > 0.0 { 1.0 } else { 0.0 }))
    }

    fn subsample_indices(&self, n: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        if self.config.subsample >= 1.0 {
            return (0..n).collect();
        }
        let sample_size = (((n as f64) * self.config.subsample).ceil() as usize).clamp(1, n);
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(rng);
        indices.truncate(sample_size);
        indices.sort_unstable();
        indices
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

//! Linear model implementations

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Logistic regression for binary classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Fitted coefficients
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept
    pub intercept: Option<f64>,
    /// Regularization strength (L2)
    pub alpha: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance
    pub tol: f64,
    /// Learning rate
    pub learning_rate: f64,
    /// Iterations run by the last fit
    n_iter: usize,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    /// Create a new logistic regression model
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            alpha: 0.01,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
            n_iter: 0,
        }
    }

    /// Set maximum iterations
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set learning rate
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Sigmoid function
    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    /// Fit the model using gradient descent
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(PipelineError::TrainingError(
                "Cannot fit logistic regression on an empty matrix".to_string(),
            ));
        }
        if y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(PipelineError::TrainingError(
                "Logistic regression expects labels in {0, 1}".to_string(),
            ));
        }

        // Initialize weights
        let mut weights = Array1::<f64>::zeros(n_features);
        let mut bias = 0.0;

        let lr = self.learning_rate;
        let alpha = self.alpha;
        let mut n_iter = 0;

        // Gradient descent
        for _ in 0..self.max_iter {
            n_iter += 1;

            // Forward pass
            let linear = x.dot(&weights) + bias;
            let predictions = Self::sigmoid(&linear);

            // Compute gradients
            let errors = &predictions - y;
            let dw = (x.t().dot(&errors) / n_samples as f64) + (alpha * &weights);
            let db = errors.mean().unwrap_or(0.0);

            // Check convergence
            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }

            // Update weights
            weights.scaled_add(-lr, &dw);
            bias -= lr * db;
        }

        if !bias.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(PipelineError::TrainingError(
                "Logistic regression diverged; lower the learning rate".to_string(),
            ));
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);
        self.n_iter = n_iter;

        Ok(self)
    }

    /// Predict probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        if x.ncols() != coefficients.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let intercept = self.intercept.unwrap_or(0.0);

        let linear = x.dot(coefficients) + intercept;
        Ok(Self::sigmoid(&linear))
    }

    /// Predict class labels
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_logistic_regression() {
        // Simple linearly separable data
        let x = array![[1.0, 1.0], [1.5, 1.5], [2.0, 2.0], [5.0, 5.0], [5.5, 5.5], [6.0, 6.0],];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut model = LogisticRegression::new().with_max_iter(1000).with_learning_rate(0.5);

        model.fit(&x, &y).unwrap();
        assert!(model.is_fitted());

        let predictions = model.predict(&x).unwrap();
        let accuracy = predictions
            .iter()
            .zip(y.iter())
            .filter(|(p, a)| p == a)
            .count() as f64
            / y.len() as f64;
        assert!(accuracy >= 0.8, "Accuracy should be >= 0.8, got {}", accuracy);
    }

    #[test]
    fn test_predict_proba() {
        let x = array![[0.0, 0.0], [10.0, 10.0]];
        let y = array![0.0, 1.0];

        let mut model = LogisticRegression::new().with_max_iter(500);
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap();

        // First sample should have low probability, second should have high
        assert!(proba[0] < 0.5);
        assert!(proba[1] > 0.5);
    }

    #[test]
    fn test_converges_early_on_trivial_problem() {
        // balanced labels on an all-zero feature: the gradient vanishes at the start
        let x = Array2::<f64>::zeros((4, 1));
        let y = array![0.0, 1.0, 0.0, 1.0];
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.n_iter(), 1);
        assert_eq!(model.predict_proba(&x).unwrap(), array![0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_rejects_bad_labels_and_widths() {
        let x = array![[1.0], [2.0]];
        let mut model = LogisticRegression::new();
        assert!(model.fit(&x, &array![0.0, 3.0]).is_err());
        assert!(matches!(model.predict(&x), Err(PipelineError::ModelNotFitted)));

        model.fit(&x, &array![0.0, 1.0]).unwrap();
        assert!(model.predict(&array![[1.0, 2.0]]).is_err());
    }
}

//! AdaBoost (Adaptive Boosting) implementation
//!
//! AdaBoost builds an ensemble of weak learners (decision stumps), weighting
//! misclassified samples more heavily in subsequent rounds.

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// A single decision stump: splits on one feature at one threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Stump {
    feature_index: usize,
    threshold: f64,
    /// Class index predicted when feature <= threshold
    left_class: usize,
    /// Class index predicted when feature > threshold
    right_class: usize,
}

impl Stump {
    fn predict_sample(&self, sample: ArrayView1<f64>) -> usize {
        if sample[self.feature_index] <= self.threshold {
            self.left_class
        } else {
            self.right_class
        }
    }
}

/// AdaBoost Classifier (SAMME variant, supports multi-class)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaBoostClassifier {
    pub n_estimators: usize,
    pub learning_rate: f64,
    stumps: Vec<Stump>,
    alphas: Vec<f64>,
    classes: Vec<f64>,
    n_features: usize,
}

impl Default for AdaBoostClassifier {
    fn default() -> Self {
        Self::new(50, 1.0)
    }
}

impl AdaBoostClassifier {
    pub fn new(n_estimators: usize, learning_rate: f64) -> Self {
        Self {
            n_estimators,
            learning_rate,
            stumps: Vec::new(),
            alphas: Vec::new(),
            classes: Vec::new(),
            n_features: 0,
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.stumps.is_empty()
    }

    /// Number of stumps kept after early stopping
    pub fn n_stumps(&self) -> usize {
        self.stumps.len()
    }

    /// Find the stump with the lowest weighted error.
    ///
    /// `orders[f]` lists the rows sorted by feature `f`, so each feature is a
    /// single pass accumulating per-class weight on the left of the threshold.
    /// Ties keep the earlier feature, then the lower threshold.
    fn fit_stump(
        x: &Array2<f64>,
        class_idx: &[usize],
        weights: &Array1<f64>,
        n_classes: usize,
        orders: &[Vec<usize>],
    ) -> Option<(Stump, f64)> {
        let mut total = vec![0.0; n_classes];
        for (&c, &w) in class_idx.iter().zip(weights.iter()) {
            total[c] += w;
        }
        let total_weight: f64 = total.iter().sum();

        let mut best: Option<(Stump, f64)> = None;

        for (f, order) in orders.iter().enumerate() {
            let mut left = vec![0.0; n_classes];

            for pos in 0..order.len().saturating_sub(1) {
                let row = order[pos];
                left[class_idx[row]] += weights[row];

                let value = x[[row, f]];
                let next = x[[order[pos + 1], f]];
                if next <= value {
                    continue;
                }

                for left_class in 0..n_classes {
                    for right_class in 0..n_classes {
                        if left_class == right_class && n_classes > 1 {
                            continue;
                        }
                        let correct = left[left_class] + (total[right_class] - left[right_class]);
                        let error = (total_weight - correct).max(0.0);
                        if best.as_ref().map_or(true, |(_, e)| error < *e) {
                            let mut threshold = value + (next - value) / 2.0;
                            if threshold >= next {
                                threshold = value;
                            }
                            best = Some((
                                Stump {
                                    feature_index: f,
                                    threshold,
                                    left_class,
                                    right_class,
                                },
                                error,
                            ));
                        }
                    }
                }
            }
        }
        best
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 || self.n_estimators == 0 {
            return Err(PipelineError::TrainingError(
                "AdaBoost needs at least one sample and one estimator".to_string(),
            ));
        }

        // Collect unique classes
        let mut classes: Vec<f64> = y.to_vec();
        classes.sort_by(f64::total_cmp);
        classes.dedup();
        let class_idx: Vec<usize> = y.iter().map(|v| classes.partition_point(|c| c < v)).collect();
        let n_classes = classes.len();
        if n_classes < 2 {
            return Err(PipelineError::TrainingError(
                "AdaBoost needs at least two classes".to_string(),
            ));
        }

        let orders: Vec<Vec<usize>> = (0..x.ncols())
            .map(|f| {
                let mut order: Vec<usize> = (0..n_samples).collect();
                order.sort_by(|&a, &b| x[[a, f]].total_cmp(&x[[b, f]]));
                order
            })
            .collect();

        let mut weights = Array1::from_elem(n_samples, 1.0 / n_samples as f64);
        let mut stumps = Vec::new();
        let mut alphas = Vec::new();
        let random_guess = 1.0 - 1.0 / n_classes as f64;

        for round in 0..self.n_estimators {
            let Some((stump, _)) = Self::fit_stump(x, &class_idx, &weights, n_classes, &orders) else {
                break;
            };

            let incorrect: Vec<bool> = x
                .rows()
                .into_iter()
                .zip(class_idx.iter())
                .map(|(row, &c)| stump.predict_sample(row) != c)
                .collect();
            let error: f64 = incorrect
                .iter()
                .zip(weights.iter())
                .filter(|(wrong, _)| **wrong)
                .map(|(_, w)| w)
                .sum::<f64>()
                / weights.sum();

            // Perfect stump: keep it and stop
            if error <= 0.0 {
                stumps.push(stump);
                alphas.push(1.0);
                break;
            }
            // No better than chance: nothing more to learn
            if error >= random_guess {
                if round == 0 {
                    return Err(PipelineError::TrainingError(
                        "First AdaBoost stump is no better than chance".to_string(),
                    ));
                }
                break;
            }

            // SAMME estimator weight
            let alpha = self.learning_rate * (((1.0 - error) / error).ln() + (n_classes as f64 - 1.0).ln());

            for (w, wrong) in weights.iter_mut().zip(incorrect.iter()) {
                if *wrong {
                    *w *= alpha.exp();
                }
            }
            // Normalize weights
            let w_sum = weights.sum();
            if w_sum > 0.0 {
                weights /= w_sum;
            }

            stumps.push(stump);
            alphas.push(alpha);
        }

        if stumps.is_empty() {
            return Err(PipelineError::TrainingError(
                "No split available: every feature is constant".to_string(),
            ));
        }

        self.stumps = stumps;
        self.alphas = alphas;
        self.classes = classes;
        self.n_features = x.ncols();
        Ok(self)
    }

    /// Weighted vote of the stumps; the lowest class wins ties
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted() {
            return Err(PipelineError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let n_classes = self.classes.len();
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let mut class_scores = vec![0.0f64; n_classes];
                for (stump, &alpha) in self.stumps.iter().zip(self.alphas.iter()) {
                    class_scores[stump.predict_sample(row)] += alpha;
                }
                let mut best = 0;
                for (k, &s) in class_scores.iter().enumerate() {
                    if s > class_scores[best] {
                        best = k;
                    }
                }
                self.classes[best]
            })
            .collect())
    }
}

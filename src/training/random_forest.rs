//! Random Forest implementation

use super::decision_tree::{Criterion, DecisionTree, MaxFeatures};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Random Forest classifier over bootstrap samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    /// Individual trees
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features examined at each split (sqrt by default)
    pub max_features: MaxFeatures,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Random state
    pub random_state: Option<u64>,
    /// Classes seen during fit, ascending
    classes: Vec<f64>,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new_classifier(100)
    }
}

impl RandomForest {
    /// Create a new classifier forest
    pub fn new_classifier(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            criterion: Criterion::Gini,
            random_state: None,
            classes: Vec::new(),
        }
    }

    /// Set max features strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();

        if n_samples != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(PipelineError::TrainingError(
                "Cannot fit a forest on an empty matrix".to_string(),
            ));
        }
        if self.n_estimators == 0 {
            return Err(PipelineError::InvalidParameter {
                name: "n_estimators".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let mut classes: Vec<f64> = y.to_vec();
        classes.sort_by(f64::total_cmp);
        classes.dedup();
        self.classes = classes;

        // Tree i draws from its own stream, so the forest does not depend on scheduling
        let base_seed = self.random_state.unwrap_or(42);

        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let sample_indices: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();

                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot = y.select(Axis(0), &sample_indices);

                let mut tree = DecisionTree::new_classifier();
                if let Some(d) = self.max_depth {
                    tree = tree.with_max_depth(d);
                }
                tree = tree
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_criterion(self.criterion)
                    .with_max_features(self.max_features)
                    .with_random_state(rng.gen());

                tree.fit(&x_boot, &y_boot)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;

        Ok(self)
    }

    /// Predict the class with the highest mean tree probability; the lower
    /// class wins ties.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (k, &p) in row.iter().enumerate() {
                    if p > row[best] {
                        best = k;
                    }
                }
                self.classes[best]
            })
            .collect())
    }

    /// Predict class probabilities, one column per class
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }

        let per_tree: Vec<Array2<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba(x))
            .collect::<Result<Vec<_>>>()?;

        let mut proba = Array2::<f64>::zeros((x.nrows(), self.classes.len()));
        for (tree, tree_proba) in self.trees.iter().zip(per_tree.iter()) {
            // a bootstrap sample may miss a class; map tree columns onto forest columns
            for (tree_col, class) in tree.classes().iter().enumerate() {
                let col = self.classes.partition_point(|c| c < class);
                let mut target = proba.column_mut(col);
                target += &tree_proba.column(tree_col);
            }
        }
        proba /= self.trees.len() as f64;

        Ok(proba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier() {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.1],
            [0.2, 0.2],
            [1.0, 1.0],
            [1.1, 1.1],
            [1.2, 1.2],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut rf = RandomForest::new_classifier(10).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let predictions = rf.predict(&x).unwrap();

        let accuracy = predictions
            .iter()
            .zip(y.iter())
            .filter(|(p, a)| (*p - *a).abs() < 0.5)
            .count() as f64
            / y.len() as f64;

        assert!(accuracy >= 0.8, "Accuracy too low: {}", accuracy);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let x = Array2::from_shape_fn((40, 4), |(i, j)| ((i * 3 + j * 11) % 13) as f64);
        let y: Array1<f64> = (0..40).map(|i| (i % 3 == 0) as u8 as f64).collect();

        let predict = |seed| {
            let mut rf = RandomForest::new_classifier(8)
                .with_max_features(MaxFeatures::Log2)
                .with_random_state(seed);
            rf.fit(&x, &y).unwrap();
            rf.predict_proba(&x).unwrap()
        };

        assert_eq!(predict(7), predict(7));
    }

    #[test]
    fn test_predict_proba() {
        let x = array![[0.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 1.0];

        let mut rf = RandomForest::new_classifier(10).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let proba = rf.predict_proba(&x).unwrap();

        assert_eq!(proba.nrows(), 2);
        assert_eq!(proba.ncols(), 2);

        // Probabilities should sum to 1
        for i in 0..proba.nrows() {
            let row_sum: f64 = proba.row(i).sum();
            assert!((row_sum - 1.0).abs() < 1e-6, "Row {} sum: {}", i, row_sum);
        }
    }

    #[test]
    fn test_unfitted() {
        let rf = RandomForest::new_classifier(3);
        assert!(matches!(rf.predict(&array![[1.0]]), Err(PipelineError::ModelNotFitted)));
    }
}

//! Model trait and the closed set of fitted classifiers

use super::adaboost::AdaBoostClassifier;
use super::decision_tree::DecisionTree;
use super::gradient_boosting::GradientBoostingClassifier;
use super::linear_models::LogisticRegression;
use super::random_forest::RandomForest;
use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Trait for ML models
pub trait Model: Send + Sync {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Make predictions
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    fn is_fitted(&self) -> bool;
}

impl Model for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        DecisionTree::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        DecisionTree::predict(self, x)
    }

    fn is_fitted(&self) -> bool {
        DecisionTree::is_fitted(self)
    }
}

impl Model for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        RandomForest::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RandomForest::predict(self, x)
    }

    fn is_fitted(&self) -> bool {
        RandomForest::is_fitted(self)
    }
}

impl Model for GradientBoostingClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        GradientBoostingClassifier::fit(self, x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        GradientBoostingClassifier::predict(self, x)
    }

    fn is_fitted(&self) -> bool {
        GradientBoostingClassifier::is_fitted(self)
    }
}

impl Model for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        LogisticRegression::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        LogisticRegression::predict(self, x)
    }

    fn is_fitted(&self) -> bool {
        LogisticRegression::is_fitted(self)
    }
}

impl Model for AdaBoostClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        AdaBoostClassifier::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        AdaBoostClassifier::predict(self, x)
    }

    fn is_fitted(&self) -> bool {
        AdaBoostClassifier::is_fitted(self)
    }
}

/// A classifier of one of the supported families
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrainedModel {
    RandomForest(RandomForest),
    DecisionTree(DecisionTree),
    GradientBoosting(GradientBoostingClassifier),
    LogisticRegression(LogisticRegression),
    AdaBoost(AdaBoostClassifier),
}

impl TrainedModel {
    fn inner(&self) -> &dyn Model {
        match self {
            TrainedModel::RandomForest(m) => m,
            TrainedModel::DecisionTree(m) => m,
            TrainedModel::GradientBoosting(m) => m,
            TrainedModel::LogisticRegression(m) => m,
            TrainedModel::AdaBoost(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Model {
        match self {
            TrainedModel::RandomForest(m) => m,
            TrainedModel::DecisionTree(m) => m,
            TrainedModel::GradientBoosting(m) => m,
            TrainedModel::LogisticRegression(m) => m,
            TrainedModel::AdaBoost(m) => m,
        }
    }

    /// Family name, for logs
    pub fn name(&self) -> &'static str {
        match self {
            TrainedModel::RandomForest(_) => "Random Forest",
            TrainedModel::DecisionTree(_) => "Decision Tree",
            TrainedModel::GradientBoosting(_) => "Gradient Boosting",
            TrainedModel::LogisticRegression(_) => "Logistic Regression",
            TrainedModel::AdaBoost(_) => "AdaBoost",
        }
    }
}

impl Model for TrainedModel {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict(x)
    }

    fn is_fitted(&self) -> bool {
        self.inner().is_fitted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::accuracy_score;
    use ndarray::array;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = array![[0.0, 1.0], [0.5, 0.8], [1.0, 0.9], [4.0, 0.1], [4.5, 0.3], [5.0, 0.2]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_every_family_fits_through_the_enum() {
        let (x, y) = data();
        let mut models = vec![
            TrainedModel::RandomForest(RandomForest::new_classifier(5).with_random_state(1)),
            TrainedModel::DecisionTree(DecisionTree::new_classifier()),
            TrainedModel::GradientBoosting(GradientBoostingClassifier::new(Default::default())),
            TrainedModel::LogisticRegression(LogisticRegression::new()),
            TrainedModel::AdaBoost(AdaBoostClassifier::new(10, 1.0)),
        ];

        for model in models.iter_mut() {
            assert!(!model.is_fitted());
            model.fit(&x, &y).unwrap();
            assert!(model.is_fitted(), "{} not fitted", model.name());
            let pred = model.predict(&x).unwrap();
            assert_eq!(accuracy_score(&y, &pred), 1.0, "{}", model.name());
        }
    }

    #[test]
    fn test_serde_roundtrip_keeps_predictions() {
        let (x, y) = data();
        let mut model = TrainedModel::DecisionTree(DecisionTree::new_classifier());
        model.fit(&x, &y).unwrap();

        let bytes = bincode::serialize(&model).unwrap();
        let restored: TrainedModel = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored.predict(&x).unwrap(), model.predict(&x).unwrap());
    }
}

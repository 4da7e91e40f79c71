//! Model training module
//!
//! The classifier families model selection searches over:
//! - Decision trees and Random Forests
//! - Gradient boosting
//! - Logistic regression
//! - AdaBoost
//!
//! plus the stratified k-fold splitter and the metrics used to score them.

mod models;
pub mod adaboost;
pub mod cross_validation;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod linear_models;
pub mod metrics;
pub mod random_forest;

pub use adaboost::AdaBoostClassifier;
pub use cross_validation::{CVSplit, StratifiedKFold};
pub use decision_tree::{Criterion, DecisionTree, MaxFeatures, TreeNode};
pub use gradient_boosting::{BoostingLoss, GradientBoostingClassifier, GradientBoostingConfig};
pub use linear_models::LogisticRegression;
pub use metrics::{accuracy_score, classification_metric, r2_score, selection_score};
pub use models::{Model, TrainedModel};
pub use random_forest::RandomForest;

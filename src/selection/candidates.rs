//! Candidate families, their hyperparameters and search spaces

use crate::error::{PipelineError, Result};
use crate::training::{
    AdaBoostClassifier, BoostingLoss, Criterion, DecisionTree, GradientBoostingClassifier,
    GradientBoostingConfig, LogisticRegression, MaxFeatures, RandomForest, TrainedModel,
};
use serde::{Deserialize, Serialize};

/// Classifier families considered by model selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateKind {
    RandomForest,
    DecisionTree,
    GradientBoosting,
    LogisticRegression,
    AdaBoost,
}

impl std::fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CandidateKind::RandomForest => "Random Forest",
            CandidateKind::DecisionTree => "Decision Tree",
            CandidateKind::GradientBoosting => "Gradient Boosting",
            CandidateKind::LogisticRegression => "Logistic Regression",
            CandidateKind::AdaBoost => "AdaBoost",
        };
        f.write_str(name)
    }
}

/// One concrete hyperparameter combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Hyperparams {
    RandomForest {
        max_features: MaxFeatures,
        n_estimators: usize,
    },
    DecisionTree {
        criterion: Criterion,
        max_features: MaxFeatures,
    },
    GradientBoosting {
        learning_rate: f64,
        loss: BoostingLoss,
        n_estimators: usize,
        subsample: f64,
    },
    LogisticRegression,
    AdaBoost {
        learning_rate: f64,
        n_estimators: usize,
    },
}

impl Hyperparams {
    pub fn kind(&self) -> CandidateKind {
        match self {
            Hyperparams::RandomForest { .. } => CandidateKind::RandomForest,
            Hyperparams::DecisionTree { .. } => CandidateKind::DecisionTree,
            Hyperparams::GradientBoosting { .. } => CandidateKind::GradientBoosting,
            Hyperparams::LogisticRegression => CandidateKind::LogisticRegression,
            Hyperparams::AdaBoost { .. } => CandidateKind::AdaBoost,
        }
    }

    /// Unfitted model configured with these hyperparameters
    pub fn build(&self, seed: u64) -> TrainedModel {
        match *self {
            Hyperparams::RandomForest { max_features, n_estimators } => TrainedModel::RandomForest(
                RandomForest::new_classifier(n_estimators)
                    .with_max_features(max_features)
                    .with_random_state(seed),
            ),
            Hyperparams::DecisionTree { criterion, max_features } => TrainedModel::DecisionTree(
                DecisionTree::new_classifier()
                    .with_criterion(criterion)
                    .with_max_features(max_features)
                    .with_random_state(seed),
            ),
            Hyperparams::GradientBoosting {
                learning_rate,
                loss,
                n_estimators,
                subsample,
            } => TrainedModel::GradientBoosting(GradientBoostingClassifier::new(GradientBoostingConfig {
                n_estimators,
                learning_rate,
                subsample,
                loss,
                random_state: Some(seed),
                ..Default::default()
            })),
            Hyperparams::LogisticRegression => TrainedModel::LogisticRegression(LogisticRegression::new()),
            Hyperparams::AdaBoost {
                learning_rate,
                n_estimators,
            } => TrainedModel::AdaBoost(AdaBoostClassifier::new(n_estimators, learning_rate)),
        }
    }
}

/// Values to try for each hyperparameter of one family.
///
/// [`SearchSpace::grid`] enumerates the cartesian product with parameters in
/// alphabetical order, the last one varying fastest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SearchSpace {
    RandomForest {
        max_features: Vec<MaxFeatures>,
        n_estimators: Vec<usize>,
    },
    DecisionTree {
        criterion: Vec<Criterion>,
        max_features: Vec<MaxFeatures>,
    },
    GradientBoosting {
        learning_rate: Vec<f64>,
        loss: Vec<BoostingLoss>,
        n_estimators: Vec<usize>,
        subsample: Vec<f64>,
    },
    /// No tunable parameters: the default model is the only combination
    LogisticRegression,
    AdaBoost {
        learning_rate: Vec<f64>,
        n_estimators: Vec<usize>,
    },
}

impl SearchSpace {
    pub fn kind(&self) -> CandidateKind {
        match self {
            SearchSpace::RandomForest { .. } => CandidateKind::RandomForest,
            SearchSpace::DecisionTree { .. } => CandidateKind::DecisionTree,
            SearchSpace::GradientBoosting { .. } => CandidateKind::GradientBoosting,
            SearchSpace::LogisticRegression => CandidateKind::LogisticRegression,
            SearchSpace::AdaBoost { .. } => CandidateKind::AdaBoost,
        }
    }

    /// Every combination, in grid order
    pub fn grid(&self) -> Vec<Hyperparams> {
        match self {
            SearchSpace::RandomForest {
                max_features,
                n_estimators,
            } => max_features
                .iter()
                .flat_map(|&mf| {
                    n_estimators.iter().map(move |&n| Hyperparams::RandomForest {
                        max_features: mf,
                        n_estimators: n,
                    })
                })
                .collect(),
            SearchSpace::DecisionTree {
                criterion,
                max_features,
            } => criterion
                .iter()
                .flat_map(|&c| {
                    max_features.iter().map(move |&mf| Hyperparams::DecisionTree {
                        criterion: c,
                        max_features: mf,
                    })
                })
                .collect(),
            SearchSpace::GradientBoosting {
                learning_rate,
                loss,
                n_estimators,
                subsample,
            } => {
                let mut grid = Vec::with_capacity(self.n_combinations());
                for &lr in learning_rate {
                    for &l in loss {
                        for &n in n_estimators {
                            for &s in subsample {
                                grid.push(Hyperparams::GradientBoosting {
                                    learning_rate: lr,
                                    loss: l,
                                    n_estimators: n,
                                    subsample: s,
                                });
                            }
                        }
                    }
                }
                grid
            }
            SearchSpace::LogisticRegression => vec![Hyperparams::LogisticRegression],
            SearchSpace::AdaBoost {
                learning_rate,
                n_estimators,
            } => learning_rate
                .iter()
                .flat_map(|&lr| {
                    n_estimators.iter().map(move |&n| Hyperparams::AdaBoost {
                        learning_rate: lr,
                        n_estimators: n,
                    })
                })
                .collect(),
        }
    }

    pub fn n_combinations(&self) -> usize {
        match self {
            SearchSpace::RandomForest {
                max_features,
                n_estimators,
            } => max_features.len() * n_estimators.len(),
            SearchSpace::DecisionTree {
                criterion,
                max_features,
            } => criterion.len() * max_features.len(),
            SearchSpace::GradientBoosting {
                learning_rate,
                loss,
                n_estimators,
                subsample,
            } => learning_rate.len() * loss.len() * n_estimators.len() * subsample.len(),
            SearchSpace::LogisticRegression => 1,
            SearchSpace::AdaBoost {
                learning_rate,
                n_estimators,
            } => learning_rate.len() * n_estimators.len(),
        }
    }
}

/// Ordered set of candidates; registration order breaks score ties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateRegistry {
    spaces: Vec<SearchSpace>,
}

impl CandidateRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The five standard families with their default grids
    pub fn standard() -> Self {
        let spaces = vec![
            SearchSpace::RandomForest {
                max_features: vec![MaxFeatures::Sqrt, MaxFeatures::Log2],
                n_estimators: vec![8, 16, 32, 128, 256],
            },
            SearchSpace::DecisionTree {
                criterion: vec![Criterion::Gini, Criterion::Entropy, Criterion::LogLoss],
                max_features: vec![MaxFeatures::Sqrt, MaxFeatures::Log2],
            },
            SearchSpace::GradientBoosting {
                learning_rate: vec![0.001, 0.01, 0.05, 0.1],
                loss: vec![BoostingLoss::LogLoss, BoostingLoss::Exponential],
                n_estimators: vec![8, 16, 32, 64, 128, 256],
                subsample: vec![0.6, 0.7, 0.75, 0.85, 0.9],
            },
            SearchSpace::LogisticRegression,
            SearchSpace::AdaBoost {
                learning_rate: vec![0.001, 0.01, 0.1],
                n_estimators: vec![8, 16, 32, 64, 128, 256],
            },
        ];
        Self { spaces }
    }

    /// Add a candidate after the ones already registered
    pub fn register(&mut self, space: SearchSpace) -> Result<()> {
        let kind = space.kind();
        if self.spaces.iter().any(|s| s.kind() == kind) {
            return Err(PipelineError::ConfigError(format!("{} is already registered", kind)));
        }
        if space.n_combinations() == 0 {
            return Err(PipelineError::InvalidParameter {
                name: "search_space".to_string(),
                value: kind.to_string(),
                reason: "every hyperparameter needs at least one value".to_string(),
            });
        }
        self.spaces.push(space);
        Ok(())
    }

    /// Builder form of [`CandidateRegistry::register`]
    pub fn with_candidate(mut self, space: SearchSpace) -> Result<Self> {
        self.register(space)?;
        Ok(self)
    }

    pub fn spaces(&self) -> &[SearchSpace] {
        &self.spaces
    }

    pub fn kinds(&self) -> Vec<CandidateKind> {
        self.spaces.iter().map(SearchSpace::kind).collect()
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }
}

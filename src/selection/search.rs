//! Parallel hyperparameter search
//!
//! Every (candidate, combination) pair is an independent work unit scored by
//! stratified k-fold accuracy on the training data. Units run on a rayon pool
//! and only read the shared matrices; the per-candidate reduction happens
//! after the join, in registration order.

use super::candidates::{CandidateKind, CandidateRegistry, Hyperparams, SearchSpace};
use crate::config::SearchStrategy;
use crate::error::{PipelineError, Result};
use crate::training::{accuracy_score, CVSplit, Model, StratifiedKFold};
use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared flag that stops a running search at the next work unit
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Best combination found for one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub kind: CandidateKind,
    pub best_params: Hyperparams,
    /// Mean fold accuracy; NaN when every combination failed to fit
    pub cv_score: f64,
    pub n_evaluated: usize,
}

struct WorkUnit {
    candidate: usize,
    params: Hyperparams,
}

/// Grid or randomized search over a [`CandidateRegistry`]
#[derive(Debug, Clone)]
pub struct HyperparameterSearch {
    strategy: SearchStrategy,
    cv_folds: usize,
    n_jobs: Option<usize>,
    seed: u64,
    cancel: CancellationToken,
}

impl HyperparameterSearch {
    pub fn new(strategy: SearchStrategy, cv_folds: usize) -> Self {
        Self {
            strategy,
            cv_folds,
            n_jobs: None,
            seed: 42,
            cancel: CancellationToken::new(),
        }
    }

    /// Bound the worker pool; `None` uses the global rayon pool
    pub fn with_n_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Combinations of one candidate to evaluate, in grid order.
    ///
    /// The randomized strategy draws `n_iter` distinct combinations with a
    /// generator seeded from the search seed and the candidate's position.
    pub fn combinations(&self, candidate: usize, space: &SearchSpace) -> Vec<Hyperparams> {
        let grid = space.grid();
        match self.strategy {
            SearchStrategy::Exhaustive => grid,
            SearchStrategy::Randomized { n_iter } if n_iter >= grid.len() => grid,
            SearchStrategy::Randomized { n_iter } => {
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(candidate as u64));
                let mut picked = rand::seq::index::sample(&mut rng, grid.len(), n_iter).into_vec();
                picked.sort_unstable();
                picked.into_iter().map(|i| grid[i].clone()).collect()
            }
        }
    }

    /// Search every registered candidate; one result per candidate, in
    /// registration order
    pub fn run(&self, registry: &CandidateRegistry, x: &Array2<f64>, y: &Array1<f64>) -> Result<Vec<SearchResult>> {
        if registry.is_empty() {
            return Err(PipelineError::TrainingError("No candidate models registered".to_string()));
        }
        if let SearchStrategy::Randomized { n_iter: 0 } = self.strategy {
            return Err(PipelineError::InvalidParameter {
                name: "n_iter".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if y.len() != x.nrows() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        let splits = StratifiedKFold::new(self.cv_folds).split(y)?;

        let units: Vec<WorkUnit> = registry
            .spaces()
            .iter()
            .enumerate()
            .flat_map(|(candidate, space)| {
                self.combinations(candidate, space)
                    .into_iter()
                    .map(move |params| WorkUnit { candidate, params })
            })
            .collect();

        info!(
            n_candidates = registry.len(),
            n_units = units.len(),
            n_folds = splits.len(),
            "Starting hyperparameter search"
        );

        let pool = match self.n_jobs {
            Some(n_workers) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n_workers)
                    .build()
                    .map_err(|e| PipelineError::TrainingError(format!("Thread pool error: {}", e)))?,
            ),
            None => None,
        };

        let evaluate = |units: &[WorkUnit]| -> Result<Vec<f64>> {
            units
                .par_iter()
                .map(|unit| {
                    if self.cancel.is_cancelled() {
                        return Err(PipelineError::Cancelled);
                    }
                    Ok(self.cross_val_score(&unit.params, x, y, &splits))
                })
                .collect()
        };

        let scores = match pool {
            Some(ref pool) => pool.install(|| evaluate(&units))?,
            None => evaluate(&units)?,
        };

        let mut results = Vec::with_capacity(registry.len());
        for (candidate, kind) in registry.kinds().into_iter().enumerate() {
            let mut best: Option<(&Hyperparams, f64)> = None;
            let mut n_evaluated = 0;

            for (unit, &score) in units.iter().zip(scores.iter()).filter(|(u, _)| u.candidate == candidate) {
                n_evaluated += 1;
                let better = match best {
                    None => true,
                    Some((_, current)) => score.is_finite() && (!current.is_finite() || score > current),
                };
                if better {
                    best = Some((&unit.params, score));
                }
            }

            let (best_params, cv_score) = best.ok_or_else(|| {
                PipelineError::TrainingError(format!("No hyperparameter combination evaluated for {}", kind))
            })?;
            debug!(candidate = %kind, cv_score, n_evaluated, params = ?best_params, "Best combination");

            results.push(SearchResult {
                kind,
                best_params: best_params.clone(),
                cv_score,
                n_evaluated,
            });
        }
        Ok(results)
    }

    /// Mean fold accuracy; NaN if any fold fails to fit
    fn cross_val_score(&self, params: &Hyperparams, x: &Array2<f64>, y: &Array1<f64>, splits: &[CVSplit]) -> f64 {
        let mut total = 0.0;
        for split in splits {
            let x_train = x.select(Axis(0), &split.train_indices);
            let y_train = y.select(Axis(0), &split.train_indices);
            let x_test = x.select(Axis(0), &split.test_indices);
            let y_test = y.select(Axis(0), &split.test_indices);

            let mut model = params.build(self.seed);
            let fold = model.fit(&x_train, &y_train).and_then(|_| model.predict(&x_test));
            match fold {
                Ok(pred) => total += accuracy_score(&y_test, &pred),
                Err(e) => {
                    debug!(params = ?params, fold = split.fold_idx, error = %e, "Fold failed to fit");
                    return f64::NAN;
                }
            }
        }
        total / splits.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{Criterion, MaxFeatures};

    fn separable(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 3) as f64 });
        let y = Array1::from_shape_fn(n, |i| if i >= n / 2 { 1.0 } else { 0.0 });
        (x, y)
    }

    fn small_registry() -> CandidateRegistry {
        CandidateRegistry::new()
            .with_candidate(SearchSpace::DecisionTree {
                criterion: vec![Criterion::Gini, Criterion::Entropy],
                max_features: vec![MaxFeatures::All],
            })
            .unwrap()
            .with_candidate(SearchSpace::LogisticRegression)
            .unwrap()
    }

    #[test]
    fn test_one_result_per_candidate_in_order() {
        let (x, y) = separable(30);
        let results = HyperparameterSearch::new(SearchStrategy::Exhaustive, 3)
            .run(&small_registry(), &x, &y)
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].kind, CandidateKind::DecisionTree);
        assert_eq!(results[0].n_evaluated, 2);
        assert_eq!(results[1].kind, CandidateKind::LogisticRegression);
        assert_eq!(results[1].n_evaluated, 1);
    }

    #[test]
    fn test_ties_keep_earliest_combination() {
        // both criteria pick the same split on feature 0
        let (x, y) = separable(30);
        let results = HyperparameterSearch::new(SearchStrategy::Exhaustive, 3)
            .run(&small_registry(), &x, &y)
            .unwrap();
        assert_eq!(
            results[0].best_params,
            Hyperparams::DecisionTree {
                criterion: Criterion::Gini,
                max_features: MaxFeatures::All
            }
        );
    }

    #[test]
    fn test_randomized_sample_is_seeded_and_ordered() {
        let registry = CandidateRegistry::standard();
        let space = &registry.spaces()[2];
        let search = HyperparameterSearch::new(SearchStrategy::Randomized { n_iter: 5 }, 3).with_seed(7);
        let first = search.combinations(2, space);
        assert_eq!(first.len(), 5);
        assert_eq!(first, search.combinations(2, space));

        let grid = space.grid();
        let positions: Vec<usize> = first
            .iter()
            .map(|p| grid.iter().position(|g| g == p).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_randomized_larger_than_grid_takes_everything() {
        let space = SearchSpace::AdaBoost {
            learning_rate: vec![0.1],
            n_estimators: vec![8, 16],
        };
        let search = HyperparameterSearch::new(SearchStrategy::Randomized { n_iter: 10 }, 3);
        assert_eq!(search.combinations(0, &space), space.grid());
    }

    #[test]
    fn test_failed_fits_score_nan_but_still_report() {
        // constant features: every AdaBoost fit fails
        let x = Array2::from_elem((12, 2), 1.0);
        let y = Array1::from_shape_fn(12, |i| (i % 2) as f64);
        let registry = CandidateRegistry::new()
            .with_candidate(SearchSpace::AdaBoost {
                learning_rate: vec![0.1, 1.0],
                n_estimators: vec![4],
            })
            .unwrap();

        let results = HyperparameterSearch::new(SearchStrategy::Exhaustive, 3)
            .run(&registry, &x, &y)
            .unwrap();
        assert!(results[0].cv_score.is_nan());
        assert_eq!(
            results[0].best_params,
            Hyperparams::AdaBoost {
                learning_rate: 0.1,
                n_estimators: 4
            }
        );
    }

    #[test]
    fn test_cancelled_search_returns_error() {
        let (x, y) = separable(30);
        let token = CancellationToken::new();
        token.cancel();

        let result = HyperparameterSearch::new(SearchStrategy::Exhaustive, 3)
            .with_cancellation(token.clone())
            .run(&small_registry(), &x, &y);
        assert!(token.is_cancelled());
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[test]
    fn test_bounded_pool_matches_global_pool() {
        let (x, y) = separable(30);
        let registry = small_registry();
        let global = HyperparameterSearch::new(SearchStrategy::Exhaustive, 3)
            .run(&registry, &x, &y)
            .unwrap();
        let bounded = HyperparameterSearch::new(SearchStrategy::Exhaustive, 3)
            .with_n_jobs(Some(1))
            .run(&registry, &x, &y)
            .unwrap();
        assert_eq!(global, bounded);
    }
}

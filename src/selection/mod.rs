//! Model selection stage
//!
//! Searches every registered candidate on the transformed training array,
//! refits each candidate's best combination on the full training split,
//! keeps the candidate with the best test score and bundles it with the
//! fitted preprocessor.

mod candidates;
mod fit_check;
mod search;

pub use candidates::{CandidateKind, CandidateRegistry, Hyperparams, SearchSpace};
pub use fit_check::{apply_policy, check_fit};
pub use search::{CancellationToken, HyperparameterSearch, SearchResult};

use crate::artifact::{CandidateScore, DataTransformationArtifact, ModelTrainerArtifact};
use crate::config::ModelTrainerConfig;
use crate::error::{PipelineError, Result, Stage, StageContext};
use crate::export::load_array;
use crate::inference::InferenceBundle;
use crate::training::{classification_metric, selection_score, Model, TrainedModel};
use crate::transformation::FeaturePipeline;
use ndarray::{s, Array1, Array2};
use tracing::{debug, info};

/// Split a `[features | label]` array and check the label is binary
pub fn split_features_label(arr: &Array2<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
    let n_cols = arr.ncols();
    if n_cols < 2 {
        return Err(PipelineError::TrainingError(format!(
            "Transformed array needs at least one feature and a label, got {} columns",
            n_cols
        )));
    }
    let x = arr.slice(s![.., ..n_cols - 1]).to_owned();
    let y = arr.column(n_cols - 1).to_owned();
    if let Some(bad) = y.iter().find(|&&v| v != 0.0 && v != 1.0) {
        return Err(PipelineError::TrainingError(format!(
            "Labels must be 0 or 1, found {}",
            bad
        )));
    }
    Ok((x, y))
}

/// Model selection stage
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    config: ModelTrainerConfig,
    registry: CandidateRegistry,
    cancel: CancellationToken,
}

impl ModelTrainer {
    /// Trainer over the standard candidate set
    pub fn new(config: ModelTrainerConfig) -> Self {
        Self {
            config,
            registry: CandidateRegistry::standard(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_registry(mut self, registry: CandidateRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &ModelTrainerConfig {
        &self.config
    }

    pub fn registry(&self) -> &CandidateRegistry {
        &self.registry
    }

    /// Run the stage
    pub fn initiate(&self, transformation: &DataTransformationArtifact) -> Result<ModelTrainerArtifact> {
        self.run(transformation).in_stage(Stage::ModelTrainer)
    }

    fn run(&self, transformation: &DataTransformationArtifact) -> Result<ModelTrainerArtifact> {
        info!(
            train = %transformation.transformed_train_file_path.display(),
            "Starting model selection"
        );
        let (x_train, y_train) = split_features_label(&load_array(&transformation.transformed_train_file_path)?)?;
        let (x_test, y_test) = split_features_label(&load_array(&transformation.transformed_test_file_path)?)?;
        if x_train.ncols() != x_test.ncols() {
            return Err(PipelineError::TrainingError(format!(
                "Train has {} features but test has {}",
                x_train.ncols(),
                x_test.ncols()
            )));
        }

        let (model, model_report) = self.evaluate_models(&x_train, &y_train, &x_test, &y_test)?;
        let best = pick_best(&model_report)?;
        let best_model = model_report[best].kind;
        let model = model
            .into_iter()
            .nth(best)
            .ok_or_else(|| PipelineError::TrainingError("Selected model is missing".to_string()))?;
        info!(
            best_model = %best_model,
            score = model_report[best].test_score,
            params = ?model_report[best].best_params,
            "Selected model"
        );

        let train_metric = classification_metric(&y_train, &model.predict(&x_train)?);
        let test_metric = classification_metric(&y_test, &model.predict(&x_test)?);
        info!(
            train_f1 = train_metric.f1_score,
            test_f1 = test_metric.f1_score,
            test_precision = test_metric.precision_score,
            test_recall = test_metric.recall_score,
            "Classification metrics"
        );

        let settings = &self.config.settings;
        let fit_warnings = check_fit(&train_metric, &test_metric, settings.expected_score, settings.fit_threshold);
        apply_policy(settings.fit_policy, &fit_warnings)?;

        let preprocessor = FeaturePipeline::load(&transformation.transformed_object_file_path)?;
        if preprocessor.n_output_features() != x_train.ncols() {
            return Err(PipelineError::TrainingError(format!(
                "Preprocessor emits {} features but the transformed array has {}",
                preprocessor.n_output_features(),
                x_train.ncols()
            )));
        }
        let bundle = InferenceBundle::new(preprocessor, model)?;
        bundle.save(&self.config.trained_model_file_path)?;
        info!(path = %self.config.trained_model_file_path.display(), "Saved inference bundle");

        Ok(ModelTrainerArtifact {
            trained_model_file_path: self.config.trained_model_file_path.clone(),
            train_metric_artifact: train_metric,
            test_metric_artifact: test_metric,
            best_model,
            model_report,
            fit_warnings,
        })
    }

    /// Search, refit and test-score every registered candidate.
    ///
    /// Returns the refit models and the report, both in registration order.
    pub fn evaluate_models(
        &self,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<(Vec<TrainedModel>, Vec<CandidateScore>)> {
        let settings = &self.config.settings;
        let search = HyperparameterSearch::new(settings.search, settings.cv_folds)
            .with_n_jobs(settings.n_jobs)
            .with_seed(self.config.random_seed)
            .with_cancellation(self.cancel.clone());
        let results = search.run(&self.registry, x_train, y_train)?;

        let mut models = Vec::with_capacity(results.len());
        let mut report = Vec::with_capacity(results.len());
        for result in results {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let mut model = result.best_params.build(self.config.random_seed);
            let test_score = match model.fit(x_train, y_train) {
                Ok(()) => selection_score(settings.selection_metric, y_test, &model.predict(x_test)?),
                Err(e) => {
                    debug!(candidate = %result.kind, error = %e, "Refit failed");
                    f64::NAN
                }
            };
            debug!(candidate = %result.kind, cv_score = result.cv_score, test_score, "Candidate scored");

            report.push(CandidateScore {
                kind: result.kind,
                best_params: result.best_params,
                cv_score: result.cv_score,
                test_score,
                n_evaluated: result.n_evaluated,
            });
            models.push(model);
        }
        Ok((models, report))
    }
}

/// Position of the highest finite test score; the first registered wins ties
fn pick_best(report: &[CandidateScore]) -> Result<usize> {
    let mut best: Option<usize> = None;
    for (i, score) in report.iter().enumerate() {
        if !score.test_score.is_finite() {
            continue;
        }
        if best.map_or(true, |b| score.test_score > report[b].test_score) {
            best = Some(i);
        }
    }
    best.ok_or_else(|| PipelineError::TrainingError("No candidate produced a finite score".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn score(kind: CandidateKind, test_score: f64) -> CandidateScore {
        CandidateScore {
            kind,
            best_params: Hyperparams::LogisticRegression,
            cv_score: 0.5,
            test_score,
            n_evaluated: 1,
        }
    }

    #[test]
    fn test_pick_best_prefers_first_on_ties() {
        let report = vec![
            score(CandidateKind::RandomForest, 0.8),
            score(CandidateKind::DecisionTree, 0.9),
            score(CandidateKind::AdaBoost, 0.9),
        ];
        assert_eq!(pick_best(&report).unwrap(), 1);
    }

    #[test]
    fn test_pick_best_skips_non_finite() {
        let report = vec![
            score(CandidateKind::RandomForest, f64::NAN),
            score(CandidateKind::DecisionTree, -0.5),
        ];
        assert_eq!(pick_best(&report).unwrap(), 1);

        let report = vec![score(CandidateKind::RandomForest, f64::NAN)];
        assert!(pick_best(&report).is_err());
    }

    #[test]
    fn test_split_features_label() {
        let arr = array![[1.0, 2.0, 0.0], [3.0, 4.0, 1.0]];
        let (x, y) = split_features_label(&arr).unwrap();
        assert_eq!(x, array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(y, array![0.0, 1.0]);

        assert!(split_features_label(&array![[1.0], [0.0]]).is_err());
        assert!(split_features_label(&array![[1.0, 2.0]]).is_err());
    }
}

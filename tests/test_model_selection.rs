//! Integration test: model selection over transformed arrays

use ndarray::{Array1, Array2, Axis};
use netsec_pipeline::artifact::DataTransformationArtifact;
use netsec_pipeline::config::{
    FitPolicy, ImputerSettings, ModelTrainerConfig, PipelineSettings, SearchStrategy, SelectionMetric,
    TrainingPipelineConfig,
};
use netsec_pipeline::error::{PipelineError, Stage};
use netsec_pipeline::export::save_array;
use netsec_pipeline::inference::InferenceBundle;
use netsec_pipeline::selection::{CancellationToken, CandidateKind, CandidateRegistry, ModelTrainer, SearchSpace};
use netsec_pipeline::training::{classification_metric, BoostingLoss, Criterion, MaxFeatures};
use netsec_pipeline::transformation::FeaturePipeline;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::Path;
use tempfile::TempDir;

/// Three ternary features; the label follows the first two with a little noise
fn dataset(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x = Array2::from_shape_fn((n, 3), |_| rng.gen_range(-1i32..=1) as f64);
    let y = x
        .rows()
        .into_iter()
        .map(|row| {
            let signal = row[0] + 0.5 * row[1];
            let flip = rng.gen_bool(0.05);
            if (signal > 0.0) != flip {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    (x, y)
}

fn with_label(x: &Array2<f64>, y: &Array1<f64>) -> Array2<f64> {
    ndarray::concatenate(Axis(1), &[x.view(), y.view().insert_axis(Axis(1))]).unwrap()
}

fn write_transformation(dir: &Path) -> DataTransformationArtifact {
    let (x_train, y_train) = dataset(150, 1);
    let (x_test, y_test) = dataset(50, 2);

    let artifact = DataTransformationArtifact {
        transformed_object_file_path: dir.join("transformed_object").join("preprocessing.bin"),
        transformed_train_file_path: dir.join("transformed").join("train.bin"),
        transformed_test_file_path: dir.join("transformed").join("test.bin"),
    };
    save_array(&artifact.transformed_train_file_path, &with_label(&x_train, &y_train)).unwrap();
    save_array(&artifact.transformed_test_file_path, &with_label(&x_test, &y_test)).unwrap();

    let mut preprocessor = FeaturePipeline::knn_imputation(&ImputerSettings::default());
    preprocessor
        .fit(&x_train, vec!["f0".to_string(), "f1".to_string(), "f2".to_string()])
        .unwrap();
    preprocessor.save(&artifact.transformed_object_file_path).unwrap();
    artifact
}

fn trainer_config(dir: &TempDir) -> ModelTrainerConfig {
    let settings = PipelineSettings::new().with_artifact_dir(dir.path());
    TrainingPipelineConfig::new(settings).unwrap().model_trainer()
}

fn light_registry() -> CandidateRegistry {
    CandidateRegistry::new()
        .with_candidate(SearchSpace::DecisionTree {
            criterion: vec![Criterion::Gini, Criterion::Entropy],
            max_features: vec![MaxFeatures::Sqrt],
        })
        .unwrap()
        .with_candidate(SearchSpace::GradientBoosting {
            learning_rate: vec![0.1],
            loss: vec![BoostingLoss::LogLoss],
            n_estimators: vec![16],
            subsample: vec![0.8],
        })
        .unwrap()
        .with_candidate(SearchSpace::LogisticRegression)
        .unwrap()
        .with_candidate(SearchSpace::AdaBoost {
            learning_rate: vec![0.1, 1.0],
            n_estimators: vec![8],
        })
        .unwrap()
}

#[test]
fn test_report_covers_every_candidate_and_winner_is_max() {
    let dir = TempDir::new().unwrap();
    let transformation = write_transformation(dir.path());

    let artifact = ModelTrainer::new(trainer_config(&dir))
        .with_registry(light_registry())
        .initiate(&transformation)
        .unwrap();

    let kinds: Vec<CandidateKind> = artifact.model_report.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![
            CandidateKind::DecisionTree,
            CandidateKind::GradientBoosting,
            CandidateKind::LogisticRegression,
            CandidateKind::AdaBoost,
        ]
    );
    assert_eq!(artifact.model_report[0].n_evaluated, 2);
    assert_eq!(artifact.model_report[3].n_evaluated, 2);

    let best = artifact.best_score().unwrap();
    let max = artifact
        .model_report
        .iter()
        .map(|s| s.test_score)
        .filter(|s| s.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(best.test_score, max);
    let first_max = artifact.model_report.iter().position(|s| s.test_score == max).unwrap();
    assert_eq!(artifact.model_report[first_max].kind, artifact.best_model);

    for metric in [&artifact.train_metric_artifact, &artifact.test_metric_artifact] {
        assert!((0.0..=1.0).contains(&metric.f1_score));
        assert!((0.0..=1.0).contains(&metric.precision_score));
        assert!((0.0..=1.0).contains(&metric.recall_score));
    }
    assert!(artifact.trained_model_file_path.exists());
}

#[test]
fn test_saved_bundle_reproduces_test_metric() {
    let dir = TempDir::new().unwrap();
    let transformation = write_transformation(dir.path());
    let artifact = ModelTrainer::new(trainer_config(&dir))
        .with_registry(light_registry())
        .initiate(&transformation)
        .unwrap();

    let bundle = InferenceBundle::load(&artifact.trained_model_file_path).unwrap();
    assert_eq!(bundle.model().name(), artifact.best_model.to_string());

    let (x_test, y_test) = dataset(50, 2);
    let metric = classification_metric(&y_test, &bundle.predict(&x_test).unwrap());
    assert_eq!(metric, artifact.test_metric_artifact);
}

#[test]
fn test_randomized_search_over_standard_registry() {
    let dir = TempDir::new().unwrap();
    let transformation = write_transformation(dir.path());
    let mut config = trainer_config(&dir);
    config.settings.search = SearchStrategy::Randomized { n_iter: 2 };
    config.settings.selection_metric = SelectionMetric::Accuracy;
    config.settings.n_jobs = Some(2);

    let artifact = ModelTrainer::new(config).initiate(&transformation).unwrap();

    assert_eq!(artifact.model_report.len(), 5);
    let evaluated: Vec<usize> = artifact.model_report.iter().map(|s| s.n_evaluated).collect();
    assert_eq!(evaluated, vec![2, 2, 2, 1, 2]);
    assert!(artifact.best_score().unwrap().test_score > 0.5);
}

#[test]
fn test_fail_policy_aborts() {
    let dir = TempDir::new().unwrap();
    let transformation = write_transformation(dir.path());
    let mut config = trainer_config(&dir);
    config.settings.expected_score = 1.01;
    config.settings.fit_policy = FitPolicy::Fail;
    let bundle_path = config.trained_model_file_path.clone();

    let err = ModelTrainer::new(config)
        .with_registry(light_registry())
        .initiate(&transformation)
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::ModelTrainer));
    assert!(matches!(err.root_cause(), PipelineError::TrainingError(_)));
    assert!(!bundle_path.exists());
}

#[test]
fn test_warn_policy_attaches_warnings() {
    let dir = TempDir::new().unwrap();
    let transformation = write_transformation(dir.path());
    let mut config = trainer_config(&dir);
    config.settings.expected_score = 1.01;

    let artifact = ModelTrainer::new(config)
        .with_registry(light_registry())
        .initiate(&transformation)
        .unwrap();
    assert!(!artifact.fit_warnings.is_empty());
}

#[test]
fn test_cancelled_selection_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let transformation = write_transformation(dir.path());
    let config = trainer_config(&dir);
    let bundle_path = config.trained_model_file_path.clone();
    let token = CancellationToken::new();
    token.cancel();

    let err = ModelTrainer::new(config)
        .with_registry(light_registry())
        .with_cancellation(token)
        .initiate(&transformation)
        .unwrap_err();
    assert!(matches!(err.root_cause(), PipelineError::Cancelled));
    assert!(!bundle_path.exists());
}

#[test]
fn test_rejects_mismatched_widths_and_labels() {
    let dir = TempDir::new().unwrap();
    let transformation = write_transformation(dir.path());
    let trainer = ModelTrainer::new(trainer_config(&dir)).with_registry(light_registry());

    save_array(&transformation.transformed_test_file_path, &Array2::zeros((10, 5))).unwrap();
    let err = trainer.initiate(&transformation).unwrap_err();
    assert!(matches!(err.root_cause(), PipelineError::TrainingError(_)));

    let mut bad = with_label(&dataset(30, 3).0, &Array1::from_elem(30, 2.0));
    save_array(&transformation.transformed_test_file_path, &bad).unwrap();
    assert!(trainer.initiate(&transformation).is_err());

    bad = Array2::zeros((30, 1));
    save_array(&transformation.transformed_train_file_path, &bad).unwrap();
    assert!(trainer.initiate(&transformation).is_err());
}

//! Integration test: transformation stage and the persisted preprocessor

use netsec_pipeline::artifact::DataValidationArtifact;
use netsec_pipeline::config::{PipelineSettings, TrainingPipelineConfig};
use netsec_pipeline::error::{PipelineError, Stage};
use netsec_pipeline::export::load_array;
use netsec_pipeline::transformation::{DataTransformation, FeaturePipeline, IMPUTER_STEP};
use netsec_pipeline::utils::{frame_to_array, DataSaver};
use polars::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn train_df() -> DataFrame {
    df!(
        "having_IP_Address" => [Some(1.0), Some(-1.0), None, Some(1.0), Some(-1.0), Some(1.0)],
        "SSLfinal_State" => [Some(1.0), Some(0.0), Some(1.0), None, Some(-1.0), Some(1.0)],
        "Result" => [1i64, -1, 1, 1, -1, 1]
    )
    .unwrap()
}

fn test_df() -> DataFrame {
    df!(
        "having_IP_Address" => [None, Some(-1.0), Some(1.0)],
        "SSLfinal_State" => [Some(1.0), None, Some(0.0)],
        "Result" => [1i64, -1, 1]
    )
    .unwrap()
}

fn validated(dir: &Path, mut train: DataFrame, mut test: DataFrame) -> DataValidationArtifact {
    let train_path = dir.join("validated").join("train.csv");
    let test_path = dir.join("validated").join("test.csv");
    DataSaver::save_csv(&mut train, &train_path).unwrap();
    DataSaver::save_csv(&mut test, &test_path).unwrap();
    DataValidationArtifact {
        validation_status: true,
        valid_train_file_path: Some(train_path),
        valid_test_file_path: Some(test_path),
        invalid_train_file_path: None,
        invalid_test_file_path: None,
        drift_report_file_path: dir.join("report.yaml"),
        drift_detected: false,
        messages: vec![],
    }
}

fn stage(dir: &TempDir) -> DataTransformation {
    let settings = PipelineSettings::new().with_artifact_dir(dir.path());
    let config = TrainingPipelineConfig::new(settings).unwrap();
    DataTransformation::new(config.data_transformation())
}

#[test]
fn test_transformation_writes_arrays_and_preprocessor() {
    let dir = TempDir::new().unwrap();
    let validation = validated(dir.path(), train_df(), test_df());

    let artifact = stage(&dir).initiate(&validation).unwrap();

    let train = load_array(&artifact.transformed_train_file_path).unwrap();
    let test = load_array(&artifact.transformed_test_file_path).unwrap();
    assert_eq!(train.dim(), (6, 3));
    assert_eq!(test.dim(), (3, 3));
    assert!(!train.iter().any(|v| v.is_nan()));
    assert!(!test.iter().any(|v| v.is_nan()));

    // label is the last column, with -1 remapped to 0
    assert_eq!(train.column(2).to_vec(), vec![1.0, 0.0, 1.0, 1.0, 0.0, 1.0]);
    assert_eq!(test.column(2).to_vec(), vec![1.0, 0.0, 1.0]);

    // rows without missing cells pass through unchanged
    assert_eq!(train.row(0).to_vec(), vec![1.0, 1.0, 1.0]);

    let preprocessor = FeaturePipeline::load(&artifact.transformed_object_file_path).unwrap();
    assert!(preprocessor.is_fitted());
    assert!(preprocessor.step(IMPUTER_STEP).is_some());
    assert_eq!(preprocessor.feature_names(), &["having_IP_Address", "SSLfinal_State"]);
}

#[test]
fn test_persisted_preprocessor_reproduces_test_features() {
    let dir = TempDir::new().unwrap();
    let validation = validated(dir.path(), train_df(), test_df());
    let artifact = stage(&dir).initiate(&validation).unwrap();

    let preprocessor = FeaturePipeline::load(&artifact.transformed_object_file_path).unwrap();
    let raw = frame_to_array(&test_df(), preprocessor.feature_names()).unwrap();
    let transformed = preprocessor.transform(&raw).unwrap();

    let stored = load_array(&artifact.transformed_test_file_path).unwrap();
    assert_eq!(transformed, stored.slice(ndarray::s![.., ..2]));

    // transforming again does not change the fitted pipeline
    let before = bincode::serialize(&preprocessor).unwrap();
    preprocessor.transform(&raw).unwrap();
    assert_eq!(bincode::serialize(&preprocessor).unwrap(), before);
}

#[test]
fn test_unobserved_feature_column_is_dropped() {
    let dir = TempDir::new().unwrap();
    let mut train = train_df();
    train.with_column(Column::new("empty".into(), [None::<f64>; 6])).unwrap();
    let mut test = test_df();
    test.with_column(Column::new("empty".into(), [None::<f64>; 3])).unwrap();
    let validation = validated(dir.path(), train, test.clone());

    let artifact = stage(&dir).initiate(&validation).unwrap();

    let train_arr = load_array(&artifact.transformed_train_file_path).unwrap();
    let test_arr = load_array(&artifact.transformed_test_file_path).unwrap();
    assert_eq!(train_arr.dim(), (6, 3));
    assert_eq!(test_arr.dim(), (3, 3));
    assert!(!train_arr.iter().any(|v| v.is_nan()));

    let preprocessor = FeaturePipeline::load(&artifact.transformed_object_file_path).unwrap();
    assert_eq!(preprocessor.feature_names(), &["having_IP_Address", "SSLfinal_State", "empty"]);
    assert_eq!(preprocessor.output_feature_names(), &["having_IP_Address", "SSLfinal_State"]);
    assert_eq!(preprocessor.dropped_features(), vec!["empty"]);

    // raw rows at inference still carry the dropped column
    let raw = frame_to_array(&test, preprocessor.feature_names()).unwrap();
    let transformed = preprocessor.transform(&raw).unwrap();
    assert_eq!(transformed, test_arr.slice(ndarray::s![.., ..2]));
}

#[test]
fn test_missing_label_column() {
    let dir = TempDir::new().unwrap();
    let train = train_df().drop("Result").unwrap();
    let validation = validated(dir.path(), train, test_df());

    let err = stage(&dir).initiate(&validation).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Transformation));
    assert!(matches!(err.root_cause(), PipelineError::FeatureNotFound(_)));
}

#[test]
fn test_bad_label_values() {
    let dir = TempDir::new().unwrap();
    let mut train = train_df();
    train
        .with_column(Column::new("Result".into(), [1i64, 2, 1, 1, -1, 1]))
        .unwrap();
    let validation = validated(dir.path(), train, test_df());

    let err = stage(&dir).initiate(&validation).unwrap_err();
    assert!(matches!(err.root_cause(), PipelineError::TransformationError(_)));
}

#[test]
fn test_refuses_failed_validation() {
    let dir = TempDir::new().unwrap();
    let mut validation = validated(dir.path(), train_df(), test_df());
    validation.validation_status = false;

    assert!(stage(&dir).initiate(&validation).is_err());
}

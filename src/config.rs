//! Pipeline configuration
//!
//! [`PipelineSettings`] holds every tunable of a run. It is turned into a
//! [`TrainingPipelineConfig`] once, at run start, which fixes the run id and the
//! artifact root. Each stage receives its own config derived from it and never
//! looks anything up on its own.

use crate::error::{PipelineError, Result};
use crate::imputation::WeightScheme;
use crate::validation::DatasetSchema;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DATA_INGESTION_DIR_NAME: &str = "data_ingestion";
const DATA_INGESTION_FEATURE_STORE_DIR: &str = "feature_store";
const DATA_INGESTION_INGESTED_DIR: &str = "ingested";

const DATA_VALIDATION_DIR_NAME: &str = "data_validation";
const DATA_VALIDATION_VALID_DIR: &str = "validated";
const DATA_VALIDATION_INVALID_DIR: &str = "invalid";
const DATA_VALIDATION_DRIFT_REPORT_DIR: &str = "drift_report";
const DATA_VALIDATION_DRIFT_REPORT_FILE_NAME: &str = "report.yaml";

const DATA_TRANSFORMATION_DIR_NAME: &str = "data_transformation";
const DATA_TRANSFORMATION_TRANSFORMED_DATA_DIR: &str = "transformed";
const DATA_TRANSFORMATION_TRANSFORMED_OBJECT_DIR: &str = "transformed_object";
const TRANSFORMED_TRAIN_FILE_NAME: &str = "train.bin";
const TRANSFORMED_TEST_FILE_NAME: &str = "test.bin";
const PREPROCESSING_OBJECT_FILE_NAME: &str = "preprocessing.bin";

const MODEL_TRAINER_DIR_NAME: &str = "model_trainer";
const MODEL_TRAINER_TRAINED_MODEL_DIR: &str = "trained_model";
const MODEL_TRAINER_TRAINED_MODEL_NAME: &str = "model.bin";

/// Format of the per-run directory name
pub const RUN_ID_FORMAT: &str = "%m_%d_%Y_%H_%M_%S";

/// KNN imputer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImputerSettings {
    /// Number of neighbors used for each imputed value
    pub n_neighbors: usize,
    /// Neighbor weighting
    pub weights: WeightScheme,
}

impl Default for ImputerSettings {
    fn default() -> Self {
        Self {
            n_neighbors: 3,
            weights: WeightScheme::Uniform,
        }
    }
}

/// How hyperparameter combinations are chosen from a candidate's grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStrategy {
    /// Every combination of the grid
    Exhaustive,
    /// A seeded sample of at most `n_iter` combinations per candidate
    Randomized { n_iter: usize },
}

/// Score used to compare fitted candidates on the test split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionMetric {
    /// Coefficient of determination of predicted labels
    R2,
    Accuracy,
    F1,
}

/// What to do when the fit check flags the selected model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitPolicy {
    /// Attach the warnings to the artifact and carry on
    Warn,
    /// Abort the run
    Fail,
}

/// Model selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTrainerSettings {
    /// Minimum acceptable test F1 before the model is flagged as underperforming
    pub expected_score: f64,
    /// Maximum tolerated gap between train and test F1
    pub fit_threshold: f64,
    pub fit_policy: FitPolicy,
    pub selection_metric: SelectionMetric,
    /// Folds used to score each hyperparameter combination
    pub cv_folds: usize,
    pub search: SearchStrategy,
    /// Worker threads for the search; `None` uses every available core
    pub n_jobs: Option<usize>,
}

impl Default for ModelTrainerSettings {
    fn default() -> Self {
        Self {
            expected_score: 0.6,
            fit_threshold: 0.05,
            fit_policy: FitPolicy::Warn,
            selection_metric: SelectionMetric::R2,
            cv_folds: 3,
            search: SearchStrategy::Exhaustive,
            n_jobs: None,
        }
    }
}

/// Data validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Expected layout of the ingested tables
    pub schema: Option<DatasetSchema>,
    /// KS p-value below which a column is reported as drifted
    pub drift_p_value_threshold: f64,
    /// Treat detected drift as a validation failure
    pub fail_on_drift: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            schema: None,
            drift_p_value_threshold: 0.05,
            fail_on_drift: false,
        }
    }
}

/// Every tunable of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub pipeline_name: String,
    /// Root under which each run gets its own directory
    pub artifact_dir: PathBuf,
    pub database_name: String,
    pub collection_name: String,
    /// Label column
    pub target_column: String,
    /// String value the source uses for a missing cell
    pub missing_sentinel: String,
    pub feature_store_file_name: String,
    pub train_file_name: String,
    pub test_file_name: String,
    /// Fraction of rows held out for testing
    pub train_test_split_ratio: f64,
    pub random_seed: u64,
    pub imputer: ImputerSettings,
    pub validation: ValidationSettings,
    pub model_trainer: ModelTrainerSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            pipeline_name: "NetworkSecurity".to_string(),
            artifact_dir: PathBuf::from("artifacts"),
            database_name: "MOHITDB".to_string(),
            collection_name: "NetworkData".to_string(),
            target_column: "Result".to_string(),
            missing_sentinel: "na".to_string(),
            feature_store_file_name: "phishingData.csv".to_string(),
            train_file_name: "train.csv".to_string(),
            test_file_name: "test.csv".to_string(),
            train_test_split_ratio: 0.2,
            random_seed: 42,
            imputer: ImputerSettings::default(),
            validation: ValidationSettings::default(),
            model_trainer: ModelTrainerSettings::default(),
        }
    }
}

impl PipelineSettings {
    /// Create settings with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a JSON file; absent keys keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let settings: Self = serde_json::from_str(&json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    pub fn with_target_column(mut self, column: impl Into<String>) -> Self {
        self.target_column = column.into();
        self
    }

    pub fn with_split_ratio(mut self, ratio: f64) -> Self {
        self.train_test_split_ratio = ratio;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_imputer(mut self, imputer: ImputerSettings) -> Self {
        self.imputer = imputer;
        self
    }

    pub fn with_validation(mut self, validation: ValidationSettings) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_model_trainer(mut self, model_trainer: ModelTrainerSettings) -> Self {
        self.model_trainer = model_trainer;
        self
    }

    /// Reject settings no stage could run with
    pub fn validate(&self) -> Result<()> {
        let ratio = self.train_test_split_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(invalid("train_test_split_ratio", ratio, "must be in (0, 1)"));
        }
        if self.imputer.n_neighbors == 0 {
            return Err(invalid("imputer.n_neighbors", 0, "must be at least 1"));
        }
        let trainer = &self.model_trainer;
        if !(trainer.fit_threshold >= 0.0) {
            return Err(invalid("model_trainer.fit_threshold", trainer.fit_threshold, "must be >= 0"));
        }
        if trainer.cv_folds < 2 {
            return Err(invalid("model_trainer.cv_folds", trainer.cv_folds, "must be at least 2"));
        }
        if let SearchStrategy::Randomized { n_iter: 0 } = trainer.search {
            return Err(invalid("model_trainer.search.n_iter", 0, "must be at least 1"));
        }
        if trainer.n_jobs == Some(0) {
            return Err(invalid("model_trainer.n_jobs", 0, "must be at least 1"));
        }
        let threshold = self.validation.drift_p_value_threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(invalid("validation.drift_p_value_threshold", threshold, "must be in (0, 1)"));
        }
        if self.target_column.is_empty() {
            return Err(PipelineError::ConfigError("target_column must not be empty".to_string()));
        }
        Ok(())
    }
}

fn invalid(name: &str, value: impl ToString, reason: &str) -> PipelineError {
    PipelineError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Root configuration of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingPipelineConfig {
    pub pipeline_name: String,
    /// `<artifact_dir>/<run_id>`
    pub artifact_root: PathBuf,
    pub run_id: String,
    pub settings: PipelineSettings,
}

impl TrainingPipelineConfig {
    /// Build the run config, stamping the run with the current local time
    pub fn new(settings: PipelineSettings) -> Result<Self> {
        Self::with_timestamp(settings, Local::now())
    }

    /// Build the run config for a fixed timestamp
    pub fn with_timestamp(settings: PipelineSettings, timestamp: DateTime<Local>) -> Result<Self> {
        settings.validate()?;
        let run_id = timestamp.format(RUN_ID_FORMAT).to_string();
        let artifact_root = settings.artifact_dir.join(&run_id);
        Ok(Self {
            pipeline_name: settings.pipeline_name.clone(),
            artifact_root,
            run_id,
            settings,
        })
    }

    pub fn data_ingestion(&self) -> DataIngestionConfig {
        DataIngestionConfig::new(self)
    }

    pub fn data_validation(&self) -> DataValidationConfig {
        DataValidationConfig::new(self)
    }

    pub fn data_transformation(&self) -> DataTransformationConfig {
        DataTransformationConfig::new(self)
    }

    pub fn model_trainer(&self) -> ModelTrainerConfig {
        ModelTrainerConfig::new(self)
    }
}

/// Ingestion stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataIngestionConfig {
    pub data_ingestion_dir: PathBuf,
    pub feature_store_file_path: PathBuf,
    pub training_file_path: PathBuf,
    pub testing_file_path: PathBuf,
    pub train_test_split_ratio: f64,
    pub random_seed: u64,
    pub database_name: String,
    pub collection_name: String,
    pub missing_sentinel: String,
}

impl DataIngestionConfig {
    pub fn new(pipeline: &TrainingPipelineConfig) -> Self {
        let settings = &pipeline.settings;
        let dir = pipeline.artifact_root.join(DATA_INGESTION_DIR_NAME);
        let ingested = dir.join(DATA_INGESTION_INGESTED_DIR);
        Self {
            feature_store_file_path: dir
                .join(DATA_INGESTION_FEATURE_STORE_DIR)
                .join(&settings.feature_store_file_name),
            training_file_path: ingested.join(&settings.train_file_name),
            testing_file_path: ingested.join(&settings.test_file_name),
            data_ingestion_dir: dir,
            train_test_split_ratio: settings.train_test_split_ratio,
            random_seed: settings.random_seed,
            database_name: settings.database_name.clone(),
            collection_name: settings.collection_name.clone(),
            missing_sentinel: settings.missing_sentinel.clone(),
        }
    }
}

/// Validation stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataValidationConfig {
    pub data_validation_dir: PathBuf,
    pub valid_train_file_path: PathBuf,
    pub valid_test_file_path: PathBuf,
    pub invalid_train_file_path: PathBuf,
    pub invalid_test_file_path: PathBuf,
    pub drift_report_file_path: PathBuf,
    pub schema: Option<DatasetSchema>,
    pub drift_p_value_threshold: f64,
    pub fail_on_drift: bool,
}

impl DataValidationConfig {
    pub fn new(pipeline: &TrainingPipelineConfig) -> Self {
        let settings = &pipeline.settings;
        let dir = pipeline.artifact_root.join(DATA_VALIDATION_DIR_NAME);
        let valid = dir.join(DATA_VALIDATION_VALID_DIR);
        let invalid = dir.join(DATA_VALIDATION_INVALID_DIR);
        Self {
            valid_train_file_path: valid.join(&settings.train_file_name),
            valid_test_file_path: valid.join(&settings.test_file_name),
            invalid_train_file_path: invalid.join(&settings.train_file_name),
            invalid_test_file_path: invalid.join(&settings.test_file_name),
            drift_report_file_path: dir
                .join(DATA_VALIDATION_DRIFT_REPORT_DIR)
                .join(DATA_VALIDATION_DRIFT_REPORT_FILE_NAME),
            data_validation_dir: dir,
            schema: settings.validation.schema.clone(),
            drift_p_value_threshold: settings.validation.drift_p_value_threshold,
            fail_on_drift: settings.validation.fail_on_drift,
        }
    }
}

/// Transformation stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTransformationConfig {
    pub data_transformation_dir: PathBuf,
    pub transformed_train_file_path: PathBuf,
    pub transformed_test_file_path: PathBuf,
    pub transformed_object_file_path: PathBuf,
    pub target_column: String,
    pub imputer: ImputerSettings,
}

impl DataTransformationConfig {
    pub fn new(pipeline: &TrainingPipelineConfig) -> Self {
        let settings = &pipeline.settings;
        let dir = pipeline.artifact_root.join(DATA_TRANSFORMATION_DIR_NAME);
        let data_dir = dir.join(DATA_TRANSFORMATION_TRANSFORMED_DATA_DIR);
        Self {
            transformed_train_file_path: data_dir.join(TRANSFORMED_TRAIN_FILE_NAME),
            transformed_test_file_path: data_dir.join(TRANSFORMED_TEST_FILE_NAME),
            transformed_object_file_path: dir
                .join(DATA_TRANSFORMATION_TRANSFORMED_OBJECT_DIR)
                .join(PREPROCESSING_OBJECT_FILE_NAME),
            data_transformation_dir: dir,
            target_column: settings.target_column.clone(),
            imputer: settings.imputer.clone(),
        }
    }
}

/// Model selection stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTrainerConfig {
    pub model_trainer_dir: PathBuf,
    pub trained_model_file_path: PathBuf,
    pub random_seed: u64,
    pub settings: ModelTrainerSettings,
}

impl ModelTrainerConfig {
    pub fn new(pipeline: &TrainingPipelineConfig) -> Self {
        let dir = pipeline.artifact_root.join(MODEL_TRAINER_DIR_NAME);
        Self {
            trained_model_file_path: dir
                .join(MODEL_TRAINER_TRAINED_MODEL_DIR)
                .join(MODEL_TRAINER_TRAINED_MODEL_NAME),
            model_trainer_dir: dir,
            random_seed: pipeline.settings.random_seed,
            settings: pipeline.settings.model_trainer.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_config() -> TrainingPipelineConfig {
        let ts = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let settings = PipelineSettings::new().with_artifact_dir("runs");
        TrainingPipelineConfig::with_timestamp(settings, ts).unwrap()
    }

    #[test]
    fn test_default_settings() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.train_test_split_ratio, 0.2);
        assert_eq!(settings.imputer.n_neighbors, 3);
        assert_eq!(settings.imputer.weights, WeightScheme::Uniform);
        assert_eq!(settings.model_trainer.fit_threshold, 0.05);
        assert_eq!(settings.target_column, "Result");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_run_layout() {
        let config = fixed_config();
        assert_eq!(config.run_id, "03_09_2024_14_05_07");
        assert_eq!(config.artifact_root, PathBuf::from("runs/03_09_2024_14_05_07"));

        let ingestion = config.data_ingestion();
        assert_eq!(
            ingestion.training_file_path,
            PathBuf::from("runs/03_09_2024_14_05_07/data_ingestion/ingested/train.csv")
        );
        assert_eq!(
            ingestion.feature_store_file_path,
            PathBuf::from("runs/03_09_2024_14_05_07/data_ingestion/feature_store/phishingData.csv")
        );

        let validation = config.data_validation();
        assert!(validation.drift_report_file_path.ends_with("data_validation/drift_report/report.yaml"));
        assert!(validation.invalid_test_file_path.ends_with("data_validation/invalid/test.csv"));

        let transformation = config.data_transformation();
        assert!(transformation
            .transformed_object_file_path
            .ends_with("data_transformation/transformed_object/preprocessing.bin"));

        let trainer = config.model_trainer();
        assert!(trainer.trained_model_file_path.ends_with("model_trainer/trained_model/model.bin"));
    }

    #[test]
    fn test_invalid_split_ratio() {
        for ratio in [0.0, 1.0, -0.5, f64::NAN] {
            let settings = PipelineSettings::new().with_split_ratio(ratio);
            assert!(matches!(
                settings.validate(),
                Err(PipelineError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_invalid_search_settings() {
        let mut settings = PipelineSettings::new();
        settings.model_trainer.search = SearchStrategy::Randomized { n_iter: 0 };
        assert!(settings.validate().is_err());

        let mut settings = PipelineSettings::new();
        settings.model_trainer.cv_folds = 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "train_test_split_ratio": 0.3, "model_trainer": { "fit_policy": "Fail" } }"#;
        let settings: PipelineSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.train_test_split_ratio, 0.3);
        assert_eq!(settings.model_trainer.fit_policy, FitPolicy::Fail);
        assert_eq!(settings.model_trainer.cv_folds, 3);
        assert_eq!(settings.collection_name, "NetworkData");
    }
}

//! Data ingestion stage
//!
//! Pulls a whole collection from a [`DocumentSource`], snapshots it to the
//! feature store and writes the seeded train/test split.

mod source;
mod split;

pub use source::{documents_to_frame, Document, DocumentSource, InMemorySource, JsonLinesSource, DOCUMENT_ID_KEY};
pub use split::{split_indices, train_test_split, SplitIndices};

use crate::artifact::DataIngestionArtifact;
use crate::config::DataIngestionConfig;
use crate::error::{PipelineError, Result, Stage, StageContext};
use crate::utils::DataSaver;
use polars::prelude::*;
use tracing::info;

/// Ingestion stage
#[derive(Debug, Clone)]
pub struct DataIngestion {
    config: DataIngestionConfig,
}

impl DataIngestion {
    pub fn new(config: DataIngestionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DataIngestionConfig {
        &self.config
    }

    /// Fetch the configured collection as a table
    pub fn export_collection_as_frame(&self, source: &dyn DocumentSource) -> Result<DataFrame> {
        let documents = source
            .fetch_collection(&self.config.database_name, &self.config.collection_name)
            .map_err(|e| match e {
                e @ PipelineError::IngestionError(_) => e,
                other => PipelineError::IngestionError(other.to_string()),
            })?;

        if documents.is_empty() {
            return Err(PipelineError::IngestionError(format!(
                "Collection {}.{} has no records",
                self.config.database_name, self.config.collection_name
            )));
        }

        let df = documents_to_frame(&documents, &self.config.missing_sentinel)?;
        if df.width() == 0 {
            return Err(PipelineError::IngestionError(format!(
                "Collection {}.{} has no fields besides {}",
                self.config.database_name, self.config.collection_name, DOCUMENT_ID_KEY
            )));
        }
        Ok(df)
    }

    /// Snapshot the full table to the feature store
    pub fn export_data_into_feature_store(&self, df: &mut DataFrame) -> Result<()> {
        DataSaver::save_csv(df, &self.config.feature_store_file_path)
    }

    /// Split and persist train/test, returning `(n_train, n_test)`
    pub fn split_data_as_train_test(&self, df: &DataFrame) -> Result<(usize, usize)> {
        let (mut train, mut test) = train_test_split(
            df,
            self.config.train_test_split_ratio,
            self.config.random_seed,
        )?;

        DataSaver::save_csv(&mut train, &self.config.training_file_path)?;
        DataSaver::save_csv(&mut test, &self.config.testing_file_path)?;
        Ok((train.height(), test.height()))
    }

    /// Run the stage
    pub fn initiate(&self, source: &dyn DocumentSource) -> Result<DataIngestionArtifact> {
        self.run(source).in_stage(Stage::Ingestion)
    }

    fn run(&self, source: &dyn DocumentSource) -> Result<DataIngestionArtifact> {
        info!(
            database = %self.config.database_name,
            collection = %self.config.collection_name,
            "Starting data ingestion"
        );

        let mut df = self.export_collection_as_frame(source)?;
        info!(rows = df.height(), columns = df.width(), "Fetched collection");

        self.export_data_into_feature_store(&mut df)?;
        let (n_train_rows, n_test_rows) = self.split_data_as_train_test(&df)?;

        info!(
            n_train_rows,
            n_test_rows,
            train = %self.config.training_file_path.display(),
            test = %self.config.testing_file_path.display(),
            "Data ingestion complete"
        );

        Ok(DataIngestionArtifact {
            feature_store_file_path: self.config.feature_store_file_path.clone(),
            train_file_path: self.config.training_file_path.clone(),
            test_file_path: self.config.testing_file_path.clone(),
            n_train_rows,
            n_test_rows,
        })
    }
}

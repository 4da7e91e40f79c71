//! Command-line interface for training runs and batch prediction

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{PipelineSettings, TrainingPipelineConfig};
use crate::inference::InferenceBundle;
use crate::ingestion::JsonLinesSource;
use crate::pipeline::{PipelineOutcome, TrainingPipeline};

#[derive(Parser)]
#[command(name = "netsec-pipeline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train and apply a network security classifier")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full training pipeline
    Train {
        /// JSON-lines export of the source collection
        #[arg(short, long)]
        source: PathBuf,

        /// Pipeline settings (JSON); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Root directory for run artifacts
        #[arg(short, long)]
        artifact_dir: Option<PathBuf>,
    },

    /// Predict labels for a CSV file with a trained bundle
    Predict {
        /// Bundle written by a training run
        #[arg(short, long)]
        bundle: PathBuf,

        /// CSV holding the training feature columns
        #[arg(short, long)]
        data: PathBuf,

        /// Output CSV
        #[arg(short, long, default_value = "prediction_output/output.csv")]
        output: PathBuf,

        /// Field value read as a missing feature
        #[arg(long, default_value = "na")]
        missing_sentinel: String,
    },
}

/// Load settings, applying the command-line overrides
pub fn load_settings(config: Option<&Path>, artifact_dir: Option<&Path>) -> anyhow::Result<PipelineSettings> {
    let mut settings = match config {
        Some(path) => PipelineSettings::from_json_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => PipelineSettings::default(),
    };
    if let Some(dir) = artifact_dir {
        settings = settings.with_artifact_dir(dir);
    }
    settings.validate()?;
    Ok(settings)
}

pub fn cmd_train(source: &Path, config: Option<&Path>, artifact_dir: Option<&Path>) -> anyhow::Result<PipelineOutcome> {
    let settings = load_settings(config, artifact_dir)?;
    let pipeline_config = TrainingPipelineConfig::new(settings)?;
    let source = JsonLinesSource::new(source);

    let start = Instant::now();
    let outcome = TrainingPipeline::new(pipeline_config).run(&source)?;
    let trainer = &outcome.model_trainer;

    println!();
    println!("  Run {}", outcome.run_id);
    println!("  {:<22} {}", "best model", trainer.best_model);
    for score in &trainer.model_report {
        println!(
            "  {:<22} cv {:.4}  test {:.4}",
            score.kind.to_string(),
            score.cv_score,
            score.test_score
        );
    }
    println!(
        "  {:<22} f1 {:.4}  precision {:.4}  recall {:.4}",
        "test metrics",
        trainer.test_metric_artifact.f1_score,
        trainer.test_metric_artifact.precision_score,
        trainer.test_metric_artifact.recall_score
    );
    for warning in &trainer.fit_warnings {
        println!("  warning: {}", warning);
    }
    println!("  {:<22} {}", "bundle", trainer.trained_model_file_path.display());
    println!("  {:<22} {:.1}s", "elapsed", start.elapsed().as_secs_f64());
    println!();

    Ok(outcome)
}

pub fn cmd_predict(bundle: &Path, data: &Path, output: &Path, missing_sentinel: &str) -> anyhow::Result<usize> {
    let bundle = InferenceBundle::load(bundle)
        .with_context(|| format!("failed to load bundle {}", bundle.display()))?;
    let rows = bundle.predict_csv(data, output, missing_sentinel)?;
    println!("  {} predictions written to {}", rows, output.display());
    Ok(rows)
}

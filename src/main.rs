//! netsec-pipeline - Main Entry Point
//!
//! Runs a training pipeline or applies a trained bundle to a CSV file.

use clap::Parser;
use netsec_pipeline::cli::{cmd_predict, cmd_train, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netsec_pipeline=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            source,
            config,
            artifact_dir,
        } => {
            cmd_train(&source, config.as_deref(), artifact_dir.as_deref())?;
        }
        Commands::Predict {
            bundle,
            data,
            output,
            missing_sentinel,
        } => {
            cmd_predict(&bundle, &data, &output, &missing_sentinel)?;
        }
    }

    Ok(())
}

//! Seeded train/test row split

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Row indices of a train/test partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Partition `n_samples` rows.
///
/// Rows are permuted with a ChaCha8 generator seeded by `seed`; the first
/// `ceil(test_ratio * n_samples)` permuted rows form the test partition and
/// the rest the training partition.
pub fn split_indices(n_samples: usize, test_ratio: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(PipelineError::InvalidParameter {
            name: "test_ratio".to_string(),
            value: test_ratio.to_string(),
            reason: "must be in (0, 1)".to_string(),
        });
    }

    let n_test = (test_ratio * n_samples as f64).ceil() as usize;
    let n_train = n_samples.saturating_sub(n_test);
    if n_test == 0 || n_train == 0 {
        return Err(PipelineError::IngestionError(format!(
            "Cannot split {} rows with test ratio {}: one partition would be empty",
            n_samples, test_ratio
        )));
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok(SplitIndices { train, test: indices })
}

fn take_rows(df: &DataFrame, rows: &[usize]) -> Result<DataFrame> {
    let idx: Vec<IdxSize> = rows.iter().map(|&i| i as IdxSize).collect();
    Ok(df.take(&IdxCa::from_vec("idx".into(), idx))?)
}

/// Split a table into `(train, test)`
pub fn train_test_split(df: &DataFrame, test_ratio: f64, seed: u64) -> Result<(DataFrame, DataFrame)> {
    let split = split_indices(df.height(), test_ratio, seed)?;
    Ok((take_rows(df, &split.train)?, take_rows(df, &split.test)?))
}

//! Stratified k-fold splitting

use crate::error::{PipelineError, Result};
use ndarray::Array1;

/// A single train/test split; both index lists are ascending
#[derive(Debug, Clone, PartialEq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Unshuffled stratified k-fold splitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StratifiedKFold {
    n_splits: usize,
}

impl Default for StratifiedKFold {
    fn default() -> Self {
        Self::new(3)
    }
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Stratified folds over the labels `y`.
    ///
    /// Labels are sorted and dealt round-robin to decide how many members of
    /// each class every fold receives; each class then hands out its rows in
    /// order, one contiguous run per fold.
    pub fn split(&self, y: &Array1<f64>) -> Result<Vec<CVSplit>> {
        let n_splits = self.n_splits;
        let n_samples = y.len();
        if n_splits < 2 {
            return Err(PipelineError::InvalidParameter {
                name: "n_splits".to_string(),
                value: n_splits.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        if n_samples < n_splits {
            return Err(PipelineError::TrainingError(format!(
                "Cannot have n_splits ({}) greater than n_samples ({})",
                n_splits, n_samples
            )));
        }

        let mut classes: Vec<f64> = y.to_vec();
        classes.sort_by(f64::total_cmp);
        classes.dedup();
        let n_classes = classes.len();

        let mut class_rows: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
        for (idx, v) in y.iter().enumerate() {
            class_rows[classes.partition_point(|c| c < v)].push(idx);
        }

        let largest = class_rows.iter().map(Vec::len).max().unwrap_or(0);
        if largest < n_splits {
            return Err(PipelineError::TrainingError(format!(
                "n_splits ({}) exceeds the number of members in every class",
                n_splits
            )));
        }

        // allocation[fold][class] = how many rows of `class` land in `fold`
        let mut sorted_labels: Vec<usize> = Vec::with_capacity(n_samples);
        for (k, rows) in class_rows.iter().enumerate() {
            sorted_labels.extend(std::iter::repeat(k).take(rows.len()));
        }
        let mut allocation = vec![vec![0usize; n_classes]; n_splits];
        for (pos, &k) in sorted_labels.iter().enumerate() {
            allocation[pos % n_splits][k] += 1;
        }

        let mut test_folds = vec![0usize; n_samples];
        for (k, rows) in class_rows.iter().enumerate() {
            let mut cursor = 0;
            for (fold, counts) in allocation.iter().enumerate() {
                for &row in &rows[cursor..cursor + counts[k]] {
                    test_folds[row] = fold;
                }
                cursor += counts[k];
            }
        }

        Ok((0..n_splits)
            .map(|fold_idx| {
                let (test_indices, train_indices): (Vec<usize>, Vec<usize>) =
                    (0..n_samples).partition(|&i| test_folds[i] == fold_idx);
                CVSplit {
                    train_indices,
                    test_indices,
                    fold_idx,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stratified_k_fold() {
        let y = Array1::from_vec(vec![
            0.0, 0.0, 0.0, 0.0, 0.0, // 5 samples of class 0
            1.0, 1.0, 1.0, 1.0, 1.0, // 5 samples of class 1
        ]);

        let splits = StratifiedKFold::new(5).split(&y).unwrap();

        assert_eq!(splits.len(), 5);

        // Each fold should have 1 sample from each class
        for (i, split) in splits.iter().enumerate() {
            assert_eq!(split.test_indices, vec![i, i + 5]);
        }
    }

    #[test]
    fn test_stratified_k_fold_unbalanced() {
        let y = Array1::from_vec(vec![0.0, 1.0, 0.0, 1.0, 1.0, 1.0]);
        let splits = StratifiedKFold::default().split(&y).unwrap();

        let tests: Vec<Vec<usize>> = splits.iter().map(|s| s.test_indices.clone()).collect();
        assert_eq!(tests, vec![vec![0, 1], vec![2, 3], vec![4, 5]]);
        assert_eq!(splits[2].train_indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_stratified_requires_enough_rows() {
        let cv = StratifiedKFold::default();
        assert!(cv.split(&Array1::from_vec(vec![0.0, 1.0])).is_err());

        let y = Array1::from_vec(vec![0.0, 1.0, 0.0, 1.0]);
        assert!(cv.split(&y).is_err());

        assert!(StratifiedKFold::new(1).split(&y).is_err());
    }
}

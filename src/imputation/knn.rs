//! KNN-based imputation

use crate::error::{PipelineError, Result};
use crate::imputation::{is_missing, Imputer, WeightScheme};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Candidate neighbour ordered by distance, then by training row index
#[derive(Debug, Clone, Copy)]
struct DistanceIdx(f64, usize);

impl PartialEq for DistanceIdx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DistanceIdx {}

impl PartialOrd for DistanceIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistanceIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max heap: the farthest (and, among equals, the latest) candidate sits on top
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

/// KNN-based imputer
///
/// A missing cell in column `j` is filled from the `n_neighbors` nearest
/// training rows that observe column `j`. Distances ignore coordinates missing
/// in either row and are rescaled by the share of coordinates present:
/// `sqrt(n_features / n_shared * sum of squared differences)`. When no training
/// row qualifies the column's training mean is used.
///
/// Columns with no observed training value are dropped at fit time; the
/// output of [`Imputer::transform`] holds only the retained columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNImputer {
    n_neighbors: usize,
    weights: WeightScheme,
    /// Width of the matrix seen during fit
    n_features_in: usize,
    /// Input columns with at least one observed training value, ascending
    valid_features: Vec<usize>,
    /// Training matrix restricted to the retained columns, missing cells included
    fit_data: Option<Array2<f64>>,
    /// Per-column mean of observed training values
    feature_means: Option<Array1<f64>>,
}

impl KNNImputer {
    /// Create new KNN imputer
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
            weights: WeightScheme::Uniform,
            n_features_in: 0,
            valid_features: Vec::new(),
            fit_data: None,
            feature_means: None,
        }
    }

    /// Set weighting scheme
    pub fn with_weights(mut self, weights: WeightScheme) -> Self {
        self.weights = weights;
        self
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    pub fn weights(&self) -> WeightScheme {
        self.weights
    }

    pub fn is_fitted(&self) -> bool {
        self.fit_data.is_some()
    }

    /// Number of columns seen during fit
    pub fn n_features(&self) -> Option<usize> {
        self.is_fitted().then_some(self.n_features_in)
    }

    /// Input columns kept in the output
    pub fn valid_features(&self) -> Option<&[usize]> {
        self.is_fitted().then_some(self.valid_features.as_slice())
    }

    /// Input columns dropped because training never observed them
    pub fn dropped_features(&self) -> Vec<usize> {
        if !self.is_fitted() {
            return Vec::new();
        }
        (0..self.n_features_in)
            .filter(|j| self.valid_features.binary_search(j).is_err())
            .collect()
    }

    /// NaN-aware euclidean distance; `None` when the rows share no observed coordinate
    fn distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> Option<f64> {
        let n_features = a.len();
        let mut shared = 0usize;
        let mut accum = 0.0f64;

        for (&ai, &bi) in a.iter().zip(b.iter()) {
            if is_missing(ai) || is_missing(bi) {
                continue;
            }
            shared += 1;
            let d = ai - bi;
            accum += d * d;
        }

        if shared == 0 {
            return None;
        }
        Some((n_features as f64 / shared as f64 * accum).sqrt())
    }

    /// k nearest donors for column `j`, nearest first
    fn nearest_donors(
        data: &Array2<f64>,
        distances: &[Option<f64>],
        feature_idx: usize,
        k: usize,
    ) -> Vec<DistanceIdx> {
        let mut heap: BinaryHeap<DistanceIdx> = BinaryHeap::with_capacity(k + 1);

        for (i, dist) in distances.iter().enumerate() {
            let Some(dist) = *dist else { continue };
            if is_missing(data[[i, feature_idx]]) {
                continue;
            }
            let candidate = DistanceIdx(dist, i);
            if heap.len() < k {
                heap.push(candidate);
            } else if let Some(top) = heap.peek() {
                if candidate < *top {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }

        heap.into_sorted_vec()
    }

    fn impute_value(&self, data: &Array2<f64>, donors: &[DistanceIdx], feature_idx: usize, mean: f64) -> f64 {
        if donors.is_empty() {
            return mean;
        }

        match self.weights {
            WeightScheme::Uniform => {
                let sum: f64 = donors.iter().map(|d| data[[d.1, feature_idx]]).sum();
                sum / donors.len() as f64
            }
            WeightScheme::Distance => {
                let exact: Vec<f64> = donors
                    .iter()
                    .filter(|d| d.0 == 0.0)
                    .map(|d| data[[d.1, feature_idx]])
                    .collect();
                if !exact.is_empty() {
                    return exact.iter().sum::<f64>() / exact.len() as f64;
                }

                let mut weighted_sum = 0.0;
                let mut weight_sum = 0.0;
                for d in donors {
                    let weight = 1.0 / d.0;
                    weighted_sum += data[[d.1, feature_idx]] * weight;
                    weight_sum += weight;
                }
                weighted_sum / weight_sum
            }
        }
    }
}

impl Default for KNNImputer {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Imputer for KNNImputer {
    fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(PipelineError::DataError(
                "Cannot fit KNN imputer on an empty matrix".to_string(),
            ));
        }

        let mut valid = Vec::with_capacity(x.ncols());
        let mut means = Vec::with_capacity(x.ncols());
        for (j, column) in x.axis_iter(Axis(1)).enumerate() {
            let (sum, count) = column
                .iter()
                .filter(|v| !is_missing(**v))
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            if count > 0 {
                valid.push(j);
                means.push(sum / count as f64);
            }
        }

        if valid.is_empty() {
            return Err(PipelineError::DataError(
                "No column has an observed value to impute from".to_string(),
            ));
        }

        self.fit_data = Some(x.select(Axis(1), &valid));
        self.feature_means = Some(Array1::from_vec(means));
        self.n_features_in = x.ncols();
        self.valid_features = valid;
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (data, means) = match (&self.fit_data, &self.feature_means) {
            (Some(d), Some(m)) => (d, m),
            _ => return Err(PipelineError::ModelNotFitted),
        };

        if x.ncols() != self.n_features_in {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", self.n_features_in),
                actual: format!("{} features", x.ncols()),
            });
        }

        let x = x.select(Axis(1), &self.valid_features);
        let mut result = x.clone();

        for (row_idx, row) in x.rows().into_iter().enumerate() {
            if !row.iter().any(|&v| is_missing(v)) {
                continue;
            }

            let distances: Vec<Option<f64>> = data
                .rows()
                .into_iter()
                .map(|train_row| Self::distance(row, train_row))
                .collect();

            for (j, &value) in row.iter().enumerate() {
                if !is_missing(value) {
                    continue;
                }
                let donors = Self::nearest_donors(data, &distances, j, self.n_neighbors);
                result[[row_idx, j]] = self.impute_value(data, &donors, j, means[j]);
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_knn_imputer_basic() {
        let data = Array2::from_shape_vec(
            (6, 2),
            vec![
                1.0, 10.0,
                2.0, 20.0,
                3.0, 30.0,
                4.0, 40.0,
                f64::NAN, 25.0,
                2.5, f64::NAN,
            ],
        )
        .unwrap();

        let mut imputer = KNNImputer::new(3);
        let result = imputer.fit_transform(&data).unwrap();

        assert!(!result.iter().any(|&v| v.is_nan()));
        // rows 1 and 2 are nearest to 25.0; rows 0 and 3 tie and the lower index wins
        assert!((result[[4, 0]] - (2.0 + 3.0 + 1.0) / 3.0).abs() < 1e-12);
        // 2.5 is equidistant from 2 and 3; next nearest are 1 and 4, row 0 wins the tie
        assert!((result[[5, 1]] - (20.0 + 30.0 + 10.0) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rows_without_missing_are_unchanged() {
        let data = array![[1.0, 2.0], [3.0, f64::NAN], [5.0, 6.0]];
        let mut imputer = KNNImputer::new(2);
        let result = imputer.fit_transform(&data).unwrap();

        assert_eq!(result.row(0), data.row(0));
        assert_eq!(result.row(2), data.row(2));
        assert_eq!(result[[1, 1]], 4.0);
    }

    #[test]
    fn test_knn_imputer_distance_weights() {
        let data = Array2::from_shape_vec(
            (5, 2),
            vec![
                0.0, 0.0,
                1.0, 1.0,
                2.0, 2.0,
                3.0, 3.0,
                0.1, f64::NAN,
            ],
        )
        .unwrap();

        let mut imputer = KNNImputer::new(3).with_weights(WeightScheme::Distance);
        let result = imputer.fit_transform(&data).unwrap();

        assert!(result[[4, 1]].abs() < 1.0);
    }

    #[test]
    fn test_exact_match_dominates_distance_weighting() {
        let train = array![[1.0, 7.0], [2.0, 100.0], [3.0, 200.0]];
        let mut imputer = KNNImputer::new(3).with_weights(WeightScheme::Distance);
        imputer.fit(&train).unwrap();

        let result = imputer.transform(&array![[1.0, f64::NAN]]).unwrap();
        assert_eq!(result[[0, 1]], 7.0);
    }

    #[test]
    fn test_distance_rescales_for_missing_coordinates() {
        let a = array![1.0, f64::NAN, 3.0];
        let b = array![2.0, 5.0, f64::NAN];
        // one shared coordinate out of three
        let d = KNNImputer::distance(a.view(), b.view()).unwrap();
        assert!((d - 3.0f64.sqrt()).abs() < 1e-12);

        let c = array![f64::NAN, 1.0, f64::NAN];
        assert!(KNNImputer::distance(a.view(), c.view()).is_none());
    }

    #[test]
    fn test_mean_fallback_without_donors() {
        // the query row shares no observed coordinate with any training row
        let train = array![[1.0, f64::NAN], [3.0, f64::NAN], [f64::NAN, 8.0]];
        let mut imputer = KNNImputer::new(2);
        imputer.fit(&train).unwrap();

        let result = imputer.transform(&array![[f64::NAN, 10.0]]).unwrap();
        assert_eq!(result[[0, 0]], 2.0);
    }

    #[test]
    fn test_fully_missing_column_is_dropped() {
        let train = array![[1.0, f64::NAN, 10.0], [2.0, f64::NAN, f64::NAN], [4.0, f64::NAN, 30.0]];
        let mut imputer = KNNImputer::new(2);
        let out = imputer.fit_transform(&train).unwrap();

        assert_eq!(imputer.n_features(), Some(3));
        assert_eq!(imputer.valid_features(), Some(&[0, 2][..]));
        assert_eq!(imputer.dropped_features(), vec![1]);
        assert_eq!(out.dim(), (3, 2));
        assert_eq!(out[[1, 1]], 20.0);

        // unseen rows keep the fitted input width and lose the same column
        let test = imputer.transform(&array![[3.0, 7.0, f64::NAN]]).unwrap();
        assert_eq!(test.dim(), (1, 2));
        assert_eq!(test[[0, 0]], 3.0);
        assert!(imputer.transform(&array![[3.0, f64::NAN]]).is_err());
    }

    #[test]
    fn test_all_columns_missing_fails_fit() {
        let train = array![[f64::NAN, f64::NAN], [f64::NAN, f64::NAN]];
        let mut imputer = KNNImputer::new(2);
        assert!(imputer.fit(&train).is_err());
        assert!(!imputer.is_fitted());
    }

    #[test]
    fn test_transform_does_not_mutate_fitted_state() {
        let train = array![[1.0, 2.0], [2.0, f64::NAN], [3.0, 6.0]];
        let mut imputer = KNNImputer::new(1);
        imputer.fit(&train).unwrap();
        let before = imputer.clone();

        imputer.transform(&array![[f64::NAN, 5.0], [10.0, f64::NAN]]).unwrap();

        assert_eq!(imputer.fit_data.as_ref().unwrap().dim(), before.fit_data.as_ref().unwrap().dim());
        assert_eq!(imputer.feature_means, before.feature_means);
    }

    #[test]
    fn test_unfitted_and_width_mismatch() {
        let imputer = KNNImputer::new(3);
        assert!(matches!(
            imputer.transform(&array![[1.0]]),
            Err(PipelineError::ModelNotFitted)
        ));

        let mut imputer = KNNImputer::new(3);
        imputer.fit(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        assert!(matches!(
            imputer.transform(&array![[1.0, 2.0, 3.0]]),
            Err(PipelineError::ShapeError { .. })
        ));
    }
}

//! Missing-value imputation
//!
//! Missing cells are represented as `NaN` in every numeric matrix the
//! pipeline hands around; [`is_missing`] is the single test for that marker.

mod knn;

pub use knn::KNNImputer;

use crate::error::Result;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// How neighbour values are combined into an imputed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightScheme {
    /// Plain mean of the neighbours
    Uniform,
    /// Inverse-distance weighted mean; exact matches take all the weight
    Distance,
}

/// Trait for imputers
pub trait Imputer: Send + Sync {
    /// Fit the imputer on data with missing values
    fn fit(&mut self, x: &Array2<f64>) -> Result<()>;

    /// Transform data by imputing missing values
    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Fit and transform in one step
    fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }
}

/// Check if value is missing (NaN)
#[inline]
pub fn is_missing(v: f64) -> bool {
    v.is_nan()
}

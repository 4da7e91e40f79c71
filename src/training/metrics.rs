//! Classification metrics

use crate::artifact::ClassificationMetric;
use crate::config::SelectionMetric;
use ndarray::Array1;

/// Confusion counts `(tp, fp, tn, fn)` with class 1 as the positive class
pub fn confusion_counts(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> (usize, usize, usize, usize) {
    let mut tp = 0;
    let mut fp = 0;
    let mut tn = 0;
    let mut fn_ = 0;

    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        match (*t > 0.5, *p > 0.5) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (false, false) => tn += 1,
            (true, false) => fn_ += 1,
        }
    }

    (tp, fp, tn, fn_)
}

/// Fraction of matching labels
pub fn accuracy_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| (*t - *p).abs() < 0.5)
        .count();
    correct as f64 / y_true.len() as f64
}

/// Precision, recall and F1 of the positive class; an undefined ratio counts as 0
pub fn classification_metric(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> ClassificationMetric {
    let (tp, fp, _, fn_) = confusion_counts(y_true, y_pred);

    let precision = if tp + fp > 0 {
        tp as f64 / (tp + fp) as f64
    } else {
        0.0
    };
    let recall = if tp + fn_ > 0 {
        tp as f64 / (tp + fn_) as f64
    } else {
        0.0
    };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    ClassificationMetric {
        f1_score: f1,
        precision_score: precision,
        recall_score: recall,
    }
}

/// Coefficient of determination.
///
/// A constant `y_true` scores 1.0 when predicted exactly and 0.0 otherwise.
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    let n = y_true.len() as f64;
    let mean = y_true.sum() / n;
    let ss_tot: f64 = y_true.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();

    if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Score predictions with the given selection metric
pub fn selection_score(metric: SelectionMetric, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    match metric {
        SelectionMetric::R2 => r2_score(y_true, y_pred),
        SelectionMetric::Accuracy => accuracy_score(y_true, y_pred),
        SelectionMetric::F1 => classification_metric(y_true, y_pred).f1_score,
    }
}

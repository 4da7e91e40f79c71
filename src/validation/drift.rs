//! Two-sample Kolmogorov-Smirnov drift check

use crate::error::{PipelineError, Result};
use crate::export::atomic_write;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::io::Write;
use std::path::Path;

/// Result of one two-sample KS test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KsOutcome {
    /// Largest gap between the two empirical CDFs
    pub statistic: f64,
    /// Asymptotic p-value of `statistic`
    pub p_value: f64,
}

/// Kolmogorov-Smirnov test for distribution comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KolmogorovSmirnovTest {
    /// Significance level (alpha)
    alpha: f64,
}

impl KolmogorovSmirnovTest {
    /// Create new KS test
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Run the test; NaN entries are ignored
    pub fn test(&self, reference: &[f64], current: &[f64]) -> Result<KsOutcome> {
        let mut a: Vec<f64> = reference.iter().copied().filter(|v| !v.is_nan()).collect();
        let mut b: Vec<f64> = current.iter().copied().filter(|v| !v.is_nan()).collect();
        if a.is_empty() || b.is_empty() {
            return Err(PipelineError::ValidationError(
                "KS test needs at least one observed value on each side".to_string(),
            ));
        }
        a.sort_by(f64::total_cmp);
        b.sort_by(f64::total_cmp);

        let statistic = ks_statistic(&a, &b);
        let (n1, n2) = (a.len() as f64, b.len() as f64);
        let ne = (n1 * n2 / (n1 + n2)).sqrt();
        let lambda = (ne + 0.12 + 0.11 / ne) * statistic;

        Ok(KsOutcome {
            statistic,
            p_value: kolmogorov_q(lambda),
        })
    }

    /// Whether `outcome` counts as drift at this test's level
    pub fn is_drift(&self, outcome: &KsOutcome) -> bool {
        outcome.p_value < self.alpha
    }
}

impl Default for KolmogorovSmirnovTest {
    fn default() -> Self {
        Self::new(0.05)
    }
}

/// Sup distance between the empirical CDFs of two sorted samples
fn ks_statistic(a: &[f64], b: &[f64]) -> f64 {
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut d = 0.0f64;

    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n1 - j as f64 / n2).abs());
    }
    d
}

/// Kolmogorov survival function `Q(λ) = 2 Σ (-1)^(k-1) exp(-2 k² λ²)`
fn kolmogorov_q(lambda: f64) -> f64 {
    const EPS1: f64 = 1e-6;
    const EPS2: f64 = 1e-16;

    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut prev = 0.0f64;

    for k in 1..=100 {
        let kf = k as f64;
        let term = fac * (a2 * kf * kf).exp();
        sum += term;
        if term.abs() <= EPS1 * prev || term.abs() <= EPS2 * sum {
            return sum.clamp(0.0, 1.0);
        }
        fac = -fac;
        prev = term.abs();
    }
    // series does not converge for tiny λ, where the distributions are indistinguishable
    1.0
}

/// Drift verdict for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrift {
    pub p_value: f64,
    pub drift_status: bool,
}

/// Per-column drift verdicts, in column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriftReport {
    entries: Vec<(String, ColumnDrift)>,
}

impl DriftReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, drift: ColumnDrift) {
        self.entries.push((column.into(), drift));
    }

    pub fn get(&self, column: &str) -> Option<&ColumnDrift> {
        self.entries.iter().find(|(c, _)| c == column).map(|(_, d)| d)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Any column drifted
    pub fn drift_detected(&self) -> bool {
        self.entries.iter().any(|(_, d)| d.drift_status)
    }

    /// Columns that drifted
    pub fn drifted_columns(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, d)| d.drift_status)
            .map(|(c, _)| c.as_str())
            .collect()
    }

    /// YAML document `{column: {p_value, drift_status}}`
    pub fn to_yaml(&self) -> Result<String> {
        let mut mapping = Mapping::new();
        for (column, drift) in &self.entries {
            mapping.insert(Value::String(column.clone()), serde_yaml::to_value(drift)?);
        }
        Ok(serde_yaml::to_string(&mapping)?)
    }

    /// Write the YAML report, replacing any previous one
    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = self.to_yaml()?;
        atomic_write(path, |writer| Ok(writer.write_all(yaml.as_bytes())?))
    }
}

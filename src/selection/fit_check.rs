//! Fit-quality gate on the selected model

use crate::artifact::{ClassificationMetric, FitWarning};
use crate::config::FitPolicy;
use crate::error::{PipelineError, Result};
use tracing::warn;

/// Compare train and test F1 of the selected model
pub fn check_fit(
    train: &ClassificationMetric,
    test: &ClassificationMetric,
    expected_score: f64,
    threshold: f64,
) -> Vec<FitWarning> {
    let (train, test) = (train.f1_score, test.f1_score);
    let mut warnings = Vec::new();

    let gap = train - test;
    if gap > threshold {
        warnings.push(FitWarning::Overfit { train, test, gap });
    } else if -gap > threshold {
        warnings.push(FitWarning::Underfit { train, test, gap: -gap });
    }
    if test < expected_score {
        warnings.push(FitWarning::BelowExpected {
            test,
            expected: expected_score,
        });
    }
    warnings
}

/// Log the warnings, or turn them into an error under [`FitPolicy::Fail`]
pub fn apply_policy(policy: FitPolicy, warnings: &[FitWarning]) -> Result<()> {
    if warnings.is_empty() {
        return Ok(());
    }
    match policy {
        FitPolicy::Warn => {
            for w in warnings {
                warn!(warning = %w, "Selected model failed the fit check");
            }
            Ok(())
        }
        FitPolicy::Fail => {
            let reasons: Vec<String> = warnings.iter().map(ToString::to_string).collect();
            Err(PipelineError::TrainingError(format!(
                "Selected model failed the fit check: {}",
                reasons.join("; ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(f1: f64) -> ClassificationMetric {
        ClassificationMetric {
            f1_score: f1,
            precision_score: f1,
            recall_score: f1,
        }
    }

    #[test]
    fn test_within_threshold_is_clean() {
        assert!(check_fit(&metric(0.93), &metric(0.90), 0.6, 0.05).is_empty());
    }

    #[test]
    fn test_overfit_and_underfit() {
        let warnings = check_fit(&metric(1.0), &metric(0.8), 0.6, 0.05);
        assert!(matches!(warnings[..], [FitWarning::Overfit { .. }]));

        let warnings = check_fit(&metric(0.7), &metric(0.9), 0.6, 0.05);
        assert!(matches!(warnings[..], [FitWarning::Underfit { .. }]));
    }

    #[test]
    fn test_below_expected_combines_with_gap() {
        let warnings = check_fit(&metric(0.9), &metric(0.5), 0.6, 0.05);
        assert_eq!(warnings.len(), 2);
        assert_eq!(
            warnings[1],
            FitWarning::BelowExpected {
                test: 0.5,
                expected: 0.6
            }
        );
    }

    #[test]
    fn test_policy() {
        let warnings = check_fit(&metric(1.0), &metric(0.5), 0.6, 0.05);
        assert!(apply_policy(FitPolicy::Warn, &warnings).is_ok());
        assert!(matches!(
            apply_policy(FitPolicy::Fail, &warnings),
            Err(PipelineError::TrainingError(_))
        ));
        assert!(apply_policy(FitPolicy::Fail, &[]).is_ok());
    }
}

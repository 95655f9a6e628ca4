//! # Point-Estimate Calculator
//!
//! Aggregates the panel into scalar counts once, then forms Se, Sp, PPV and
//! NPV as ratios of those counts. Denominators count *observations*, so a
//! diseased subject contributes `J` to the diseased total.

use crate::assemble::AssembledData;
use crate::types::{Marginal, Metric};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{metric} is undefined: the {marginal} total is zero.")]
pub struct UndefinedMetricError {
    pub metric: Metric,
    pub marginal: Marginal,
}

/// Observation-level totals over the whole panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateCounts {
    pub n_subjects: usize,
    pub n_raters: usize,
    pub n_observations: usize,
    pub true_positives: f64,
    pub true_negatives: f64,
    pub false_positives: f64,
    pub false_negatives: f64,
    pub diseased: f64,
    pub non_diseased: f64,
    pub test_positive: f64,
    pub test_negative: f64,
}

impl AggregateCounts {
    pub fn from_data(data: &AssembledData) -> Self {
        let mut true_positives = 0.0;
        let mut true_negatives = 0.0;
        let mut diseased = 0.0;
        let mut test_positive = 0.0;

        for obs in data.observations() {
            true_positives += obs.true_positive();
            true_negatives += obs.true_negative();
            diseased += obs.disease();
            test_positive += obs.result();
        }

        let n_observations = data.n_observations();
        let total = n_observations as f64;
        let non_diseased = total - diseased;
        let test_negative = total - test_positive;

        Self {
            n_subjects: data.n_subjects(),
            n_raters: data.n_raters(),
            n_observations,
            true_positives,
            true_negatives,
            false_positives: test_positive - true_positives,
            false_negatives: test_negative - true_negatives,
            diseased,
            non_diseased,
            test_positive,
            test_negative,
        }
    }

    /// Total observations in the given marginal group.
    pub fn marginal_total(&self, marginal: Marginal) -> f64 {
        match marginal {
            Marginal::Diseased => self.diseased,
            Marginal::NonDiseased => self.non_diseased,
            Marginal::TestPositive => self.test_positive,
            Marginal::TestNegative => self.test_negative,
        }
    }

    /// Numerator of the ratio for `metric`.
    pub fn numerator(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Sensitivity | Metric::PositivePredictiveValue => self.true_positives,
            Metric::Specificity | Metric::NegativePredictiveValue => self.true_negatives,
        }
    }
}

/// Computes one metric's point estimate, failing on an empty denominator.
pub fn point_estimate(
    counts: &AggregateCounts,
    metric: Metric,
) -> Result<f64, UndefinedMetricError> {
    let marginal = metric.marginal();
    let denominator = counts.marginal_total(marginal);
    if denominator <= 0.0 {
        return Err(UndefinedMetricError { metric, marginal });
    }
    Ok(counts.numerator(metric) / denominator)
}

/// Se, Sp, PPV and NPV for one panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointEstimates {
    pub sensitivity: f64,
    pub specificity: f64,
    pub ppv: f64,
    pub npv: f64,
}

impl PointEstimates {
    /// All four estimates, or the first metric whose denominator is empty.
    pub fn from_counts(counts: &AggregateCounts) -> Result<Self, UndefinedMetricError> {
        Ok(Self {
            sensitivity: point_estimate(counts, Metric::Sensitivity)?,
            specificity: point_estimate(counts, Metric::Specificity)?,
            ppv: point_estimate(counts, Metric::PositivePredictiveValue)?,
            npv: point_estimate(counts, Metric::NegativePredictiveValue)?,
        })
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Sensitivity => self.sensitivity,
            Metric::Specificity => self.specificity,
            Metric::PositivePredictiveValue => self.ppv,
            Metric::NegativePredictiveValue => self.npv,
        }
    }
}

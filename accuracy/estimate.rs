//! # Estimation Orchestrator
//!
//! Runs the three layers in order (assemble, point estimates, variance) and
//! packages the result. Either all four metrics are produced or the call fails;
//! there is no partial report.

use crate::assemble::{AssembledData, DataShapeError, RaterTable, assemble};
use crate::point::{AggregateCounts, PointEstimates, UndefinedMetricError, point_estimate};
use crate::types::{AccuracyReport, Metric, MetricEstimate, VarianceModel};
use crate::variance::{UndefinedVarianceError, estimate_variance};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimationError {
    #[error("Input data has the wrong shape: {0}")]
    DataShape(#[from] DataShapeError),
    #[error(transparent)]
    UndefinedMetric(#[from] UndefinedMetricError),
    #[error(transparent)]
    UndefinedVariance(#[from] UndefinedVarianceError),
}

/// Cluster-adjusted Se, Sp, PPV and NPV with 95% Wald intervals.
pub fn estimate_accuracy(table: &RaterTable) -> Result<AccuracyReport, EstimationError> {
    let data = assemble(table)?;
    estimate_assembled(&data, VarianceModel::Clustered)
}

/// The same estimates under both the clustered and the naive variance model.
pub fn estimate_comparison(table: &RaterTable) -> Result<ComparisonReport, EstimationError> {
    let data = assemble(table)?;
    let clustered = estimate_assembled(&data, VarianceModel::Clustered)?;
    let naive = estimate_assembled(&data, VarianceModel::Independent)?;
    Ok(ComparisonReport {
        counts: AggregateCounts::from_data(&data),
        clustered,
        naive,
    })
}

/// Runs the point and variance layers over already assembled data.
pub fn estimate_assembled(
    data: &AssembledData,
    model: VarianceModel,
) -> Result<AccuracyReport, EstimationError> {
    let counts = AggregateCounts::from_data(data);
    log::info!(
        "Estimating accuracy for {} subjects x {} raters ({} observations, {:?} variance)",
        counts.n_subjects,
        counts.n_raters,
        counts.n_observations,
        model
    );
    if model == VarianceModel::Clustered && counts.n_subjects == 1 {
        log::warn!("Only one subject: clustered variances are zero by construction.");
    }

    let points = PointEstimates::from_counts(&counts)?;
    let [sensitivity, specificity, ppv, npv] = Metric::ALL
        .map(|metric| metric_estimate(data, &counts, metric, points.get(metric), model));

    let report = AccuracyReport {
        variance_model: model,
        n_subjects: counts.n_subjects,
        n_raters: counts.n_raters,
        n_observations: counts.n_observations,
        sensitivity: sensitivity?,
        specificity: specificity?,
        ppv: ppv?,
        npv: npv?,
    };

    for est in report.iter() {
        if est.exceeds_unit_interval() {
            log::warn!(
                "{} interval [{:.4}, {:.4}] extends beyond [0, 1]; the Wald approximation is poor here.",
                est.metric,
                est.lower,
                est.upper
            );
        }
    }
    log::info!("Estimation complete.");
    Ok(report)
}

/// Point estimate, variance and interval for a single metric.
///
/// Useful when only some metrics are defined for a panel, e.g. a panel of
/// diseased subjects only has a sensitivity.
pub fn estimate_metric(
    data: &AssembledData,
    metric: Metric,
    model: VarianceModel,
) -> Result<MetricEstimate, EstimationError> {
    let counts = AggregateCounts::from_data(data);
    let estimate = point_estimate(&counts, metric)?;
    metric_estimate(data, &counts, metric, estimate, model)
}

fn metric_estimate(
    data: &AssembledData,
    counts: &AggregateCounts,
    metric: Metric,
    estimate: f64,
    model: VarianceModel,
) -> Result<MetricEstimate, EstimationError> {
    let variance = estimate_variance(data, counts, metric, estimate, model)?;
    Ok(MetricEstimate::wald(
        metric,
        estimate,
        variance.variance,
        variance.standard_error,
    ))
}

/// Clustered and naive estimates of the same panel, plus its 2×2 counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub counts: AggregateCounts,
    pub clustered: AccuracyReport,
    pub naive: AccuracyReport,
}

impl ComparisonReport {
    /// Clustered SE over naive SE for one metric.
    ///
    /// Returns `None` when the naive standard error is zero.
    pub fn design_effect(&self, metric: Metric) -> Option<f64> {
        let naive = self.naive.get(metric).standard_error;
        if naive > 0.0 {
            Some(self.clustered.get(metric).standard_error / naive)
        } else {
            None
        }
    }
}

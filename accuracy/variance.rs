//! # Cluster-Variance Estimator
//!
//! Each metric is a ratio of sums over observations. Its sampling variance
//! under resampling of whole subjects is estimated by linearization: every
//! resampling unit (a subject, or a single observation for the naive baseline)
//! is reduced to one influence residual, and the squared residuals are summed.
//!
//! Se and Sp have a fixed denominator within their marginal group, so the
//! residual of unit `i` is
//!
//! ```text
//! r_i = Σ_j (y_ij − p̂) · g_ij          Var = n / M² · Σ_i r_i²
//! ```
//!
//! with `y = result, g = d, M = TotalDiseased` for Se and
//! `y = 1 − result, g = 1 − d, M = TotalNonDiseased` for Sp.
//!
//! PPV and NPV divide two random sums, so the residual is the first-order
//! Taylor expansion of `A/B` around `(â, b̂)`:
//!
//! ```text
//! ε_ij = (a_ij − â) − p̂ · (b_ij − b̂)
//! r_i  = Σ_j ε_ij / b̂                   Var = n / N² · Σ_i r_i²
//! ```
//!
//! with `a = tp, b = result` for PPV and `a = tn, b = 1 − result` for NPV,
//! `â = ΣA / N` and `b̂ = ΣB / N`.
//!
//! In every case `SE = sqrt(Var / n)`. With a single subject the only residual
//! is a deviation from its own mean, which is zero, so the clustered variance
//! of a one-subject panel is always zero.

use crate::assemble::{AssembledData, Observation};
use crate::point::AggregateCounts;
use crate::types::{Metric, VarianceModel};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("The variance of {metric} is undefined: {reason}.")]
pub struct UndefinedVarianceError {
    pub metric: Metric,
    pub reason: &'static str,
}

/// Linearized variance of one metric under one resampling model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VarianceEstimate {
    pub metric: Metric,
    pub model: VarianceModel,
    /// Number of independent resampling units (`n` subjects, or `N` observations).
    pub n_units: usize,
    pub sum_of_squares: f64,
    pub variance: f64,
    pub standard_error: f64,
}

/// The per-observation linear term and the scale that turns summed squares
/// into a variance.
#[derive(Debug, Clone, Copy)]
enum Linearization {
    /// Ratio with a fixed marginal denominator (Se, Sp).
    Conditional { estimate: f64, marginal_total: f64 },
    /// Ratio of two random sums (PPV, NPV).
    Ratio {
        estimate: f64,
        numerator_mean: f64,
        denominator_mean: f64,
        n_observations: f64,
    },
}

impl Linearization {
    fn new(
        metric: Metric,
        counts: &AggregateCounts,
        estimate: f64,
    ) -> Result<Self, UndefinedVarianceError> {
        if !estimate.is_finite() {
            return Err(UndefinedVarianceError {
                metric,
                reason: "the point estimate is not finite",
            });
        }
        let marginal_total = counts.marginal_total(metric.marginal());
        if marginal_total <= 0.0 {
            return Err(UndefinedVarianceError {
                metric,
                reason: "the marginal total is zero",
            });
        }

        match metric {
            Metric::Sensitivity | Metric::Specificity => Ok(Self::Conditional {
                estimate,
                marginal_total,
            }),
            Metric::PositivePredictiveValue | Metric::NegativePredictiveValue => {
                if counts.n_observations == 0 {
                    return Err(UndefinedVarianceError {
                        metric,
                        reason: "there are no observations",
                    });
                }
                let n_observations = counts.n_observations as f64;
                Ok(Self::Ratio {
                    estimate,
                    numerator_mean: counts.numerator(metric) / n_observations,
                    denominator_mean: marginal_total / n_observations,
                    n_observations,
                })
            }
        }
    }

    /// Contribution of one observation to its unit's residual.
    #[inline]
    fn term(&self, metric: Metric, obs: &Observation) -> f64 {
        match *self {
            Self::Conditional { estimate, .. } => {
                let (outcome, group) = match metric {
                    Metric::Sensitivity => (obs.result(), obs.disease()),
                    _ => (1.0 - obs.result(), 1.0 - obs.disease()),
                };
                (outcome - estimate) * group
            }
            Self::Ratio {
                estimate,
                numerator_mean,
                denominator_mean,
                ..
            } => {
                let (a, b) = match metric {
                    Metric::PositivePredictiveValue => (obs.true_positive(), obs.result()),
                    _ => (obs.true_negative(), 1.0 - obs.result()),
                };
                (a - numerator_mean) - estimate * (b - denominator_mean)
            }
        }
    }

    /// Divisor applied to each unit's summed terms.
    fn unit_divisor(&self) -> f64 {
        match *self {
            Self::Conditional { .. } => 1.0,
            Self::Ratio {
                denominator_mean, ..
            } => denominator_mean,
        }
    }

    /// `M` for conditional ratios, `N` for ratios of random sums.
    fn scale(&self) -> f64 {
        match *self {
            Self::Conditional { marginal_total, .. } => marginal_total,
            Self::Ratio { n_observations, .. } => n_observations,
        }
    }
}

/// One linearized residual per resampling unit, in subject order.
pub fn unit_residuals(
    data: &AssembledData,
    counts: &AggregateCounts,
    metric: Metric,
    estimate: f64,
    model: VarianceModel,
) -> Result<Array1<f64>, UndefinedVarianceError> {
    let linearization = Linearization::new(metric, counts, estimate)?;
    Ok(residuals_with(data, &linearization, metric, model))
}

fn residuals_with(
    data: &AssembledData,
    linearization: &Linearization,
    metric: Metric,
    model: VarianceModel,
) -> Array1<f64> {
    let divisor = linearization.unit_divisor();
    let unit_residual = |unit: &[Observation]| {
        let summed: f64 = unit.iter().map(|obs| linearization.term(metric, obs)).sum();
        summed / divisor
    };
    match model {
        VarianceModel::Clustered => data
            .clusters()
            .map(|(_, observations)| unit_residual(observations))
            .collect(),
        VarianceModel::Independent => data
            .observations()
            .iter()
            .map(|obs| unit_residual(std::slice::from_ref(obs)))
            .collect(),
    }
}

/// Estimates the variance and standard error of `estimate` for `metric`.
pub fn estimate_variance(
    data: &AssembledData,
    counts: &AggregateCounts,
    metric: Metric,
    estimate: f64,
    model: VarianceModel,
) -> Result<VarianceEstimate, UndefinedVarianceError> {
    let linearization = Linearization::new(metric, counts, estimate)?;
    let residuals = residuals_with(data, &linearization, metric, model);

    let n_units = residuals.len();
    if n_units == 0 {
        return Err(UndefinedVarianceError {
            metric,
            reason: "there are no resampling units",
        });
    }

    let sum_of_squares = residuals.dot(&residuals);
    let scale = linearization.scale();
    let n = n_units as f64;
    let variance = n / (scale * scale) * sum_of_squares;
    let standard_error = (variance / n).sqrt();

    if !variance.is_finite() || !standard_error.is_finite() {
        return Err(UndefinedVarianceError {
            metric,
            reason: "the linearized variance is not finite",
        });
    }

    log::debug!(
        "{metric} ({model:?}): units={n_units}, SS={sum_of_squares:.6e}, var={variance:.6e}, se={standard_error:.6e}"
    );

    Ok(VarianceEstimate {
        metric,
        model,
        n_units,
        sum_of_squares,
        variance,
        standard_error,
    })
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Multiplier for a two-sided 95% Wald interval under the normal approximation.
pub const WALD_Z_95: f64 = 1.96;

/// The four diagnostic-accuracy ratios this crate estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Sensitivity,
    Specificity,
    PositivePredictiveValue,
    NegativePredictiveValue,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Sensitivity,
        Metric::Specificity,
        Metric::PositivePredictiveValue,
        Metric::NegativePredictiveValue,
    ];

    /// Short clinical abbreviation (Se, Sp, PPV, NPV).
    pub fn abbreviation(self) -> &'static str {
        match self {
            Metric::Sensitivity => "Se",
            Metric::Specificity => "Sp",
            Metric::PositivePredictiveValue => "PPV",
            Metric::NegativePredictiveValue => "NPV",
        }
    }

    /// The marginal whose total forms the denominator of this ratio.
    pub fn marginal(self) -> Marginal {
        match self {
            Metric::Sensitivity => Marginal::Diseased,
            Metric::Specificity => Marginal::NonDiseased,
            Metric::PositivePredictiveValue => Marginal::TestPositive,
            Metric::NegativePredictiveValue => Marginal::TestNegative,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// A marginal group of observations, used to name empty denominators in errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Marginal {
    Diseased,
    NonDiseased,
    TestPositive,
    TestNegative,
}

impl fmt::Display for Marginal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Marginal::Diseased => "diseased",
            Marginal::NonDiseased => "non-diseased",
            Marginal::TestPositive => "test-positive",
            Marginal::TestNegative => "test-negative",
        };
        f.write_str(label)
    }
}

/// The resampling unit assumed by the variance estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VarianceModel {
    /// Subjects are the independent units; a subject's `J` ratings move together.
    #[default]
    Clustered,
    /// Every observation is treated as independent. Only useful as a baseline
    /// for judging how much clustering inflates (or deflates) uncertainty.
    Independent,
}

/// Point estimate, linearized variance and 95% Wald interval for one metric.
///
/// `lower` and `upper` are not clipped to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricEstimate {
    pub metric: Metric,
    pub estimate: f64,
    pub variance: f64,
    pub standard_error: f64,
    pub lower: f64,
    pub upper: f64,
}

impl MetricEstimate {
    /// Builds the Wald interval `estimate ± 1.96·SE`.
    pub fn wald(metric: Metric, estimate: f64, variance: f64, standard_error: f64) -> Self {
        let half_width = WALD_Z_95 * standard_error;
        Self {
            metric,
            estimate,
            variance,
            standard_error,
            lower: estimate - half_width,
            upper: estimate + half_width,
        }
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// `(point_estimate, lower_ci, upper_ci)`.
    pub fn triple(&self) -> (f64, f64, f64) {
        (self.estimate, self.lower, self.upper)
    }

    /// True when the interval extends past the natural proportion range.
    pub fn exceeds_unit_interval(&self) -> bool {
        self.lower < 0.0 || self.upper > 1.0
    }
}

/// The full result of one estimation run: all four metrics, or nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub variance_model: VarianceModel,
    pub n_subjects: usize,
    pub n_raters: usize,
    pub n_observations: usize,
    pub sensitivity: MetricEstimate,
    pub specificity: MetricEstimate,
    pub ppv: MetricEstimate,
    pub npv: MetricEstimate,
}

impl AccuracyReport {
    pub fn get(&self, metric: Metric) -> &MetricEstimate {
        match metric {
            Metric::Sensitivity => &self.sensitivity,
            Metric::Specificity => &self.specificity,
            Metric::PositivePredictiveValue => &self.ppv,
            Metric::NegativePredictiveValue => &self.npv,
        }
    }

    /// Se, Sp, PPV, NPV as `(estimate, lower, upper)` triples, in that order.
    pub fn triples(&self) -> [(f64, f64, f64); 4] {
        Metric::ALL.map(|metric| self.get(metric).triple())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricEstimate> + '_ {
        Metric::ALL.into_iter().map(move |metric| self.get(metric))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn wald_interval_is_symmetric_and_unclipped() {
        let est = MetricEstimate::wald(Metric::Sensitivity, 0.95, 0.0009, 0.03);
        assert_abs_diff_eq!(est.lower, 0.95 - 1.96 * 0.03, epsilon = 1e-15);
        assert_abs_diff_eq!(est.upper, 0.95 + 1.96 * 0.03, epsilon = 1e-15);
        assert!(est.upper > 1.0);
        assert!(est.exceeds_unit_interval());
        assert_abs_diff_eq!(est.width(), 2.0 * 1.96 * 0.03, epsilon = 1e-15);
    }

    #[test]
    fn metrics_map_to_their_denominators() {
        assert_eq!(Metric::Sensitivity.marginal(), Marginal::Diseased);
        assert_eq!(Metric::Specificity.marginal(), Marginal::NonDiseased);
        assert_eq!(
            Metric::PositivePredictiveValue.marginal(),
            Marginal::TestPositive
        );
        assert_eq!(
            Metric::NegativePredictiveValue.marginal(),
            Marginal::TestNegative
        );
        assert_eq!(Metric::NegativePredictiveValue.to_string(), "NPV");
    }
}

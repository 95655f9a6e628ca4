//! Human-readable output for an estimation run: a TOML record that can be
//! saved and reloaded, and a plain-text summary for the terminal.

use crate::data::LoaderConfig;
use crate::estimate::ComparisonReport;
use crate::point::AggregateCounts;
use crate::types::{AccuracyReport, Metric, WALD_Z_95};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to read or write report file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML report file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize report to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

/// Everything needed to reproduce and read one estimation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportFile {
    /// Path of the study table the estimates were computed from.
    pub input: String,
    pub wald_multiplier: f64,
    pub loader: LoaderConfig,
    pub counts: AggregateCounts,
    pub clustered: AccuracyReport,
    /// Observation-independent baseline, only present when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naive: Option<AccuracyReport>,
}

impl ReportFile {
    pub fn new(
        input: &str,
        loader: LoaderConfig,
        comparison: ComparisonReport,
        include_naive: bool,
    ) -> Self {
        Self {
            input: input.to_string(),
            wald_multiplier: WALD_Z_95,
            loader,
            counts: comparison.counts,
            clustered: comparison.clustered,
            naive: include_naive.then_some(comparison.naive),
        }
    }

    /// Writes the report as pretty-printed TOML.
    pub fn save(&self, path: &str) -> Result<(), ReportError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn load(path: &str) -> Result<Self, ReportError> {
        let toml_string = fs::read_to_string(path)?;
        let report = toml::from_str(&toml_string)?;
        Ok(report)
    }
}

/// Plain-text summary: design, 2×2 counts, and one line per metric.
impl fmt::Display for ReportFile {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_summary(out, self)
    }
}

fn write_summary(out: &mut fmt::Formatter<'_>, report: &ReportFile) -> fmt::Result {
    let counts = &report.counts;
    writeln!(out, "Input: {}", report.input)?;
    writeln!(
        out,
        "Subjects: {}   Raters: {}   Observations: {}",
        counts.n_subjects, counts.n_raters, counts.n_observations
    )?;
    writeln!(out)?;
    write_counts(out, counts)?;
    writeln!(out)?;

    let naive = report.naive.as_ref();
    write!(
        out,
        "{:<6}{:>10}{:>24}{:>10}",
        "Metric", "Estimate", "95% CI (clustered)", "SE"
    )?;
    if naive.is_some() {
        write!(out, "{:>24}{:>10}{:>10}", "95% CI (naive)", "SE", "SE ratio")?;
    }
    writeln!(out)?;

    for metric in Metric::ALL {
        let est = report.clustered.get(metric);
        write!(
            out,
            "{:<6}{:>10.4}{:>24}{:>10.4}",
            metric.abbreviation(),
            est.estimate,
            format_interval(est.lower, est.upper),
            est.standard_error
        )?;
        if let Some(naive) = naive {
            let base = naive.get(metric);
            let ratio = if base.standard_error > 0.0 {
                format!("{:.3}", est.standard_error / base.standard_error)
            } else {
                "N/A".to_string()
            };
            write!(
                out,
                "{:>24}{:>10.4}{:>10}",
                format_interval(base.lower, base.upper),
                base.standard_error,
                ratio
            )?;
        }
        writeln!(out)?;
    }

    if report.clustered.iter().any(|est| est.exceeds_unit_interval()) {
        writeln!(out)?;
        writeln!(
            out,
            "Note: Wald intervals are not clipped and may extend beyond [0, 1]."
        )?;
    }
    Ok(())
}

fn write_counts(out: &mut fmt::Formatter<'_>, counts: &AggregateCounts) -> fmt::Result {
    writeln!(out, "{:<10}{:>10}{:>10}", "", "Gold +", "Gold -")?;
    writeln!(
        out,
        "{:<10}{:>10}{:>10}",
        "Test +", counts.true_positives, counts.false_positives
    )?;
    writeln!(
        out,
        "{:<10}{:>10}{:>10}",
        "Test -", counts.false_negatives, counts.true_negatives
    )
}

fn format_interval(lower: f64, upper: f64) -> String {
    format!("[{lower:.4}, {upper:.4}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::RaterTable;
    use crate::estimate::estimate_comparison;
    use ndarray::array;
    use tempfile::NamedTempFile;

    fn sample_comparison() -> ComparisonReport {
        let table = RaterTable::from_arrays(
            array![1.0, 1.0, 0.0, 0.0, 1.0],
            array![
                [1.0, 1.0, 0.0],
                [1.0, 0.0, 1.0],
                [0.0, 0.0, 1.0],
                [0.0, 0.0, 0.0],
                [1.0, 1.0, 1.0]
            ],
        );
        estimate_comparison(&table).unwrap()
    }

    #[test]
    fn report_round_trips_through_toml() {
        let report =
            ReportFile::new("study.tsv", LoaderConfig::default(), sample_comparison(), true);
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();

        report.save(path).unwrap();
        let loaded = ReportFile::load(path).unwrap();
        assert_eq!(loaded, report);
        assert!(loaded.naive.is_some());
    }

    #[test]
    fn naive_section_is_optional() {
        let report =
            ReportFile::new("study.tsv", LoaderConfig::default(), sample_comparison(), false);
        let toml_string = toml::to_string_pretty(&report).unwrap();
        assert!(!toml_string.contains("[naive"));
        let parsed: ReportFile = toml::from_str(&toml_string).unwrap();
        assert!(parsed.naive.is_none());
    }

    #[test]
    fn text_summary_lists_counts_and_metrics() {
        let report =
            ReportFile::new("study.tsv", LoaderConfig::default(), sample_comparison(), true);
        let text = report.to_string();

        assert!(text.contains("Subjects: 5   Raters: 3   Observations: 15"));
        assert!(text.contains("Gold +"));
        for abbreviation in ["Se", "Sp", "PPV", "NPV"] {
            assert!(
                text.lines().any(|line| line.starts_with(abbreviation)),
                "missing row for {abbreviation}"
            );
        }
        assert!(text.contains("SE ratio"));
    }
}

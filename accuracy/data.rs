//! # Data Loading and Dichotomization
//!
//! Reads a tab-separated study table (one row per subject, one column per
//! rater plus a gold-standard column) and turns the continuous readings into
//! the 0/1 `RaterTable` the estimator consumes.
//!
//! - Strict content: every required cell must be present, numeric and finite.
//!   The assembler later enforces the balanced-panel design; this layer only
//!   guarantees that a rectangular numeric table was read.
//! - Thresholds are the caller's decision. `Dichotomizer` maps
//!   `value >= threshold` to 1 and everything else to 0.

use crate::assemble::RaterTable;
use ndarray::{Array1, Array2, ShapeBuilder};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Could not arrange rater columns into a matrix: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The column '{column_name}' could not be converted to the expected type '{expected_type}'. It contains non-numeric data. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the column '{0}'. Every subject must be rated by every rater."
    )]
    MissingValuesFound(String),
    #[error(
        "Non-finite values (NaN or Infinity) were found in the column '{0}'. All readings must be finite."
    )]
    NonFiniteValuesFound(String),
    #[error("No rater columns were found besides the gold-standard and subject columns.")]
    NoRaterColumns,
    #[error("The column '{0}' cannot be both the gold standard and a rater.")]
    GoldColumnListedAsRater(String),
}

/// Maps a continuous reading to a binary test result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dichotomizer {
    pub threshold: f64,
}

impl Dichotomizer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// `1.0` when `value >= threshold`, `0.0` otherwise. NaN stays NaN so the
    /// assembler reports it as missing.
    pub fn apply(&self, value: f64) -> f64 {
        if value.is_nan() {
            f64::NAN
        } else if value >= self.threshold {
            1.0
        } else {
            0.0
        }
    }
}

/// Column layout and thresholds for one study table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub gold_column: String,
    pub subject_column: String,
    /// Rater columns in order. Empty means every column other than the gold
    /// and subject columns, in file order.
    pub rater_columns: Vec<String>,
    pub gold: Dichotomizer,
    pub raters: Dichotomizer,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            gold_column: "gold".to_string(),
            subject_column: "subject_id".to_string(),
            rater_columns: Vec::new(),
            gold: Dichotomizer::new(0.5),
            raters: Dichotomizer::new(0.5),
        }
    }
}

/// Undichotomized readings exactly as loaded.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub subject_ids: Vec<String>,
    pub rater_ids: Vec<String>,
    pub gold: Array1<f64>,
    /// Shape: [n_subjects, n_raters].
    pub readings: Array2<f64>,
}

impl RawTable {
    pub fn dichotomize(&self, gold: Dichotomizer, raters: Dichotomizer) -> RaterTable {
        RaterTable::new(
            self.subject_ids.clone(),
            self.rater_ids.clone(),
            self.gold.mapv(|value| gold.apply(value)),
            self.readings.mapv(|value| raters.apply(value)),
        )
    }
}

/// Loads a study table and dichotomizes it with the configured thresholds.
pub fn load_rater_table(path: &str, config: &LoaderConfig) -> Result<RaterTable, DataError> {
    let raw = load_raw_table(path, config)?;
    Ok(raw.dichotomize(config.gold, config.raters))
}

/// Loads and validates a study table without dichotomizing it.
pub fn load_raw_table(path: &str, config: &LoaderConfig) -> Result<RawTable, DataError> {
    log::info!("Loading study table from '{path}'");

    let df = CsvReader::new(File::open(Path::new(path))?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;

    let columns: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    let column_set: HashSet<&str> = columns.iter().map(|s| s.as_str()).collect();

    if !column_set.contains(config.gold_column.as_str()) {
        return Err(DataError::ColumnNotFound(config.gold_column.clone()));
    }

    let rater_ids: Vec<String> = if config.rater_columns.is_empty() {
        columns
            .iter()
            .filter(|name| **name != config.gold_column && **name != config.subject_column)
            .cloned()
            .collect()
    } else {
        for name in &config.rater_columns {
            if *name == config.gold_column {
                return Err(DataError::GoldColumnListedAsRater(name.clone()));
            }
            if !column_set.contains(name.as_str()) {
                return Err(DataError::ColumnNotFound(name.clone()));
            }
        }
        config.rater_columns.clone()
    };
    if rater_ids.is_empty() {
        return Err(DataError::NoRaterColumns);
    }

    let gold = Array1::from_vec(extract_numeric_column(&df, &config.gold_column)?);
    let n_subjects = gold.len();

    let mut buffer = Vec::with_capacity(n_subjects * rater_ids.len());
    for name in &rater_ids {
        buffer.append(&mut extract_numeric_column(&df, name)?);
    }
    let readings = Array2::from_shape_vec((n_subjects, rater_ids.len()).f(), buffer)?;

    let subject_ids = if column_set.contains(config.subject_column.as_str()) {
        extract_subject_ids(&df, &config.subject_column)?
    } else {
        (1..=n_subjects).map(|i| i.to_string()).collect()
    };

    log::info!(
        "Loaded {} subjects with {} rater columns: {:?}",
        n_subjects,
        rater_ids.len(),
        rater_ids
    );

    Ok(RawTable {
        subject_ids,
        rater_ids,
        gold,
        readings,
    })
}

fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
    let series = df.column(column_name)?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }

    let wrong_type = || DataError::ColumnWrongType {
        column_name: column_name.to_string(),
        expected_type: "f64 (numeric)",
        found_type: format!("{:?}", series.dtype()),
    };

    let casted = series.cast(&DataType::Float64).map_err(|_| wrong_type())?;
    if casted.null_count() > 0 {
        return Err(wrong_type());
    }

    let chunked = casted.f64()?.rechunk();
    let values: Vec<f64> = chunked.into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
    }
    Ok(values)
}

fn extract_subject_ids(df: &DataFrame, column_name: &str) -> Result<Vec<String>, DataError> {
    let series = df.column(column_name)?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }

    let mut ids = Vec::with_capacity(series.len());
    for i in 0..series.len() {
        let id = match series.get(i)? {
            AnyValue::String(text) => text.to_string(),
            AnyValue::StringOwned(text) => text.to_string(),
            other => other.to_string(),
        };
        ids.push(id);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::assemble;
    use approx::assert_abs_diff_eq;
    use std::io::{self, Write};
    use tempfile::NamedTempFile;

    fn create_test_tsv(content: &str) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(file)
    }

    const STUDY: &str = "subject_id\tgold\treader_a\treader_b\treader_c
p01\t512\t470\t455\t500
p02\t380\t300\t461\t410
p03\t460\t460\t459\t480";

    #[test]
    fn dichotomizer_uses_inclusive_threshold() {
        let rule = Dichotomizer::new(460.0);
        assert_eq!(rule.apply(460.0), 1.0);
        assert_eq!(rule.apply(459.999), 0.0);
        assert!(rule.apply(f64::NAN).is_nan());
    }

    #[test]
    fn loads_and_dichotomizes_study_table() {
        let file = create_test_tsv(STUDY).unwrap();
        let config = LoaderConfig {
            gold: Dichotomizer::new(460.0),
            raters: Dichotomizer::new(460.0),
            ..LoaderConfig::default()
        };
        let table = load_rater_table(file.path().to_str().unwrap(), &config).unwrap();

        assert_eq!(table.subject_ids, vec!["p01", "p02", "p03"]);
        assert_eq!(table.rater_ids, vec!["reader_a", "reader_b", "reader_c"]);
        assert_eq!(table.gold.to_vec(), vec![1.0, 0.0, 1.0]);
        assert_eq!(table.results.row(0).to_vec(), vec![1.0, 0.0, 1.0]);
        assert_eq!(table.results.row(1).to_vec(), vec![0.0, 1.0, 0.0]);
        assert_eq!(table.results.row(2).to_vec(), vec![1.0, 0.0, 1.0]);

        let data = assemble(&table).unwrap();
        assert_eq!(data.n_observations(), 9);
    }

    #[test]
    fn raw_readings_keep_their_values() {
        let file = create_test_tsv(STUDY).unwrap();
        let config = LoaderConfig {
            rater_columns: vec!["reader_c".to_string(), "reader_a".to_string()],
            ..LoaderConfig::default()
        };
        let raw = load_raw_table(file.path().to_str().unwrap(), &config).unwrap();
        assert_eq!(raw.readings.shape(), &[3, 2]);
        assert_abs_diff_eq!(raw.readings[[1, 0]], 410.0, epsilon = 1e-12);
        assert_abs_diff_eq!(raw.readings[[1, 1]], 300.0, epsilon = 1e-12);
        assert_abs_diff_eq!(raw.gold[2], 460.0, epsilon = 1e-12);
    }

    #[test]
    fn sequential_ids_when_subject_column_absent() {
        let file = create_test_tsv("gold\tr1\tr2\n1\t1\t0\n0\t0\t0").unwrap();
        let table = load_rater_table(file.path().to_str().unwrap(), &LoaderConfig::default())
            .unwrap();
        assert_eq!(table.subject_ids, vec!["1", "2"]);
        assert_eq!(table.rater_ids, vec!["r1", "r2"]);
    }

    #[test]
    fn error_missing_gold_column() {
        let file = create_test_tsv("truth\tr1\n1\t1").unwrap();
        let err = load_rater_table(file.path().to_str().unwrap(), &LoaderConfig::default())
            .unwrap_err();
        match err {
            DataError::ColumnNotFound(col) => assert_eq!(col, "gold"),
            other => panic!("Expected ColumnNotFound(gold), got {:?}", other),
        }
    }

    #[test]
    fn error_missing_rating() {
        let file = create_test_tsv("gold\tr1\tr2\n1\t1\t\n0\t0\t1").unwrap();
        let err = load_rater_table(file.path().to_str().unwrap(), &LoaderConfig::default())
            .unwrap_err();
        match err {
            DataError::MissingValuesFound(col) => assert_eq!(col, "r2"),
            other => panic!("Expected MissingValuesFound(r2), got {:?}", other),
        }
    }

    #[test]
    fn error_non_numeric_rating() {
        let file = create_test_tsv("gold\tr1\n1\tpositive\n0\t0").unwrap();
        let result = load_rater_table(file.path().to_str().unwrap(), &LoaderConfig::default());
        match result {
            Err(DataError::ColumnWrongType { column_name, .. }) => assert_eq!(column_name, "r1"),
            other => panic!("Expected ColumnWrongType for 'r1', got {:?}", other),
        }
    }

    #[test]
    fn error_gold_listed_as_rater() {
        let file = create_test_tsv("gold\tr1\n1\t1").unwrap();
        let config = LoaderConfig {
            rater_columns: vec!["gold".to_string()],
            ..LoaderConfig::default()
        };
        assert!(matches!(
            load_rater_table(file.path().to_str().unwrap(), &config),
            Err(DataError::GoldColumnListedAsRater(_))
        ));
    }

    #[test]
    fn error_no_rater_columns() {
        let file = create_test_tsv("subject_id\tgold\na\t1").unwrap();
        assert!(matches!(
            load_rater_table(file.path().to_str().unwrap(), &LoaderConfig::default()),
            Err(DataError::NoRaterColumns)
        ));
    }
}

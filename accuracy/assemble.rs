//! # Data Assembler
//!
//! Reshapes a subject × rater table of dichotomized results, plus one gold
//! standard label per subject, into the observation and cluster structures the
//! estimators consume.
//!
//! The design is a balanced panel: every subject is rated by the same `J`
//! raters and no cell may be missing. Anything else is rejected with a
//! `DataShapeError`; nothing is imputed or dropped.

use ahash::{AHashMap, AHashSet};
use ndarray::{Array1, Array2};
use thiserror::Error;

/// Everything that can be wrong with the shape or content of an input table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataShapeError {
    #[error("The input table contains no subjects.")]
    NoSubjects,
    #[error("The input table contains no rater columns.")]
    NoRaters,
    #[error("Expected {expected} {what}, but found {found}.")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Subject '{0}' appears more than once.")]
    DuplicateSubject(String),
    #[error("Rater '{0}' appears more than once.")]
    DuplicateRater(String),
    #[error(
        "Missing value for subject '{subject}' in column '{column}'. Every cell must be populated."
    )]
    MissingValue { subject: String, column: String },
    #[error("Gold-standard label for subject '{subject}' is {value}, but must be 0 or 1.")]
    NonBinaryLabel { subject: String, value: f64 },
    #[error(
        "Result from rater '{rater}' for subject '{subject}' is {value}, but must be 0 or 1."
    )]
    NonBinaryResult {
        subject: String,
        rater: String,
        value: f64,
    },
    #[error("A rating refers to subject '{0}', which has no gold-standard label.")]
    UnknownSubject(String),
    #[error("Rater '{rater}' rated subject '{subject}' more than once.")]
    DuplicateRating { subject: String, rater: String },
    #[error(
        "Subject '{subject}' has {found} of {expected} ratings (rater '{missing_rater}' is absent). Every subject must be rated by every rater."
    )]
    UnbalancedPanel {
        subject: String,
        missing_rater: String,
        expected: usize,
        found: usize,
    },
}

/// Wide-form input: one row per subject, one column per rater.
///
/// Values are expected to be dichotomized already; the assembler only checks.
#[derive(Debug, Clone)]
pub struct RaterTable {
    pub subject_ids: Vec<String>,
    pub rater_ids: Vec<String>,
    /// Gold-standard label per subject. Shape: [n_subjects].
    pub gold: Array1<f64>,
    /// Rater results. Shape: [n_subjects, n_raters].
    pub results: Array2<f64>,
}

impl RaterTable {
    pub fn new(
        subject_ids: Vec<String>,
        rater_ids: Vec<String>,
        gold: Array1<f64>,
        results: Array2<f64>,
    ) -> Self {
        Self {
            subject_ids,
            rater_ids,
            gold,
            results,
        }
    }

    /// Builds a table with sequential subject ids (`1`, `2`, …) and rater ids
    /// (`rater1`, `rater2`, …).
    pub fn from_arrays(gold: Array1<f64>, results: Array2<f64>) -> Self {
        let subject_ids = (1..=gold.len()).map(|i| i.to_string()).collect();
        let rater_ids = (1..=results.ncols()).map(|j| format!("rater{j}")).collect();
        Self::new(subject_ids, rater_ids, gold, results)
    }
}

/// Long-form gold-standard record.
#[derive(Debug, Clone, PartialEq)]
pub struct GoldLabel {
    pub subject_id: String,
    pub label: f64,
}

/// Long-form rating record.
#[derive(Debug, Clone, PartialEq)]
pub struct Rating {
    pub subject_id: String,
    pub rater_id: String,
    pub result: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: String,
    pub diseased: bool,
}

/// One rater's dichotomized result for one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub subject: usize,
    pub rater: usize,
    pub positive: bool,
    pub diseased: bool,
}

impl Observation {
    #[inline]
    pub fn result(&self) -> f64 {
        indicator(self.positive)
    }

    #[inline]
    pub fn disease(&self) -> f64 {
        indicator(self.diseased)
    }

    /// `result · d`
    #[inline]
    pub fn true_positive(&self) -> f64 {
        indicator(self.positive && self.diseased)
    }

    /// `(1 − result) · (1 − d)`
    #[inline]
    pub fn true_negative(&self) -> f64 {
        indicator(!self.positive && !self.diseased)
    }
}

#[inline]
fn indicator(flag: bool) -> f64 {
    if flag { 1.0 } else { 0.0 }
}

/// The validated, read-only panel.
///
/// Observations are stored subject-major, so the `J` observations of subject
/// `i` occupy `observations[i * J..(i + 1) * J]` in rater order.
#[derive(Debug, Clone)]
pub struct AssembledData {
    subjects: Vec<Subject>,
    rater_ids: Vec<String>,
    observations: Vec<Observation>,
}

impl AssembledData {
    pub fn n_subjects(&self) -> usize {
        self.subjects.len()
    }

    pub fn n_raters(&self) -> usize {
        self.rater_ids.len()
    }

    pub fn n_observations(&self) -> usize {
        self.observations.len()
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn rater_ids(&self) -> &[String] {
        &self.rater_ids
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Each subject paired with its `J` observations.
    pub fn clusters(&self) -> impl Iterator<Item = (&Subject, &[Observation])> + '_ {
        self.subjects
            .iter()
            .zip(self.observations.chunks_exact(self.n_raters()))
    }
}

/// Validates a wide-form table and assembles it into observations and clusters.
pub fn assemble(table: &RaterTable) -> Result<AssembledData, DataShapeError> {
    let n_subjects = table.subject_ids.len();
    if n_subjects == 0 {
        return Err(DataShapeError::NoSubjects);
    }
    let n_raters = table.results.ncols();
    if n_raters == 0 {
        return Err(DataShapeError::NoRaters);
    }
    check_len("gold-standard labels", n_subjects, table.gold.len())?;
    check_len("rows of rater results", n_subjects, table.results.nrows())?;
    check_len("rater ids", n_raters, table.rater_ids.len())?;

    let mut seen_subjects: AHashSet<&str> = AHashSet::with_capacity(n_subjects);
    for id in &table.subject_ids {
        if !seen_subjects.insert(id.as_str()) {
            return Err(DataShapeError::DuplicateSubject(id.clone()));
        }
    }
    let mut seen_raters: AHashSet<&str> = AHashSet::with_capacity(n_raters);
    for id in &table.rater_ids {
        if !seen_raters.insert(id.as_str()) {
            return Err(DataShapeError::DuplicateRater(id.clone()));
        }
    }

    let mut subjects = Vec::with_capacity(n_subjects);
    let mut observations = Vec::with_capacity(n_subjects * n_raters);

    for (i, id) in table.subject_ids.iter().enumerate() {
        let diseased = match as_binary(table.gold[i]) {
            Binary::Value(flag) => flag,
            Binary::Missing => {
                return Err(DataShapeError::MissingValue {
                    subject: id.clone(),
                    column: "gold".to_string(),
                });
            }
            Binary::Invalid(value) => {
                return Err(DataShapeError::NonBinaryLabel {
                    subject: id.clone(),
                    value,
                });
            }
        };

        for (j, rater) in table.rater_ids.iter().enumerate() {
            let positive = match as_binary(table.results[[i, j]]) {
                Binary::Value(flag) => flag,
                Binary::Missing => {
                    return Err(DataShapeError::MissingValue {
                        subject: id.clone(),
                        column: rater.clone(),
                    });
                }
                Binary::Invalid(value) => {
                    return Err(DataShapeError::NonBinaryResult {
                        subject: id.clone(),
                        rater: rater.clone(),
                        value,
                    });
                }
            };
            observations.push(Observation {
                subject: i,
                rater: j,
                positive,
                diseased,
            });
        }

        subjects.push(Subject {
            id: id.clone(),
            diseased,
        });
    }

    log::debug!(
        "Assembled {} subjects x {} raters = {} observations",
        n_subjects,
        n_raters,
        observations.len()
    );

    Ok(AssembledData {
        subjects,
        rater_ids: table.rater_ids.clone(),
        observations,
    })
}

/// Assembles long-form records (one per subject, one per rating).
///
/// Subjects keep the order of `gold`; raters are ordered by first appearance
/// in `ratings`. Every subject must carry a rating from every rater.
pub fn assemble_long(
    gold: &[GoldLabel],
    ratings: &[Rating],
) -> Result<AssembledData, DataShapeError> {
    if gold.is_empty() {
        return Err(DataShapeError::NoSubjects);
    }

    let mut subject_index: AHashMap<&str, usize> = AHashMap::with_capacity(gold.len());
    for (i, record) in gold.iter().enumerate() {
        if subject_index.insert(record.subject_id.as_str(), i).is_some() {
            return Err(DataShapeError::DuplicateSubject(record.subject_id.clone()));
        }
    }

    let mut rater_index: AHashMap<&str, usize> = AHashMap::new();
    let mut rater_ids: Vec<String> = Vec::new();
    for rating in ratings {
        if !rater_index.contains_key(rating.rater_id.as_str()) {
            rater_index.insert(rating.rater_id.as_str(), rater_ids.len());
            rater_ids.push(rating.rater_id.clone());
        }
    }
    if rater_ids.is_empty() {
        return Err(DataShapeError::NoRaters);
    }

    let n_subjects = gold.len();
    let n_raters = rater_ids.len();
    let mut results = Array2::from_elem((n_subjects, n_raters), f64::NAN);
    let mut filled = Array2::from_elem((n_subjects, n_raters), false);

    for rating in ratings {
        let i = *subject_index
            .get(rating.subject_id.as_str())
            .ok_or_else(|| DataShapeError::UnknownSubject(rating.subject_id.clone()))?;
        let j = rater_index[rating.rater_id.as_str()];
        if filled[[i, j]] {
            return Err(DataShapeError::DuplicateRating {
                subject: rating.subject_id.clone(),
                rater: rating.rater_id.clone(),
            });
        }
        filled[[i, j]] = true;
        results[[i, j]] = rating.result;
    }

    for (i, record) in gold.iter().enumerate() {
        let row = filled.row(i);
        if let Some(missing) = row.iter().position(|&present| !present) {
            return Err(DataShapeError::UnbalancedPanel {
                subject: record.subject_id.clone(),
                missing_rater: rater_ids[missing].clone(),
                expected: n_raters,
                found: row.iter().filter(|&&present| present).count(),
            });
        }
    }

    let table = RaterTable::new(
        gold.iter().map(|record| record.subject_id.clone()).collect(),
        rater_ids,
        gold.iter().map(|record| record.label).collect(),
        results,
    );
    assemble(&table)
}

enum Binary {
    Value(bool),
    Missing,
    Invalid(f64),
}

fn as_binary(value: f64) -> Binary {
    if value.is_nan() {
        Binary::Missing
    } else if value == 0.0 {
        Binary::Value(false)
    } else if value == 1.0 {
        Binary::Value(true)
    } else {
        Binary::Invalid(value)
    }
}

fn check_len(what: &'static str, expected: usize, found: usize) -> Result<(), DataShapeError> {
    if expected == found {
        Ok(())
    } else {
        Err(DataShapeError::LengthMismatch {
            what,
            expected,
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn rating(subject: &str, rater: &str, result: f64) -> Rating {
        Rating {
            subject_id: subject.to_string(),
            rater_id: rater.to_string(),
            result,
        }
    }

    fn label(subject: &str, value: f64) -> GoldLabel {
        GoldLabel {
            subject_id: subject.to_string(),
            label: value,
        }
    }

    #[test]
    fn wide_table_is_assembled_subject_major() {
        let table = RaterTable::from_arrays(array![1.0, 0.0], array![[1.0, 0.0], [0.0, 1.0]]);
        let data = assemble(&table).unwrap();

        assert_eq!(data.n_subjects(), 2);
        assert_eq!(data.n_raters(), 2);
        assert_eq!(data.n_observations(), 4);

        let clusters: Vec<_> = data.clusters().collect();
        assert_eq!(clusters[0].0.id, "1");
        assert!(clusters[0].0.diseased);
        assert_eq!(clusters[0].1.len(), 2);
        assert!(clusters[0].1[0].positive);
        assert_eq!(clusters[0].1[0].true_positive(), 1.0);
        assert_eq!(clusters[0].1[1].true_positive(), 0.0);
        assert_eq!(clusters[1].1[0].true_negative(), 1.0);
        assert_eq!(clusters[1].1[1].true_negative(), 0.0);
        assert_eq!(clusters[1].1[1].rater, 1);
    }

    #[test]
    fn non_binary_result_is_rejected() {
        let table = RaterTable::from_arrays(array![1.0, 0.0], array![[1.0, 0.5], [0.0, 1.0]]);
        match assemble(&table).unwrap_err() {
            DataShapeError::NonBinaryResult {
                subject,
                rater,
                value,
            } => {
                assert_eq!(subject, "1");
                assert_eq!(rater, "rater2");
                assert_eq!(value, 0.5);
            }
            other => panic!("Expected NonBinaryResult, got {:?}", other),
        }
    }

    #[test]
    fn undichotomized_gold_is_rejected() {
        let table = RaterTable::from_arrays(array![460.0], array![[1.0]]);
        assert!(matches!(
            assemble(&table),
            Err(DataShapeError::NonBinaryLabel { value, .. }) if value == 460.0
        ));
    }

    #[test]
    fn missing_cell_is_rejected() {
        let table = RaterTable::from_arrays(array![1.0, 0.0], array![[1.0, 1.0], [f64::NAN, 0.0]]);
        assert_eq!(
            assemble(&table).unwrap_err(),
            DataShapeError::MissingValue {
                subject: "2".to_string(),
                column: "rater1".to_string(),
            }
        );
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let table = RaterTable::from_arrays(array![1.0, 0.0, 1.0], array![[1.0], [0.0]]);
        assert!(matches!(
            assemble(&table),
            Err(DataShapeError::LengthMismatch {
                expected: 3,
                found: 2,
                ..
            })
        ));
    }

    #[test]
    fn empty_tables_are_rejected() {
        let no_subjects = RaterTable::from_arrays(Array1::zeros(0), Array2::zeros((0, 3)));
        assert_eq!(assemble(&no_subjects).unwrap_err(), DataShapeError::NoSubjects);

        let no_raters = RaterTable::from_arrays(array![1.0], Array2::zeros((1, 0)));
        assert_eq!(assemble(&no_raters).unwrap_err(), DataShapeError::NoRaters);
    }

    #[test]
    fn duplicate_subject_ids_are_rejected() {
        let table = RaterTable::new(
            vec!["a".to_string(), "a".to_string()],
            vec!["r".to_string()],
            array![1.0, 0.0],
            array![[1.0], [0.0]],
        );
        assert_eq!(
            assemble(&table).unwrap_err(),
            DataShapeError::DuplicateSubject("a".to_string())
        );
    }

    #[test]
    fn long_form_matches_wide_form() {
        let gold = vec![label("s1", 1.0), label("s2", 0.0)];
        let ratings = vec![
            rating("s2", "A", 0.0),
            rating("s1", "A", 1.0),
            rating("s1", "B", 0.0),
            rating("s2", "B", 1.0),
        ];
        let long = assemble_long(&gold, &ratings).unwrap();
        assert_eq!(long.rater_ids(), &["A".to_string(), "B".to_string()]);

        let wide = assemble(&RaterTable::from_arrays(
            array![1.0, 0.0],
            array![[1.0, 0.0], [0.0, 1.0]],
        ))
        .unwrap();
        let long_results: Vec<bool> = long.observations().iter().map(|o| o.positive).collect();
        let wide_results: Vec<bool> = wide.observations().iter().map(|o| o.positive).collect();
        assert_eq!(long_results, wide_results);
    }

    #[test]
    fn long_form_rejects_unbalanced_panel() {
        let gold = vec![label("s1", 1.0), label("s2", 0.0)];
        let ratings = vec![
            rating("s1", "A", 1.0),
            rating("s1", "B", 1.0),
            rating("s2", "A", 0.0),
        ];
        assert_eq!(
            assemble_long(&gold, &ratings).unwrap_err(),
            DataShapeError::UnbalancedPanel {
                subject: "s2".to_string(),
                missing_rater: "B".to_string(),
                expected: 2,
                found: 1,
            }
        );
    }

    #[test]
    fn long_form_rejects_duplicates_and_strangers() {
        let gold = vec![label("s1", 1.0)];
        let duplicated = vec![rating("s1", "A", 1.0), rating("s1", "A", 0.0)];
        assert!(matches!(
            assemble_long(&gold, &duplicated),
            Err(DataShapeError::DuplicateRating { .. })
        ));

        let stranger = vec![rating("s1", "A", 1.0), rating("s9", "A", 0.0)];
        assert_eq!(
            assemble_long(&gold, &stranger).unwrap_err(),
            DataShapeError::UnknownSubject("s9".to_string())
        );

        assert_eq!(
            assemble_long(&gold, &[]).unwrap_err(),
            DataShapeError::NoRaters
        );
    }
}

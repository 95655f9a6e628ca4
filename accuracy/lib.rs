#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Cluster-adjusted diagnostic accuracy for multi-rater binary tests.
//!
//! The core pipeline is `assemble` → `point` → `variance`, orchestrated by
//! `estimate`. `data` and `report` are thin I/O layers on top of it.

pub mod assemble;
pub mod data;
pub mod estimate;
pub mod point;
pub mod report;
pub mod types;
pub mod variance;

pub use estimate::{EstimationError, estimate_accuracy, estimate_comparison};
pub use types::{AccuracyReport, Metric, MetricEstimate, VarianceModel};

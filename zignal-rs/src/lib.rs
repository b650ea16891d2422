//! zignal: per-image fluorescence signal extraction and control-versus-treatment
//! t-tests for microscopy experiments.
//!
//! Stages run strictly in sequence: [`extract`] turns a directory of images into
//! [`record::SampleRecord`]s, [`aggregate`] concatenates cohorts, [`compare`] tests
//! every treatment against the control and [`plot`] draws the summary figure.
//! [`normalize`] is the table-driven variant and [`pipeline`] runs an experiment file.

pub mod aggregate;
pub mod compare;
pub mod config;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod pipeline;
pub mod plot;
pub mod record;
pub mod signal;
pub mod stats;
pub mod vocabulary;

pub use error::{Error, Result};
pub use record::{ComparisonResult, SampleRecord};
pub use stats::Variance;
pub use vocabulary::Vocabulary;

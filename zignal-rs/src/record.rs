use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;

/// One measured image (or one table row in the normalization variant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub file: String,
    pub treatment: String,
    #[serde(rename = "signal_sum")]
    pub signal: f64,
    #[serde(rename = "cell_line")]
    pub cohort: String,
}

/// Control-versus-treatment t-test for one cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    #[serde(rename = "cell_line")]
    pub cohort: String,
    pub treatment: String,
    pub statistic: f64,
    pub df: f64,
    pub p_value: f64,
    pub significance: String,
}

pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Write rows with a header line, creating parent directories.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut out = Vec::new();
    for row in rdr.deserialize() {
        out.push(row?);
    }
    Ok(out)
}

pub fn write_table(path: &Path, records: &[SampleRecord]) -> Result<()> {
    write_csv(path, records)
}

pub fn read_table(path: &Path) -> Result<Vec<SampleRecord>> {
    read_csv(path)
}

pub fn write_comparisons(path: &Path, results: &[ComparisonResult]) -> Result<()> {
    write_csv(path, results)
}

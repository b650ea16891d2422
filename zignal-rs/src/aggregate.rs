use clap::Args;
use std::path::Path;

use crate::error::{Error, Result};
use crate::record::{self, SampleRecord};

#[derive(Args, Clone)]
pub struct CombineArgs {
    /// Per-cohort signal CSVs, in output order (repeat or comma-separate)
    #[arg(long, value_delimiter = ',', required = true)]
    pub input: Vec<String>,
    /// Combined CSV (file,treatment,signal_sum,cell_line)
    #[arg(long)]
    pub output: String,
}

/// Concatenate per-cohort record sequences, preserving input order and values.
pub fn combine<I>(cohorts: I) -> Vec<SampleRecord>
where
    I: IntoIterator<Item = Vec<SampleRecord>>,
{
    cohorts.into_iter().flatten().collect()
}

pub fn run(args: CombineArgs, progress: impl Fn(f64, &str)) -> Result<()> {
    let total = args.input.len();
    let mut tables = Vec::with_capacity(total);
    for (i, input) in args.input.iter().enumerate() {
        tables.push(record::read_table(Path::new(input))?);
        progress(
            (i + 1) as f64 / total as f64,
            &format!("Reading tables {}/{}", i + 1, total),
        );
    }
    let combined = combine(tables);
    if combined.is_empty() {
        return Err(Error::EmptyDataset);
    }
    record::write_table(Path::new(&args.output), &combined)?;
    progress(1.0, &format!("Wrote {} rows to {}", combined.len(), args.output));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(cohort: &str, i: usize) -> SampleRecord {
        SampleRecord {
            file: format!("{i}.tif"),
            treatment: "control".into(),
            signal: 0.1 + i as f64 * 1e-9,
            cohort: cohort.into(),
        }
    }

    #[test]
    fn test_combine_preserves_order_and_values() {
        let a: Vec<SampleRecord> = (0..3).map(|i| rec("NOMO-1", i)).collect();
        let b: Vec<SampleRecord> = (3..5).map(|i| rec("MOLM-13", i)).collect();
        let all = combine(vec![a.clone(), Vec::new(), b.clone()]);
        assert_eq!(all.len(), a.len() + b.len());
        assert_eq!(&all[..3], &a[..]);
        assert_eq!(&all[3..], &b[..]);
    }
}

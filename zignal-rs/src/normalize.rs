//! Table variant: rows already carry a treatment label plus raw measurements. The
//! signal is `numerator / denominator` (e.g. maximal signal area over fish length).

use clap::Args;
use std::path::Path;
use tracing::{info, warn};

use crate::compare;
use crate::error::{Error, Result};
use crate::plot::{self, FigureStyle};
use crate::record::{self, SampleRecord};
use crate::stats::Variance;

#[derive(Args, Clone)]
pub struct NormalizeArgs {
    /// Input CSV with one row per sample
    #[arg(long)]
    pub input: String,
    /// Column holding the treatment label
    #[arg(long, default_value = "sample")]
    pub label_column: String,
    /// Measurement column
    #[arg(long, default_value = "area_max")]
    pub numerator: String,
    /// Size column the measurement is divided by
    #[arg(long, default_value = "li")]
    pub denominator: String,
    /// Control label
    #[arg(long, default_value = "VC")]
    pub control: String,
    /// Cohort name (defaults to the input file stem)
    #[arg(long)]
    pub cohort: Option<String>,
    /// Variance assumption of the t-test
    #[arg(long, value_enum, default_value_t = Variance::Welch)]
    pub variance: Variance,
    /// Output comparison CSV
    #[arg(long)]
    pub output: String,
    /// Optional CSV of normalized rows
    #[arg(long)]
    pub table: Option<String>,
    /// Optional PNG figure path
    #[arg(long)]
    pub figure: Option<String>,
}

/// Normalized rows plus the 1-based data row numbers that were dropped.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub records: Vec<SampleRecord>,
    pub skipped: Vec<usize>,
}

impl Normalized {
    /// Labels in order of first appearance.
    pub fn treatment_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        for r in &self.records {
            if !order.contains(&r.treatment) {
                order.push(r.treatment.clone());
            }
        }
        order
    }
}

fn column(headers: &csv::StringRecord, name: &str, source: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| Error::MissingColumn(name.to_string(), source.to_string()))
}

pub fn normalize_table(
    path: &Path,
    label_column: &str,
    numerator: &str,
    denominator: &str,
    cohort: &str,
) -> Result<Normalized> {
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();
    let label_idx = column(&headers, label_column, &source)?;
    let num_idx = column(&headers, numerator, &source)?;
    let den_idx = column(&headers, denominator, &source)?;

    let mut out = Normalized::default();
    for (i, row) in rdr.records().enumerate() {
        let row = row?;
        let line = i + 1;
        let label = row.get(label_idx).map(str::trim).unwrap_or("");
        let num = row.get(num_idx).and_then(|v| v.trim().parse::<f64>().ok());
        let den = row.get(den_idx).and_then(|v| v.trim().parse::<f64>().ok());
        match (label, num, den) {
            (l, Some(n), Some(d)) if !l.is_empty() && d != 0.0 => out.records.push(SampleRecord {
                file: format!("{source}:{line}"),
                treatment: l.to_string(),
                signal: n / d,
                cohort: cohort.to_string(),
            }),
            _ => {
                warn!(
                    row = line,
                    "skipping row without label or with unusable {numerator}/{denominator}"
                );
                out.skipped.push(line);
            }
        }
    }
    Ok(out)
}

pub fn run(args: NormalizeArgs, progress: impl Fn(f64, &str)) -> Result<()> {
    let input = Path::new(&args.input);
    let cohort = args.cohort.clone().unwrap_or_else(|| {
        input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "samples".to_string())
    });

    let normalized = normalize_table(
        input,
        &args.label_column,
        &args.numerator,
        &args.denominator,
        &cohort,
    )?;
    progress(
        0.25,
        &format!(
            "Normalized {} rows ({} skipped)",
            normalized.records.len(),
            normalized.skipped.len()
        ),
    );
    if normalized.records.is_empty() {
        return Err(Error::EmptyDataset);
    }

    let order = normalized.treatment_order();
    let results = compare::compare(&normalized.records, &order, &args.control, args.variance)?;
    record::write_comparisons(Path::new(&args.output), &results)?;
    info!(rows = results.len(), output = %args.output, "comparisons written");
    progress(0.5, &format!("Wrote {} comparisons to {}", results.len(), args.output));

    if let Some(table) = &args.table {
        record::write_table(Path::new(table), &normalized.records)?;
        progress(0.75, &format!("Wrote {}", table));
    }

    if let Some(figure) = &args.figure {
        let style = FigureStyle {
            title: "Normalized fluorescence signal by treatment".to_string(),
            y_label: format!("Normalized signal ({} / {})", args.numerator, args.denominator),
            palette: plot::default_palette(&order),
            treatments: order,
            control: args.control.clone(),
            ..FigureStyle::default()
        };
        plot::render(Path::new(figure), &normalized.records, &results, &style)?;
    }
    progress(1.0, "Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const FISHES: &str = "\
fish,sample,area_max,li
1,VC,100,10
2,VC,120,10
3,LS,300,10
4,VC,90,9
5,LS,280,10
6,RU,50,0
7,RU,abc,10
8,,10,10
";

    #[test]
    fn test_normalize_skips_unusable_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fishes.csv");
        fs::write(&path, FISHES).unwrap();
        let n = normalize_table(&path, "sample", "area_max", "li", "fishes").unwrap();
        assert_eq!(n.records.len(), 5);
        assert_eq!(n.skipped, vec![6, 7, 8]);
        assert_eq!(n.records[0].signal, 10.0);
        assert_eq!(n.records[3].signal, 10.0);
        assert_eq!(n.records[0].file, "fishes.csv:1");
        assert_eq!(n.treatment_order(), vec!["VC".to_string(), "LS".to_string()]);
    }

    #[test]
    fn test_missing_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fishes.csv");
        fs::write(&path, FISHES).unwrap();
        assert!(matches!(
            normalize_table(&path, "sample", "area", "li", "fishes"),
            Err(Error::MissingColumn(..))
        ));
    }

    #[test]
    fn test_run_writes_comparisons() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fishes.csv");
        fs::write(&path, FISHES).unwrap();
        let out = dir.path().join("stats.csv");
        let table = dir.path().join("normalized.csv");
        let args = NormalizeArgs {
            input: path.to_string_lossy().into_owned(),
            label_column: "sample".into(),
            numerator: "area_max".into(),
            denominator: "li".into(),
            control: "VC".into(),
            cohort: None,
            variance: Variance::Welch,
            output: out.to_string_lossy().into_owned(),
            table: Some(table.to_string_lossy().into_owned()),
            figure: None,
        };
        run(args, |_, _| {}).unwrap();
        let rows: Vec<crate::record::ComparisonResult> = record::read_csv(&out).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cohort, "fishes");
        assert_eq!(rows[0].treatment, "LS");
        assert!(rows[0].p_value < 0.05);
        assert_eq!(record::read_table(&table).unwrap().len(), 5);
    }
}

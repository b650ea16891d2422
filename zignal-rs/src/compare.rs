use clap::Args;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::plot::{self, FigureStyle};
use crate::record::{self, ComparisonResult, SampleRecord};
use crate::stats::{self, Variance};

#[derive(Args, Clone)]
pub struct CompareArgs {
    /// Combined signal CSV (file,treatment,signal_sum,cell_line)
    #[arg(long)]
    pub input: String,
    /// Treatment order for output rows and figure columns, comma-separated
    #[arg(long, value_delimiter = ',', default_value = "control,LS,RU,VA,VC,VR")]
    pub treatments: Vec<String>,
    /// Control label every treatment is tested against
    #[arg(long, default_value = "control")]
    pub control: String,
    /// Variance assumption of the t-test
    #[arg(long, value_enum, default_value_t = Variance::Equal)]
    pub variance: Variance,
    /// Output CSV (cell_line,treatment,statistic,df,p_value,significance)
    #[arg(long)]
    pub output: String,
    /// Optional PNG figure path
    #[arg(long)]
    pub figure: Option<String>,
    /// Figure title
    #[arg(long, default_value = "Fluorescence signal")]
    pub title: String,
}

/// Cohort names in order of first appearance.
pub fn cohorts_in_order(records: &[SampleRecord]) -> Vec<&str> {
    let mut seen: Vec<&str> = Vec::new();
    for r in records {
        if !seen.contains(&r.cohort.as_str()) {
            seen.push(&r.cohort);
        }
    }
    seen
}

/// Signal values of one (cohort, treatment) group, in record order.
pub fn group_values(records: &[SampleRecord], cohort: &str, treatment: &str) -> Vec<f64> {
    records
        .iter()
        .filter(|r| r.cohort == cohort && r.treatment == treatment)
        .map(|r| r.signal)
        .collect()
}

/// Labels present in `records` but absent from `treatment_order`, with their row
/// counts, in order of first appearance.
pub fn undeclared_labels(
    records: &[SampleRecord],
    treatment_order: &[String],
) -> Vec<(String, usize)> {
    let mut out: Vec<(String, usize)> = Vec::new();
    for r in records.iter().filter(|r| !treatment_order.contains(&r.treatment)) {
        match out.iter_mut().find(|(label, _)| *label == r.treatment) {
            Some((_, n)) => *n += 1,
            None => out.push((r.treatment.clone(), 1)),
        }
    }
    out
}

/// Test every non-control treatment against the control, per cohort.
///
/// Rows come out cohort-first (first-seen), then treatment (declared order). Groups
/// with fewer than two observations produce NaN rather than an error.
pub fn compare(
    records: &[SampleRecord],
    treatment_order: &[String],
    control: &str,
    policy: Variance,
) -> Result<Vec<ComparisonResult>> {
    if records.is_empty() {
        return Err(Error::EmptyDataset);
    }
    if !treatment_order.iter().any(|t| t == control) {
        return Err(Error::UnknownControl(control.to_string()));
    }
    for (label, rows) in undeclared_labels(records, treatment_order) {
        warn!(treatment = %label, rows, "undeclared treatment left out of the comparison");
    }

    let mut results = Vec::new();
    for cohort in cohorts_in_order(records) {
        let control_values = group_values(records, cohort, control);
        for treatment in treatment_order.iter().filter(|t| *t != control) {
            let values = group_values(records, cohort, treatment);
            let test = stats::ttest_ind(&control_values, &values, policy);
            results.push(ComparisonResult {
                cohort: cohort.to_string(),
                treatment: treatment.clone(),
                statistic: test.statistic,
                df: test.df,
                p_value: test.p_value,
                significance: stats::significance(test.p_value).to_string(),
            });
        }
    }
    Ok(results)
}

/// Log a warning for every treatment whose observed count differs from `expected`.
pub fn check_counts(
    records: &[SampleRecord],
    cohort: &str,
    expected: &HashMap<String, usize>,
) -> usize {
    let mut mismatches = 0;
    let mut labels: Vec<&String> = expected.keys().collect();
    labels.sort();
    for label in labels {
        let want = expected[label];
        let got = records
            .iter()
            .filter(|r| r.cohort == cohort && &r.treatment == label)
            .count();
        if got != want {
            warn!(
                cohort,
                treatment = %label,
                expected = want,
                observed = got,
                "sample count mismatch"
            );
            mismatches += 1;
        }
    }
    mismatches
}

pub fn run(args: CompareArgs, progress: impl Fn(f64, &str)) -> Result<()> {
    let records = record::read_table(Path::new(&args.input))?;
    progress(0.0, &format!("Loaded {} rows from {}", records.len(), args.input));

    let treatments: Vec<String> = args.treatments.iter().map(|t| t.trim().to_string()).collect();
    let results = compare(&records, &treatments, args.control.trim(), args.variance)?;
    record::write_comparisons(Path::new(&args.output), &results)?;
    info!(rows = results.len(), output = %args.output, "comparisons written");
    progress(0.5, &format!("Wrote {} comparisons to {}", results.len(), args.output));

    if let Some(figure) = &args.figure {
        let style = FigureStyle {
            title: args.title.clone(),
            palette: plot::default_palette(&treatments),
            treatments,
            control: args.control.trim().to_string(),
            ..FigureStyle::default()
        };
        plot::render(Path::new(figure), &records, &results, &style)?;
        progress(1.0, &format!("Wrote {}", figure));
    } else {
        progress(1.0, "Done");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(cohort: &str, treatment: &str, signal: f64) -> SampleRecord {
        SampleRecord {
            file: format!("{cohort} {treatment} {signal}.tif"),
            treatment: treatment.into(),
            signal,
            cohort: cohort.into(),
        }
    }

    fn order() -> Vec<String> {
        ["control", "LS", "RU"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_ordering_and_nan_for_small_groups() {
        let records = vec![
            rec("MOLM-13", "RU", 5.0),
            rec("MOLM-13", "control", 1.0),
            rec("NOMO-1", "control", 1.0),
            rec("MOLM-13", "control", 2.0),
            rec("MOLM-13", "RU", 6.0),
            rec("NOMO-1", "control", 2.0),
            rec("NOMO-1", "control", 3.0),
            rec("NOMO-1", "LS", 1.0),
            rec("NOMO-1", "LS", 2.0),
            rec("NOMO-1", "LS", 3.0),
        ];
        let out = compare(&records, &order(), "control", Variance::Equal).unwrap();
        let keys: Vec<(&str, &str)> = out
            .iter()
            .map(|r| (r.cohort.as_str(), r.treatment.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![("MOLM-13", "LS"), ("MOLM-13", "RU"), ("NOMO-1", "LS"), ("NOMO-1", "RU")]
        );
        assert!(out[0].p_value.is_nan());
        assert!(out[1].p_value < 0.05);
        assert!((out[2].p_value - 1.0).abs() < 1e-12);
        assert!(out[3].p_value.is_nan());
        assert_eq!(out[3].significance, "n/a");
    }

    #[test]
    fn test_empty_input_fails_fast() {
        assert!(matches!(
            compare(&[], &order(), "control", Variance::Equal),
            Err(Error::EmptyDataset)
        ));
    }

    #[test]
    fn test_control_must_be_declared() {
        let records = vec![rec("A", "LS", 1.0)];
        assert!(matches!(
            compare(&records, &order(), "VC", Variance::Welch),
            Err(Error::UnknownControl(_))
        ));
    }

    #[test]
    fn test_undeclared_labels_are_counted() {
        let records = vec![
            rec("A", "control", 1.0),
            rec("A", "LX", 2.0),
            rec("B", "VA", 2.0),
            rec("B", "LX", 3.0),
        ];
        assert_eq!(
            undeclared_labels(&records, &order()),
            vec![("LX".to_string(), 2), ("VA".to_string(), 1)]
        );
        let out = compare(&records, &order(), "control", Variance::Equal).unwrap();
        assert!(out.iter().all(|r| r.treatment != "LX" && r.treatment != "VA"));
        assert!(undeclared_labels(&records[..1], &order()).is_empty());
    }

    #[test]
    fn test_check_counts() {
        let records = vec![rec("A", "control", 1.0), rec("A", "LS", 2.0), rec("B", "LS", 2.0)];
        let mut expected = HashMap::new();
        expected.insert("control".to_string(), 1);
        expected.insert("LS".to_string(), 2);
        assert_eq!(check_counts(&records, "A", &expected), 1);
    }
}

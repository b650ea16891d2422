use clap::Args;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::aggregate;
use crate::compare;
use crate::config::Experiment;
use crate::error::{Error, Result};
use crate::extract::{self, FileFailure, UnmatchedFile};
use crate::plot::{self, FigureStyle};
use crate::record::{self, ComparisonResult, SampleRecord};

#[derive(Args, Clone)]
pub struct RunArgs {
    /// Experiment TOML file
    #[arg(long)]
    pub config: String,
}

#[derive(Args, Clone)]
pub struct InitArgs {
    /// Where to write the experiment template
    #[arg(long, default_value = "zignal.toml")]
    pub output: String,
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// What a full run produced.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub records: Vec<SampleRecord>,
    pub comparisons: Vec<ComparisonResult>,
    pub unmatched: Vec<UnmatchedFile>,
    pub failures: Vec<FileFailure>,
    pub count_mismatches: usize,
}

/// Extract every cohort, combine, compare and write the configured outputs.
pub fn run_experiment(exp: &Experiment, progress: &impl Fn(f64, &str)) -> Result<RunSummary> {
    let vocabulary = exp.vocabulary()?;
    let treatments = vocabulary.labels().to_vec();
    let n = exp.cohorts.len();
    let mut summary = RunSummary::default();
    let mut tables = Vec::with_capacity(n);

    for (i, cohort) in exp.cohorts.iter().enumerate() {
        let dir = exp.resolve(&cohort.dir);
        let scaled = |p: f64, msg: &str| progress((i as f64 + p) / n as f64 * 0.8, msg);
        let extraction =
            extract::extract_signals(&dir, &vocabulary, &cohort.name, &exp.extensions, &scaled)?;
        if !extraction.unmatched.is_empty() {
            info!(
                cohort = %cohort.name,
                files = ?extraction.unmatched,
                "{} file(s) matched no treatment",
                extraction.unmatched.len()
            );
        }
        summary
            .unmatched
            .extend(extraction.unmatched.into_iter().map(|file| UnmatchedFile {
                cohort: cohort.name.clone(),
                file,
            }));
        summary.failures.extend(extraction.failures);
        tables.push(extraction.records);
    }

    let records = aggregate::combine(tables);
    if records.is_empty() {
        return Err(Error::EmptyDataset);
    }
    for cohort in &exp.cohorts {
        if !cohort.expected.is_empty() {
            summary.count_mismatches +=
                compare::check_counts(&records, &cohort.name, &cohort.expected);
        }
    }

    let combined_path = exp.resolve(&exp.output.combined);
    record::write_table(&combined_path, &records)?;
    progress(0.8, &format!("Wrote {} rows to {}", records.len(), combined_path.display()));

    let comparisons = compare::compare(&records, &treatments, vocabulary.control(), exp.variance)?;
    let comparisons_path = exp.resolve(&exp.output.comparisons);
    record::write_comparisons(&comparisons_path, &comparisons)?;
    progress(
        0.9,
        &format!("Wrote {} comparisons to {}", comparisons.len(), comparisons_path.display()),
    );

    if let Some(figure) = &exp.output.figure {
        let figure_path = exp.resolve(figure);
        let style = FigureStyle {
            title: exp.output.title.clone(),
            treatments,
            control: vocabulary.control().to_string(),
            palette: exp.palette()?,
            ..FigureStyle::default()
        };
        plot::render(&figure_path, &records, &comparisons, &style)?;
        progress(1.0, &format!("Wrote {}", figure_path.display()));
    }

    if !summary.failures.is_empty() {
        warn!(count = summary.failures.len(), "some images could not be read");
    }
    summary.records = records;
    summary.comparisons = comparisons;
    Ok(summary)
}

pub fn run(args: RunArgs, progress: impl Fn(f64, &str)) -> Result<()> {
    let exp = Experiment::load(Path::new(&args.config))?;
    let summary = run_experiment(&exp, &progress)?;
    progress(
        1.0,
        &format!(
            "Done: {} images measured, {} unmatched, {} unreadable, {} comparisons",
            summary.records.len(),
            summary.unmatched.len(),
            summary.failures.len(),
            summary.comparisons.len()
        ),
    );
    Ok(())
}

pub fn init(args: InitArgs, progress: impl Fn(f64, &str)) -> Result<()> {
    let path = Path::new(&args.output);
    if path.exists() && !args.force {
        return Err(Error::InvalidConfig(format!(
            "{} already exists, pass --force to overwrite",
            path.display()
        )));
    }
    record::ensure_parent(path)?;
    fs::write(path, Experiment::default_toml())?;
    progress(1.0, &format!("Wrote {}", path.display()));
    Ok(())
}

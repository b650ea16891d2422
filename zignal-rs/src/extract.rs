use clap::Args;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::record::{self, SampleRecord};
use crate::signal;
use crate::vocabulary::Vocabulary;

pub const DEFAULT_EXTENSIONS: [&str; 2] = ["tif", "tiff"];

#[derive(Args, Clone)]
pub struct ExtractArgs {
    /// Directory of image files for one cohort
    #[arg(long)]
    pub input: String,
    /// Cohort (cell line) name written to every row
    #[arg(long)]
    pub cohort: String,
    /// Treatment labels in match order, comma-separated
    #[arg(long, value_delimiter = ',', default_value = "control,LS,RU,VA,VC,VR")]
    pub treatments: Vec<String>,
    /// Control label
    #[arg(long, default_value = "control")]
    pub control: String,
    /// Accepted file extensions, comma-separated
    #[arg(long, value_delimiter = ',', default_value = "tif,tiff")]
    pub extensions: Vec<String>,
    /// Output CSV (file,treatment,signal_sum,cell_line)
    #[arg(long)]
    pub output: String,
}

/// A file that matched a treatment but could not be measured.
#[derive(Debug, Clone)]
pub struct FileFailure {
    pub cohort: String,
    pub file: String,
    pub reason: String,
}

/// An image whose name carries no declared treatment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedFile {
    pub cohort: String,
    pub file: String,
}

/// Outcome of scanning one cohort directory.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: Vec<SampleRecord>,
    pub unmatched: Vec<String>,
    pub failures: Vec<FileFailure>,
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.trim_start_matches('.').eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Image files of `dir` with an accepted extension, sorted by file name.
pub fn discover_images(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::MissingDirectory(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        // `is_file` follows symlinks, so linked images are scanned like any other.
        if path.is_file() && has_extension(&path, extensions) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Scan `dir`, label each image by file name and measure its signal.
///
/// Unlabelled files land in `unmatched`, unreadable ones in `failures`; neither stops
/// the scan.
pub fn extract_signals(
    dir: &Path,
    vocabulary: &Vocabulary,
    cohort: &str,
    extensions: &[String],
    progress: &impl Fn(f64, &str),
) -> Result<Extraction> {
    let files = discover_images(dir, extensions)?;
    let total = files.len();
    let mut out = Extraction::default();

    for (i, path) in files.iter().enumerate() {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match vocabulary.classify(&file_name) {
            None => out.unmatched.push(file_name),
            Some(treatment) => match signal::image_signal(path) {
                Ok(signal) => out.records.push(SampleRecord {
                    file: file_name,
                    treatment: treatment.to_string(),
                    signal,
                    cohort: cohort.to_string(),
                }),
                Err(e) => {
                    warn!(file = %path.display(), "skipping unreadable image: {e}");
                    out.failures.push(FileFailure {
                        cohort: cohort.to_string(),
                        file: file_name,
                        reason: e.to_string(),
                    });
                }
            },
        }

        progress(
            (i + 1) as f64 / total as f64,
            &format!("Measuring {} {}/{}", cohort, i + 1, total),
        );
    }

    info!(
        cohort,
        measured = out.records.len(),
        unmatched = out.unmatched.len(),
        failed = out.failures.len(),
        "extraction finished"
    );
    Ok(out)
}

pub fn run(args: ExtractArgs, progress: impl Fn(f64, &str)) -> Result<()> {
    let vocabulary = Vocabulary::new(&args.treatments, &args.control)?;
    let extraction = extract_signals(
        Path::new(&args.input),
        &vocabulary,
        &args.cohort,
        &args.extensions,
        &progress,
    )?;
    if extraction.records.is_empty() {
        return Err(Error::EmptyDataset);
    }
    record::write_table(Path::new(&args.output), &extraction.records)?;
    progress(
        1.0,
        &format!(
            "Wrote {} rows to {} ({} unmatched, {} unreadable)",
            extraction.records.len(),
            args.output,
            extraction.unmatched.len(),
            extraction.failures.len()
        ),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufWriter;
    use tempfile::TempDir;
    use tiff::encoder::{colortype, TiffEncoder};

    fn quiet(_: f64, _: &str) {}

    fn exts() -> Vec<String> {
        DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        for name in ["b LS.tif", "a control.TIF", "notes.txt", "c RU.tiff"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("sub.tif")).unwrap();
        let files = discover_images(dir.path(), &exts()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a control.TIF", "b LS.tif", "c RU.tiff"]);
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let exts = vec!["tif".to_string()];
        assert!(matches!(
            discover_images(&missing, &exts),
            Err(Error::MissingDirectory(_))
        ));
    }

    #[test]
    fn test_extension_with_leading_dot() {
        assert!(has_extension(Path::new("x.png"), &[".PNG".to_string()]));
        assert!(!has_extension(Path::new("x"), &["tif".to_string()]));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_image_is_measured() {
        let store = TempDir::new().unwrap();
        let raw = store.path().join("raw.tif");
        {
            let mut w = BufWriter::new(fs::File::create(&raw).unwrap());
            let mut enc = TiffEncoder::new(&mut w).unwrap();
            enc.write_image::<colortype::Gray8>(2, 2, &[1, 2, 3, 4]).unwrap();
        }
        let scan = TempDir::new().unwrap();
        std::os::unix::fs::symlink(&raw, scan.path().join("fish 1 control.tif")).unwrap();
        std::os::unix::fs::symlink(&raw, scan.path().join("fish 2 other.tif")).unwrap();

        let vocabulary = Vocabulary::new(&["control", "LS"], "control").unwrap();
        let ex = extract_signals(scan.path(), &vocabulary, "A", &exts(), &quiet).unwrap();
        assert_eq!(ex.records.len(), 1);
        assert_eq!(ex.records[0].file, "fish 1 control.tif");
        assert_eq!(ex.records[0].signal, 10.0);
        assert_eq!(ex.unmatched, vec!["fish 2 other.tif".to_string()]);
        assert!(ex.failures.is_empty());
    }

    #[test]
    fn test_failures_carry_cohort() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("fish LS.tif"), b"not a tiff").unwrap();
        let vocabulary = Vocabulary::new(&["control", "LS"], "control").unwrap();
        let ex = extract_signals(dir.path(), &vocabulary, "MOLM-13", &exts(), &quiet).unwrap();
        assert_eq!(ex.failures.len(), 1);
        assert_eq!(ex.failures[0].cohort, "MOLM-13");
        assert_eq!(ex.failures[0].file, "fish LS.tif");
    }
}

//! Experiment file handling.
//!
//! An experiment file declares the treatment vocabulary, the cohorts and where the
//! tables and figure go. Relative paths resolve against the file's own directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::extract::DEFAULT_EXTENSIONS;
use crate::plot;
use crate::stats::Variance;
use crate::vocabulary::Vocabulary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    /// Treatment labels; file names are matched against them in this order.
    pub treatments: Vec<String>,

    #[serde(default = "default_control")]
    pub control: String,

    #[serde(default)]
    pub variance: Variance,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub output: OutputConfig,

    /// Treatment label to `#RRGGBB`; unlisted treatments get the default colors.
    #[serde(default)]
    pub palette: HashMap<String, String>,

    #[serde(rename = "cohort", default)]
    pub cohorts: Vec<CohortConfig>,

    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_combined")]
    pub combined: PathBuf,

    #[serde(default = "default_comparisons")]
    pub comparisons: PathBuf,

    /// No figure is rendered when absent.
    #[serde(default)]
    pub figure: Option<PathBuf>,

    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            combined: default_combined(),
            comparisons: default_comparisons(),
            figure: None,
            title: default_title(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortConfig {
    pub name: String,
    pub dir: PathBuf,
    /// Expected number of images per treatment; mismatches are logged.
    #[serde(default)]
    pub expected: HashMap<String, usize>,
}

fn default_control() -> String {
    "control".to_string()
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}

fn default_combined() -> PathBuf {
    PathBuf::from("signal_data_combined.csv")
}

fn default_comparisons() -> PathBuf {
    PathBuf::from("ttest_results.csv")
}

fn default_title() -> String {
    "Fluorescence signal".to_string()
}

impl Experiment {
    pub fn from_toml(text: &str, base_dir: &Path) -> Result<Self> {
        let mut exp: Experiment = toml::from_str(text)?;
        exp.base_dir = base_dir.to_path_buf();
        exp.validate()?;
        Ok(exp)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let base = path.parent().unwrap_or(Path::new("."));
        Self::from_toml(&text, base)
    }

    fn validate(&self) -> Result<()> {
        let vocabulary = self.vocabulary()?;
        if self.cohorts.is_empty() {
            return Err(Error::InvalidConfig("no [[cohort]] declared".into()));
        }
        for (i, c) in self.cohorts.iter().enumerate() {
            if self.cohorts[..i].iter().any(|p| p.name == c.name) {
                return Err(Error::InvalidConfig(format!("cohort {:?} declared twice", c.name)));
            }
            if let Some(label) = c.expected.keys().find(|k| !vocabulary.labels().contains(k)) {
                return Err(Error::InvalidConfig(format!(
                    "cohort {:?} expects unknown treatment {:?}",
                    c.name, label
                )));
            }
        }
        for color in self.palette.values() {
            plot::parse_hex(color)?;
        }
        Ok(())
    }

    pub fn vocabulary(&self) -> Result<Vocabulary> {
        Vocabulary::new(&self.treatments, &self.control)
    }

    /// `path` joined onto the experiment directory unless already absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Default colors overridden by the `[palette]` table.
    pub fn palette(&self) -> Result<HashMap<String, plotters::style::RGBColor>> {
        let mut colors = plot::default_palette(self.vocabulary()?.labels());
        for (label, hex) in &self.palette {
            colors.insert(label.trim().to_string(), plot::parse_hex(hex)?);
        }
        Ok(colors)
    }

    /// Template written by `zignal init`.
    pub fn default_toml() -> String {
        r##"# zignal experiment file
# Treatment labels are matched against image file names as whole words,
# ignoring case, in the order listed here; the first match wins.
treatments = ["control", "LS", "RU", "VA", "VC", "VR"]
control = "control"
# "equal" (Student) or "welch"
variance = "equal"
extensions = ["tif", "tiff"]

[output]
combined = "zebrafish_signal_data_combined.csv"
comparisons = "zebrafish_ttest_results.csv"
figure = "zebrafish_signal_plot.png"
title = "Fluorescence Signal in Zebrafish (NOMO-1 vs MOLM-13)"

[palette]
control = "#F8766D"
LS = "#E6AB02"
RU = "#66A61E"
VA = "#1E90FF"
VC = "#7570B3"
VR = "#E78AC3"

[[cohort]]
name = "NOMO-1"
dir = "NOMO/TIF"
expected = { control = 6, LS = 3, RU = 3, VA = 3, VC = 3, VR = 3 }

[[cohort]]
name = "MOLM-13"
dir = "MOLM/TIFF"
expected = { control = 4, LS = 3, RU = 3, VA = 3, VC = 3, VR = 3 }
"##
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_parses() {
        let exp = Experiment::from_toml(&Experiment::default_toml(), Path::new("/data")).unwrap();
        assert_eq!(exp.treatments.len(), 6);
        assert_eq!(exp.cohorts.len(), 2);
        assert_eq!(exp.cohorts[0].expected["control"], 6);
        assert_eq!(exp.variance, Variance::Equal);
        assert_eq!(exp.resolve(&exp.cohorts[1].dir), PathBuf::from("/data/MOLM/TIFF"));
        assert_eq!(exp.palette().unwrap().len(), 6);
    }

    #[test]
    fn test_defaults() {
        let toml_content = r#"
treatments = ["control", "VC"]

[[cohort]]
name = "A"
dir = "/abs/a"
"#;
        let exp = Experiment::from_toml(toml_content, Path::new("rel")).unwrap();
        assert_eq!(exp.control, "control");
        assert_eq!(exp.extensions, vec!["tif".to_string(), "tiff".to_string()]);
        assert_eq!(exp.output.combined, PathBuf::from("signal_data_combined.csv"));
        assert!(exp.output.figure.is_none());
        assert_eq!(exp.resolve(&exp.cohorts[0].dir), PathBuf::from("/abs/a"));
        assert_eq!(exp.resolve(&exp.output.comparisons), PathBuf::from("rel/ttest_results.csv"));
    }

    #[test]
    fn test_padded_labels_are_trimmed() {
        let toml_content = r#"
treatments = [" control", "LS "]
control = "control "

[[cohort]]
name = "A"
dir = "a"
expected = { LS = 2 }
"#;
        let exp = Experiment::from_toml(toml_content, Path::new(".")).unwrap();
        let v = exp.vocabulary().unwrap();
        assert_eq!(v.labels(), ["control".to_string(), "LS".to_string()]);
        assert_eq!(v.control(), "control");
        assert!(exp.palette().unwrap().contains_key("LS"));
    }

    #[test]
    fn test_welch_variance() {
        let toml_content = r#"
treatments = ["VC", "LS"]
control = "VC"
variance = "welch"

[[cohort]]
name = "A"
dir = "a"
"#;
        let exp = Experiment::from_toml(toml_content, Path::new(".")).unwrap();
        assert_eq!(exp.variance, Variance::Welch);
    }

    #[test]
    fn test_invalid_experiments() {
        let no_cohort = r#"treatments = ["control"]"#;
        assert!(Experiment::from_toml(no_cohort, Path::new(".")).is_err());

        let bad_control = r#"
treatments = ["LS"]
[[cohort]]
name = "A"
dir = "a"
"#;
        assert!(matches!(
            Experiment::from_toml(bad_control, Path::new(".")),
            Err(Error::UnknownControl(_))
        ));

        let bad_expected = r#"
treatments = ["control"]
[[cohort]]
name = "A"
dir = "a"
expected = { LS = 3 }
"#;
        assert!(Experiment::from_toml(bad_expected, Path::new(".")).is_err());

        let bad_color = r#"
treatments = ["control"]
[palette]
control = "red"
[[cohort]]
name = "A"
dir = "a"
"#;
        assert!(Experiment::from_toml(bad_color, Path::new(".")).is_err());

        let padded_expected = r#"
treatments = ["control", "LS "]
[[cohort]]
name = "A"
dir = "a"
expected = { "LS " = 3 }
"#;
        assert!(Experiment::from_toml(padded_expected, Path::new(".")).is_err());

        assert!(matches!(
            Experiment::from_toml("treatments = 3", Path::new(".")),
            Err(Error::Config(_))
        ));
    }
}

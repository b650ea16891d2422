//! Treatment vocabulary: the declared, ordered set of treatment labels and the rule
//! that assigns a label to a file name.
//!
//! A label matches when it occurs in the file name as a whole word, ignoring case.
//! Word characters follow regex `\b` semantics, so `_` joins words: `fish_LS_1.tif`
//! does not match `LS`, while `fish LS 1.tif` and `fish-LS-1.tif` do.
//!
//! Labels are tried in declared order and the first match wins. A file name that
//! contains several labels is therefore assigned the earliest declared one.

use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Vocabulary {
    labels: Vec<String>,
    patterns: Vec<Regex>,
    control: String,
}

impl Vocabulary {
    pub fn new<S: AsRef<str>>(labels: &[S], control: &str) -> Result<Self> {
        let labels: Vec<String> = labels.iter().map(|l| l.as_ref().trim().to_string()).collect();
        let control = control.trim();
        if labels.is_empty() {
            return Err(Error::InvalidConfig("no treatments declared".into()));
        }
        if let Some(blank) = labels.iter().position(|l| l.is_empty()) {
            return Err(Error::InvalidConfig(format!("treatment #{} is empty", blank + 1)));
        }
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].iter().any(|prev| prev == label) {
                return Err(Error::InvalidConfig(format!("treatment {label:?} declared twice")));
            }
        }
        if !labels.iter().any(|l| l == control) {
            return Err(Error::UnknownControl(control.to_string()));
        }
        let patterns = labels
            .iter()
            .map(|l| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(l))))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            labels,
            patterns,
            control: control.to_string(),
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn control(&self) -> &str {
        &self.control
    }

    /// Non-control labels in declared order.
    pub fn treatments(&self) -> impl Iterator<Item = &str> {
        self.labels
            .iter()
            .map(String::as_str)
            .filter(move |l| *l != self.control)
    }

    /// Assign a label to `file_name`, first declared match wins.
    pub fn classify(&self, file_name: &str) -> Option<&str> {
        let mut hits = self
            .patterns
            .iter()
            .zip(&self.labels)
            .filter(|(re, _)| re.is_match(file_name))
            .map(|(_, label)| label.as_str());
        let first = hits.next()?;
        let others: Vec<&str> = hits.collect();
        if !others.is_empty() {
            debug!(
                file = file_name,
                chosen = first,
                ignored = ?others,
                "ambiguous treatment label"
            );
        }
        Some(first)
    }
}

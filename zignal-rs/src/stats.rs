//! Two-sample t-tests and the descriptive statistics used by the figure.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Variance assumption of the two-sample t-test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Variance {
    /// Pooled variance (Student).
    #[default]
    Equal,
    /// Unequal variances (Welch-Satterthwaite).
    Welch,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TTest {
    pub statistic: f64,
    pub df: f64,
    pub p_value: f64,
}

impl TTest {
    pub const UNDEFINED: TTest = TTest {
        statistic: f64::NAN,
        df: f64::NAN,
        p_value: f64::NAN,
    };
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator).
pub fn variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0)
}

/// Two-sided two-sample t-test of `a` against `b`.
///
/// Fewer than two observations on either side gives [`TTest::UNDEFINED`].
pub fn ttest_ind(a: &[f64], b: &[f64], policy: Variance) -> TTest {
    if a.len() < 2 || b.len() < 2 {
        return TTest::UNDEFINED;
    }
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (v1, v2) = (variance(a), variance(b));
    let diff = mean(a) - mean(b);

    let (se, df) = match policy {
        Variance::Equal => {
            let df = n1 + n2 - 2.0;
            let pooled = ((n1 - 1.0) * v1 + (n2 - 1.0) * v2) / df;
            ((pooled * (1.0 / n1 + 1.0 / n2)).sqrt(), df)
        }
        Variance::Welch => {
            let q1 = v1 / n1;
            let q2 = v2 / n2;
            let df = (q1 + q2).powi(2) / (q1.powi(2) / (n1 - 1.0) + q2.powi(2) / (n2 - 1.0));
            // Both groups constant: the Satterthwaite ratio is 0/0, report one degree.
            ((q1 + q2).sqrt(), if df.is_nan() { 1.0 } else { df })
        }
    };

    let statistic = diff / se;
    TTest {
        statistic,
        df,
        p_value: two_sided_p(statistic, df),
    }
}

fn two_sided_p(t: f64, df: f64) -> f64 {
    if t.is_nan() {
        return f64::NAN;
    }
    if t.is_infinite() {
        return 0.0;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * dist.cdf(-t.abs())).min(1.0),
        Err(_) => f64::NAN,
    }
}

/// Star label for a p-value; `n/a` when undefined.
pub fn significance(p: f64) -> &'static str {
    if p.is_nan() {
        "n/a"
    } else if p < 0.001 {
        "***"
    } else if p < 0.01 {
        "**"
    } else if p < 0.05 {
        "*"
    } else {
        "ns"
    }
}

/// Linearly interpolated quantile of sorted data, `q` in [0, 1].
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Box plot summary of one group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxSummary {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub whisker_low: f64,
    pub whisker_high: f64,
}

impl BoxSummary {
    /// Whiskers reach the most extreme observations within 1.5 IQR of the box.
    pub fn of(values: &[f64]) -> Option<BoxSummary> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(|a, b| a.total_cmp(b));
        let q1 = quantile_sorted(&sorted, 0.25);
        let median = quantile_sorted(&sorted, 0.5);
        let q3 = quantile_sorted(&sorted, 0.75);
        let reach = 1.5 * (q3 - q1);
        let whisker_low = sorted
            .iter()
            .copied()
            .find(|&v| v >= q1 - reach)
            .unwrap_or(q1);
        let whisker_high = sorted
            .iter()
            .rev()
            .copied()
            .find(|&v| v <= q3 + reach)
            .unwrap_or(q3);
        Some(BoxSummary {
            q1,
            median,
            q3,
            whisker_low,
            whisker_high,
        })
    }
}

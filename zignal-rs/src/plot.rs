//! Summary figure: one panel per cohort, a box per treatment with every observation
//! overlaid, and a bracket per control comparison annotated with its p-value.

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::collections::HashMap;
use std::path::Path;

use crate::compare::{cohorts_in_order, group_values};
use crate::error::{Error, Result};
use crate::record::{ensure_parent, ComparisonResult, SampleRecord};
use crate::stats::BoxSummary;

/// Colors of the six-treatment zebrafish panel, reused in declared order.
pub const DEFAULT_COLORS: [&str; 6] = [
    "#F8766D", "#E6AB02", "#66A61E", "#1E90FF", "#7570B3", "#E78AC3",
];

const FALLBACK: RGBColor = RGBColor(160, 160, 160);

#[derive(Clone, Debug)]
pub struct FigureStyle {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub treatments: Vec<String>,
    pub control: String,
    pub palette: HashMap<String, RGBColor>,
    pub width: u32,
    pub height: u32,
}

impl Default for FigureStyle {
    fn default() -> Self {
        Self {
            title: "Fluorescence signal".to_string(),
            x_label: "Treatment".to_string(),
            y_label: "Signal (sum of pixel intensity)".to_string(),
            treatments: Vec::new(),
            control: "control".to_string(),
            palette: HashMap::new(),
            width: 1400,
            height: 600,
        }
    }
}

/// Parse `#RRGGBB` (leading `#` optional).
pub fn parse_hex(s: &str) -> Result<RGBColor> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidConfig(format!("bad color {s:?}, expected #RRGGBB")));
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
    match (channel(0), channel(2), channel(4)) {
        (Ok(r), Ok(g), Ok(b)) => Ok(RGBColor(r, g, b)),
        _ => Err(Error::InvalidConfig(format!("bad color {s:?}"))),
    }
}

/// Assign [`DEFAULT_COLORS`] to treatments by position, cycling when there are more.
pub fn default_palette(treatments: &[String]) -> HashMap<String, RGBColor> {
    treatments
        .iter()
        .enumerate()
        .filter_map(|(i, t)| {
            parse_hex(DEFAULT_COLORS[i % DEFAULT_COLORS.len()])
                .ok()
                .map(|c| (t.clone(), c))
        })
        .collect()
}

/// p-value with three significant digits, scientific below 0.001.
pub fn format_p(p: f64) -> String {
    if !p.is_finite() {
        return "NaN".to_string();
    }
    if p == 0.0 {
        return "0".to_string();
    }
    if p < 1e-3 {
        return format!("{:.2e}", p);
    }
    let digits = (2 - p.log10().floor() as i32).max(0) as usize;
    format!("{:.*}", digits, p)
}

/// Deterministic horizontal offset for the k-th point of a column.
pub fn jitter(k: usize) -> f64 {
    ((k as f64 * 0.618_033_988_75).fract() - 0.5) * 0.3
}

/// Vertical layout shared by all panels: (y_min, y_max, bracket base, bracket step).
pub fn y_layout(records: &[SampleRecord], brackets: usize) -> (f64, f64, f64, f64) {
    let finite = records.iter().map(|r| r.signal).filter(|v| v.is_finite());
    let lo = finite.clone().fold(0.0f64, f64::min);
    let hi = finite.fold(0.0f64, f64::max);
    let span = if hi - lo > 0.0 { hi - lo } else { 1.0 };
    let base = hi + 0.05 * span;
    let step = 0.07 * span;
    let top = base + step * brackets as f64 + 0.05 * span;
    (lo, top, base, step)
}

pub fn render(
    path: &Path,
    records: &[SampleRecord],
    results: &[ComparisonResult],
    style: &FigureStyle,
) -> Result<()> {
    let cohorts = cohorts_in_order(records);
    if cohorts.is_empty() {
        return Err(Error::EmptyDataset);
    }
    if style.treatments.is_empty() {
        return Err(Error::InvalidConfig("figure needs at least one treatment".into()));
    }
    ensure_parent(path)?;

    let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(&style.title, ("sans-serif", 24))?;
    let brackets = style.treatments.iter().filter(|t| **t != style.control).count();
    let layout = y_layout(records, brackets);

    for (i, (panel, cohort)) in root
        .split_evenly((1, cohorts.len()))
        .iter()
        .zip(&cohorts)
        .enumerate()
    {
        draw_panel(panel, cohort, i == 0, records, results, style, layout)?;
    }
    root.present()?;
    Ok(())
}

fn draw_panel(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    cohort: &str,
    first: bool,
    records: &[SampleRecord],
    results: &[ComparisonResult],
    style: &FigureStyle,
    (y_min, y_max, base, step): (f64, f64, f64, f64),
) -> Result<()> {
    let n = style.treatments.len();
    let mut chart = ChartBuilder::on(area)
        .caption(cohort, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(if first { 80 } else { 50 })
        .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), y_min..y_max)?;

    let labels = &style.treatments;
    let x_fmt = |x: &f64| {
        let i = x.round();
        if (x - i).abs() < 1e-6 && i >= 0.0 && (i as usize) < labels.len() {
            labels[i as usize].clone()
        } else {
            String::new()
        }
    };
    let mut mesh = chart.configure_mesh();
    mesh.disable_x_mesh()
        .x_labels(n + 1)
        .x_label_formatter(&x_fmt)
        .x_desc(style.x_label.as_str());
    if first {
        mesh.y_desc(style.y_label.as_str());
    }
    mesh.draw()?;

    let outline: ShapeStyle = BLACK.stroke_width(1);
    let hw = 0.3;
    for (i, treatment) in style.treatments.iter().enumerate() {
        let x = i as f64;
        let values = group_values(records, cohort, treatment);
        let color = style.palette.get(treatment).copied().unwrap_or(FALLBACK);

        if let Some(b) = BoxSummary::of(&values) {
            chart.draw_series(std::iter::once(Rectangle::new(
                [(x - hw, b.q1), (x + hw, b.q3)],
                color.mix(0.85).filled(),
            )))?;
            chart.draw_series(std::iter::once(Rectangle::new(
                [(x - hw, b.q1), (x + hw, b.q3)],
                outline,
            )))?;
            chart.draw_series(vec![
                PathElement::new(
                    vec![(x - hw, b.median), (x + hw, b.median)],
                    BLACK.stroke_width(2),
                ),
                PathElement::new(vec![(x, b.q3), (x, b.whisker_high)], outline),
                PathElement::new(vec![(x, b.q1), (x, b.whisker_low)], outline),
                PathElement::new(
                    vec![(x - hw / 2.0, b.whisker_high), (x + hw / 2.0, b.whisker_high)],
                    outline,
                ),
                PathElement::new(
                    vec![(x - hw / 2.0, b.whisker_low), (x + hw / 2.0, b.whisker_low)],
                    outline,
                ),
            ])?;
        }

        chart.draw_series(
            values
                .iter()
                .enumerate()
                .map(|(k, &v)| Circle::new((x + jitter(k), v), 3, BLACK.mix(0.6).filled())),
        )?;
    }

    let Some(control_x) = style.treatments.iter().position(|t| *t == style.control) else {
        return Ok(());
    };
    let x1 = control_x as f64;
    let tick = step * 0.2;
    let label_style =
        TextStyle::from(("sans-serif", 12).into_font()).pos(Pos::new(HPos::Center, VPos::Bottom));
    let non_control = style.treatments.iter().enumerate().filter(|(_, t)| **t != style.control);
    for (j, (i, treatment)) in non_control.enumerate() {
        let Some(result) = results
            .iter()
            .find(|r| r.cohort == cohort && r.treatment == *treatment)
        else {
            continue;
        };
        let x2 = i as f64;
        let y = base + step * j as f64;
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(x1, y), (x1, y + tick), (x2, y + tick), (x2, y)],
            BLACK.stroke_width(1),
        )))?;
        chart.draw_series(std::iter::once(Text::new(
            format!("{} (p={})", result.significance, format_p(result.p_value)),
            ((x1 + x2) / 2.0, y + tick * 1.25),
            label_style.clone(),
        )))?;
    }
    Ok(())
}

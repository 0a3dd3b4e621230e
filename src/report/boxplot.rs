use std::fmt::Display;
use std::path::Path;

use log::{info, warn};
use plotters::prelude::*;
use serde::Serialize;

use crate::algorithms::schema::{LabPanel, LabValueAggregated};
use crate::report::ReportError;
use crate::stats::round_to;

pub const PLOT_TITLE: &str = "Aggregated Laboratory Values (Per-Patient)";
pub const NO_DATA_MESSAGE: &str = "No valid aggregated lab values available";

const WIDTH: u32 = 1000;
const HEIGHT: u32 = 600;
const BOX_HALF_WIDTH: f64 = 0.3;

/// Box drawn for one lab variable from its aggregated summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxSummary {
    pub label: String,
    /// Lower whisker, `Q1 - 1.5 IQR`
    pub whislo: f64,
    pub q1: f64,
    pub med: f64,
    pub q3: f64,
    /// Upper whisker, `Q3 + 1.5 IQR`
    pub whishi: f64,
    pub mean: f64,
}

impl BoxSummary {
    /// One box per lab variable; variables with an undefined quartile or mean are skipped
    pub fn from_aggregated(panel: &LabPanel<LabValueAggregated>) -> Vec<BoxSummary> {
        panel
            .iter()
            .filter_map(|(variable, value)| {
                let (q1, med, q3, mean) = (value.q1?, value.median?, value.q3?, value.mean?);
                let iqr = q3 - q1;
                Some(BoxSummary {
                    label: variable.to_string(),
                    whislo: round_to(q1 - 1.5 * iqr, 2),
                    q1: round_to(q1, 2),
                    med: round_to(med, 2),
                    q3: round_to(q3, 2),
                    whishi: round_to(q3 + 1.5 * iqr, 2),
                    mean: round_to(mean, 2),
                })
            })
            .collect()
    }

    /// Boxes and patient count from a `partial_stats` result
    pub fn from_partial_stats(
        result: &serde_json::Value,
    ) -> Result<(Vec<BoxSummary>, Option<u64>), ReportError> {
        let section = "laboratory_values_grouped_by_pat_id";
        let aggregated = result
            .get(section)
            .ok_or_else(|| ReportError::MissingSection(section.to_string()))?;
        let panel: LabPanel<LabValueAggregated> = serde_json::from_value(aggregated.clone())?;
        let total_patients = result["visits_per_time_period"]["total_patients"].as_u64();
        Ok((Self::from_aggregated(&panel), total_patients))
    }
}

/// Caption shown when fewer groups than `safety_threshold` back the plot
pub fn small_sample_warning(total_patients: Option<u64>, safety_threshold: usize) -> Option<String> {
    match total_patients {
        Some(n) if (n as usize) < safety_threshold => Some(format!(
            "Warning: Only {} groups (<{}) available.",
            n, safety_threshold
        )),
        _ => None,
    }
}

fn drawing_error(path: &Path, e: impl Display) -> ReportError {
    ReportError::Drawing {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn value_range(summaries: &[BoxSummary]) -> (f64, f64) {
    let lo = summaries
        .iter()
        .map(|s| s.whislo.min(s.mean))
        .fold(f64::INFINITY, f64::min);
    let hi = summaries
        .iter()
        .map(|s| s.whishi.max(s.mean))
        .fold(f64::NEG_INFINITY, f64::max);
    let pad = if hi > lo { (hi - lo) * 0.05 } else { 1.0 };
    (lo - pad, hi + pad)
}

/// Render the aggregated lab values as an SVG box plot
pub fn render_boxplot(
    path: &Path,
    summaries: &[BoxSummary],
    total_patients: Option<u64>,
    safety_threshold: usize,
) -> Result<(), ReportError> {
    let root = SVGBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| drawing_error(path, e))?;

    if summaries.is_empty() {
        warn!("{}", NO_DATA_MESSAGE);
        let area = root
            .titled(PLOT_TITLE, ("sans-serif", 24))
            .map_err(|e| drawing_error(path, e))?;
        area.draw(&Text::new(
            NO_DATA_MESSAGE,
            (WIDTH as i32 / 2 - 200, HEIGHT as i32 / 2 - 40),
            ("sans-serif", 20).into_font().color(&RED),
        ))
        .map_err(|e| drawing_error(path, e))?;
        root.present().map_err(|e| drawing_error(path, e))?;
        return Ok(());
    }

    let labels: Vec<&str> = summaries.iter().map(|s| s.label.as_str()).collect();
    let (y_min, y_max) = value_range(summaries);
    let mut chart = ChartBuilder::on(&root)
        .caption(PLOT_TITLE, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5f64..(summaries.len() as f64 - 0.5), y_min..y_max)
        .map_err(|e| drawing_error(path, e))?;

    // boxes sit on integer positions; other ticks stay blank
    let label_at = |x: &f64| {
        let i = x.round();
        if (x - i).abs() < 1e-6 && i >= 0.0 {
            labels.get(i as usize).map(|l| l.to_string()).unwrap_or_default()
        } else {
            String::new()
        }
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(summaries.len())
        .x_label_formatter(&label_at)
        .y_desc("Value")
        .draw()
        .map_err(|e| drawing_error(path, e))?;

    chart
        .draw_series(summaries.iter().enumerate().map(|(i, s)| {
            let x = i as f64;
            Rectangle::new(
                [(x - BOX_HALF_WIDTH, s.q1), (x + BOX_HALF_WIDTH, s.q3)],
                BLUE.mix(0.3).filled(),
            )
        }))
        .map_err(|e| drawing_error(path, e))?;

    chart
        .draw_series(summaries.iter().enumerate().flat_map(|(i, s)| {
            let x = i as f64;
            let cap = BOX_HALF_WIDTH / 2.0;
            vec![
                PathElement::new(
                    vec![(x - BOX_HALF_WIDTH, s.med), (x + BOX_HALF_WIDTH, s.med)],
                    BLACK.stroke_width(2),
                ),
                PathElement::new(vec![(x, s.whislo), (x, s.q1)], BLACK.stroke_width(1)),
                PathElement::new(vec![(x, s.q3), (x, s.whishi)], BLACK.stroke_width(1)),
                PathElement::new(
                    vec![(x - cap, s.whislo), (x + cap, s.whislo)],
                    BLACK.stroke_width(1),
                ),
                PathElement::new(
                    vec![(x - cap, s.whishi), (x + cap, s.whishi)],
                    BLACK.stroke_width(1),
                ),
            ]
        }))
        .map_err(|e| drawing_error(path, e))?;

    chart
        .draw_series(
            summaries
                .iter()
                .enumerate()
                .map(|(i, s)| Circle::new((i as f64, s.mean), 5, RED.filled())),
        )
        .map_err(|e| drawing_error(path, e))?;

    if let Some(message) = small_sample_warning(total_patients, safety_threshold) {
        warn!("{}", message);
        root.draw(&Text::new(
            message,
            (WIDTH as i32 / 2 - 180, 50),
            ("sans-serif", 18).into_font().color(&RED),
        ))
        .map_err(|e| drawing_error(path, e))?;
    }

    root.present().map_err(|e| drawing_error(path, e))?;
    info!("Box plot of {} lab variables written to {}", summaries.len(), path.display());
    Ok(())
}

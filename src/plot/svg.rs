//! SVG fit-overlay dumps rendered with Plotters.
//!
//! One file per efficiency: a grid with one row per fitted slice and two
//! columns (denominator, numerator). Each panel shows
//! - the binned data inside the fit range (dots)
//! - the fitted total curve (blue)
//! - the fitted background component (red)
//!
//! The document is rendered into memory first and written in one scoped file
//! write, so the file handle is released on every return path.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::error::TnpError;
use crate::fit::SpectrumFit;

const PANEL_WIDTH: u32 = 480;
const PANEL_HEIGHT: u32 = 320;
const CURVE_POINTS: usize = 200;

/// One fitted spectrum to draw.
pub struct OverlayPanel<'a> {
    pub title: String,
    pub fit: &'a SpectrumFit,
}

/// Render `panels` (row-major, two per row) and write them to `path`.
pub fn write_fit_overlay(path: &Path, panels: &[OverlayPanel<'_>]) -> Result<(), TnpError> {
    if panels.is_empty() {
        return Ok(());
    }
    let svg = render_fit_overlay(panels)?;

    let file = File::create(path)
        .map_err(|e| TnpError::io(format!("failed to create plot file '{}'", path.display()), e))?;
    let mut out = BufWriter::new(file);
    out.write_all(svg.as_bytes())
        .and_then(|_| out.flush())
        .map_err(|e| TnpError::io(format!("failed to write plot file '{}'", path.display()), e))?;
    Ok(())
}

/// Render `panels` to an SVG document string.
pub fn render_fit_overlay(panels: &[OverlayPanel<'_>]) -> Result<String, TnpError> {
    let rows = panels.len().div_ceil(2);
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (2 * PANEL_WIDTH, rows as u32 * PANEL_HEIGHT))
            .into_drawing_area();
        root.fill(&WHITE).map_err(plot_error)?;

        let areas = root.split_evenly((rows, 2));
        for (area, panel) in areas.iter().zip(panels) {
            draw_panel(area, panel).map_err(plot_error)?;
        }
        root.present().map_err(plot_error)?;
    }
    Ok(svg)
}

fn draw_panel(
    area: &DrawingArea<SVGBackend<'_>, Shift>,
    panel: &OverlayPanel<'_>,
) -> Result<(), DrawingAreaErrorKind<std::io::Error>> {
    let fit = panel.fit;
    let (x0, x1) = x_bounds(fit);
    let curve = sample(|x| fit.predict(x), x0, x1);
    let bg = sample(|x| fit.background(x), x0, x1);
    let (y0, y1) = y_bounds(fit, &curve);

    let caption = format!("{} (χ²/ndf = {:.2}/{})", panel.title, fit.chi2, fit.ndf);
    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 14))
        .margin(8)
        .set_label_area_size(LabelAreaPosition::Left, 48)
        .set_label_area_size(LabelAreaPosition::Bottom, 32)
        .build_cartesian_2d(x0..x1, y0..y1)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_desc("mass")
        .y_desc("entries / bin")
        .x_labels(6)
        .y_labels(5)
        .draw()?;

    chart.draw_series(
        fit.data
            .iter()
            .map(|&(x, y)| Circle::new((x, y), 2, BLACK.filled())),
    )?;
    chart.draw_series(LineSeries::new(curve, &BLUE))?;
    chart.draw_series(LineSeries::new(bg, &RED))?;
    Ok(())
}

fn plot_error<E: std::error::Error + Send + Sync>(e: DrawingAreaErrorKind<E>) -> TnpError {
    TnpError::io("failed to render fit overlay", std::io::Error::other(e.to_string()))
}

fn x_bounds(fit: &SpectrumFit) -> (f64, f64) {
    let half = 0.5 * fit.bin_width;
    let lo = fit.data.first().map(|p| p.0 - half).unwrap_or(0.0);
    let hi = fit.data.last().map(|p| p.0 + half).unwrap_or(1.0);
    if hi > lo { (lo, hi) } else { (lo, lo + 1.0) }
}

fn y_bounds(fit: &SpectrumFit, curve: &[(f64, f64)]) -> (f64, f64) {
    let values = fit.data.iter().chain(curve.iter()).map(|p| p.1).filter(|v| v.is_finite());
    let (lo, hi) = values.fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    (lo, hi * 1.15 + 1.0)
}

fn sample(f: impl Fn(f64) -> f64, x0: f64, x1: f64) -> Vec<(f64, f64)> {
    (0..CURVE_POINTS)
        .map(|i| {
            let x = x0 + (x1 - x0) * i as f64 / (CURVE_POINTS - 1) as f64;
            (x, f(x))
        })
        .collect()
}

//! Per-athlete PNG charts of a profiling run
//!
//! Three kinds are drawn on a fixed 0..11 speed/acceleration frame: the
//! outlier scatter, the linear profile and the quantile band.

use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::OutputSettings;
use crate::error::ExportError;
use crate::models::{Sample, SampleId};
use crate::pipeline::ProfilingReport;

type ChartError = Box<dyn std::error::Error>;
type Chart<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

const AXIS_MAX: f64 = 11.0;
const SIZE: (u32, u32) = (800, 600);

pub struct ChartRenderer {
    images_dir: PathBuf,
    session: String,
}

impl ChartRenderer {
    pub fn new<P: AsRef<Path>>(images_dir: P, session: &str) -> Self {
        Self {
            images_dir: images_dir.as_ref().to_path_buf(),
            session: session.to_string(),
        }
    }

    fn image_path(&self, athlete: &str, kind: &str) -> PathBuf {
        self.images_dir
            .join(format!("{}_{}_{}.png", self.session, athlete, kind))
    }

    /// Draw every enabled chart kind for every athlete of the cohort
    pub fn render(
        &self,
        report: &ProfilingReport,
        settings: &OutputSettings,
    ) -> Result<Vec<PathBuf>, ExportError> {
        std::fs::create_dir_all(&self.images_dir)?;
        let mut written = Vec::new();

        for athlete in report.cohort.iter() {
            if settings.plot_outliers {
                let path = self.image_path(athlete, "outliers");
                draw_outliers(&path, report, athlete).map_err(chart_error)?;
                written.push(path);
            }
            if settings.plot_linear && report.linear.as_ref().is_some_and(|m| m.contains_key(athlete)) {
                let path = self.image_path(athlete, "Linear_Regression");
                draw_linear(&path, report, athlete).map_err(chart_error)?;
                written.push(path);
            }
            if settings.plot_quantile
                && report.quantile.as_ref().is_some_and(|m| m.contains_key(athlete))
            {
                let path = self.image_path(athlete, "Quantile_Regression");
                draw_quantile(&path, report, athlete).map_err(chart_error)?;
                written.push(path);
            }
            debug!(athlete, "Charts drawn");
        }

        info!(charts = written.len(), dir = %self.images_dir.display(), "Charts written");
        Ok(written)
    }
}

fn chart_error(e: ChartError) -> ExportError {
    ExportError::Chart(e.to_string())
}

fn frame<'a, DB>(root: &'a DrawingArea<DB, Shift>, title: &str) -> Result<Chart<'a, DB>, ChartError>
where
    DB: DrawingBackend + 'a,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..AXIS_MAX, 0.0..AXIS_MAX)?;

    chart
        .configure_mesh()
        .x_desc("Speed (m/s)")
        .y_desc("Acceleration (m/s²)")
        .draw()?;
    Ok(chart)
}

fn scatter<'a, DB, I>(chart: &mut Chart<'a, DB>, samples: I, style: ShapeStyle, size: i32) -> Result<(), ChartError>
where
    DB: DrawingBackend + 'a,
    DB::ErrorType: 'static,
    I: IntoIterator<Item = (f64, f64)>,
{
    chart.draw_series(
        samples
            .into_iter()
            .map(move |point| Circle::new(point, size, style)),
    )?;
    Ok(())
}

/// Segment of a profile line between its axis intercepts
fn profile_segment(a0: f64, s0: f64) -> Vec<(f64, f64)> {
    vec![(0.0, a0), (s0, 0.0)]
}

fn points<'s, I: IntoIterator<Item = &'s Sample>>(samples: I) -> Vec<(f64, f64)> {
    samples
        .into_iter()
        .map(|s| (s.speed, s.acceleration))
        .collect()
}

fn draw_outliers(path: &Path, report: &ProfilingReport, athlete: &str) -> Result<(), ChartError> {
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    let mut chart = frame(&root, &format!("Outliers: {}", athlete))?;

    let clean = report.cleaned.samples().iter().filter(|s| s.athlete == athlete);
    scatter(&mut chart, points(clean), BLUE.mix(0.5).filled(), 3)?;

    let measurement = report.measurement.for_athlete(athlete).map(|f| &f.sample);
    scatter(&mut chart, points(measurement), RED.filled(), 3)?;

    let misuse = report.misuse.for_athlete(athlete).map(|f| &f.sample);
    scatter(&mut chart, points(misuse), BLACK.filled(), 3)?;

    root.present()?;
    Ok(())
}

/// Cleaned points in blue, high-intensity points in red
fn draw_working_points<'a, DB>(
    chart: &mut Chart<'a, DB>,
    report: &ProfilingReport,
    athlete: &str,
) -> Result<(), ChartError>
where
    DB: DrawingBackend + 'a,
    DB::ErrorType: 'static,
{
    let high_intensity = report.high_intensity.get(athlete).unwrap_or(&[]);
    let selected: Vec<SampleId> = high_intensity.iter().map(|h| h.sample.id).collect();

    let clean = report
        .cleaned
        .samples()
        .iter()
        .filter(|s| s.athlete == athlete && !selected.contains(&s.id));
    scatter(chart, points(clean), BLUE.mix(0.5).filled(), 3)?;
    scatter(chart, points(high_intensity.iter().map(|h| &h.sample)), RED.filled(), 3)?;
    Ok(())
}

fn draw_linear(path: &Path, report: &ProfilingReport, athlete: &str) -> Result<(), ChartError> {
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    let mut chart = frame(&root, &format!("Linear regression: {}", athlete))?;
    draw_working_points(&mut chart, report, athlete)?;

    let profile = report.linear.as_ref().and_then(|m| m.get(athlete));
    if let Some((a0, s0)) = profile.and_then(|p| Some((p.a0()?, p.s0()?))) {
        chart.draw_series(LineSeries::new(profile_segment(a0, s0), RED.stroke_width(2)))?;
        chart.draw_series(std::iter::once(Text::new(
            format!("a0 = {:.2} m/s², s0 = {:.2} m/s", a0, s0),
            (6.0, 10.0),
            ("sans-serif", 16).into_font().color(&RED),
        )))?;
    }

    root.present()?;
    Ok(())
}

fn draw_quantile(path: &Path, report: &ProfilingReport, athlete: &str) -> Result<(), ChartError> {
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    let mut chart = frame(&root, &format!("Quantile regression: {}", athlete))?;
    draw_working_points(&mut chart, report, athlete)?;

    if let Some(peak) = report.high_intensity.get(athlete).and_then(|h| h.first()) {
        scatter(
            &mut chart,
            [(peak.speed_at_max_acceleration, peak.max_acceleration)],
            GREEN.filled(),
            6,
        )?;
    }

    let Some(profile) = report.quantile.as_ref().and_then(|m| m.get(athlete)) else {
        root.present()?;
        return Ok(());
    };

    // One grey line every 0.1 of q
    let first = profile.fits.first().map_or(0.0, |f| f.q);
    for fit in profile.fits.iter().filter(|f| {
        let steps = (f.q - first) / 0.1;
        (steps - steps.round()).abs() < 1e-6
    }) {
        chart.draw_series(LineSeries::new(
            profile_segment(fit.a0, fit.s0),
            RGBColor(128, 128, 128).mix(0.7),
        ))?;
    }

    chart.draw_series(LineSeries::new(
        profile_segment(profile.mean_a0, profile.mean_s0),
        RED.stroke_width(2),
    ))?;

    let label = ("sans-serif", 16).into_font().color(&RED);
    chart.draw_series(std::iter::once(Text::new(
        format!("a0 = {:.2} ± {:.2} m/s²", profile.mean_a0, profile.std_a0),
        (2.0, 10.0),
        label.clone(),
    )))?;
    chart.draw_series(std::iter::once(Text::new(
        format!("s0 = {:.2} ± {:.2} m/s", profile.mean_s0, profile.std_s0),
        (7.0, 5.0),
        label,
    )))?;

    root.present()?;
    Ok(())
}

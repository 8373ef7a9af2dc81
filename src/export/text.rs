use std::fmt::Write;
use tabled::{settings::Style, Table, Tabled};

use crate::pipeline::ProfilingReport;
use crate::regression::ProfileTable;

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "Player")]
    player: String,
    #[tabled(rename = "a0 linear")]
    a0_linear: String,
    #[tabled(rename = "s0 linear")]
    s0_linear: String,
    #[tabled(rename = "R²")]
    r_squared: String,
    #[tabled(rename = "a0 quantile")]
    a0_quantile: String,
    #[tabled(rename = "s0 quantile")]
    s0_quantile: String,
    #[tabled(rename = "Points")]
    points: usize,
}

fn format_value(value: Option<f64>) -> String {
    value.map_or("-".to_string(), |v| format!("{:.2}", v))
}

fn format_band(mean: Option<f64>, std: Option<f64>) -> String {
    match (mean, std) {
        (Some(mean), Some(std)) => format!("{:.2} ± {:.2}", mean, std),
        (Some(mean), None) => format!("{:.2}", mean),
        _ => "-".to_string(),
    }
}

/// Render the per-athlete profile table for the terminal
pub fn render_profile_table(table: &ProfileTable) -> String {
    let rows: Vec<ProfileRow> = table
        .rows
        .iter()
        .map(|row| {
            let linear = row.linear.as_ref();
            let quantile = row.quantile.as_ref();
            ProfileRow {
                player: row.athlete.clone(),
                a0_linear: format_value(linear.and_then(|p| p.a0())),
                s0_linear: format_value(linear.and_then(|p| p.s0())),
                r_squared: linear
                    .and_then(|p| p.r_squared)
                    .map_or("-".to_string(), |r| format!("{:.3}", r)),
                a0_quantile: format_band(quantile.map(|p| p.mean_a0), quantile.map(|p| p.std_a0)),
                s0_quantile: format_band(quantile.map(|p| p.mean_s0), quantile.map(|p| p.std_s0)),
                points: linear
                    .map(|p| p.n_points)
                    .or_else(|| quantile.map(|p| p.n_points))
                    .unwrap_or(0),
            }
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Cleaning statistics for a run
pub fn render_run_summary(report: &ProfilingReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Athletes: {}", report.cohort.len());
    let _ = writeln!(out, "Samples admitted: {}", report.admitted.len());
    let _ = writeln!(out, "Misuse errors removed: {}", report.misuse.len());
    let _ = writeln!(out, "Measurement errors removed: {}", report.measurement.len());
    let _ = writeln!(out, "High-intensity points: {}", report.high_intensity.len());

    let unprofiled = report.unprofiled_athletes();
    if !unprofiled.is_empty() {
        let _ = writeln!(out, "Not profiled (no high-intensity points): {}", unprofiled.join(", "));
    }
    out
}

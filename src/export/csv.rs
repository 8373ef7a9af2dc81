use csv::Writer;
use std::io::Write;
use std::path::Path;

use crate::error::ExportError;
use crate::models::FlaggedSet;
use crate::regression::ProfileTable;

fn cell(value: Option<f64>) -> String {
    value.map_or(String::new(), |v| v.to_string())
}

/// Write one row per athlete. Only columns of the modes that ran are
/// present; an untrained linear model leaves its a0/s0 cells empty.
pub fn write_profile_table<W: Write>(table: &ProfileTable, writer: W) -> Result<(), ExportError> {
    let mut csv = Writer::from_writer(writer);
    let (linear, quantile) = (table.has_linear(), table.has_quantile());

    let mut header = vec!["Player"];
    if linear {
        header.extend(["a0_linear", "s0_linear", "r2_linear"]);
    }
    if quantile {
        header.extend(["a0_quantile", "std_a0", "s0_quantile", "std_s0"]);
    }
    csv.write_record(&header)?;

    for row in &table.rows {
        let mut record = vec![row.athlete.clone()];
        if linear {
            let profile = row.linear.as_ref();
            record.push(cell(profile.and_then(|p| p.a0())));
            record.push(cell(profile.and_then(|p| p.s0())));
            record.push(cell(profile.and_then(|p| p.r_squared)));
        }
        if quantile {
            let profile = row.quantile.as_ref();
            record.push(cell(profile.map(|p| p.mean_a0)));
            record.push(cell(profile.map(|p| p.std_a0)));
            record.push(cell(profile.map(|p| p.mean_s0)));
            record.push(cell(profile.map(|p| p.std_s0)));
        }
        csv.write_record(&record)?;
    }

    csv.flush()?;
    Ok(())
}

pub fn export_profile_table<P: AsRef<Path>>(
    table: &ProfileTable,
    output_path: P,
) -> Result<(), ExportError> {
    let file = std::fs::File::create(output_path)?;
    write_profile_table(table, file)
}

/// Export every per-quantile (q, a0, s0) fit, the data behind confidence bands
pub fn export_quantile_table<P: AsRef<Path>>(
    table: &ProfileTable,
    output_path: P,
) -> Result<(), ExportError> {
    let mut csv = Writer::from_path(output_path)?;
    csv.write_record(["Player", "q", "a0", "s0"])?;

    for profile in table.rows.iter().filter_map(|r| r.quantile.as_ref()) {
        for fit in &profile.fits {
            csv.write_record([
                profile.athlete.clone(),
                format!("{:.2}", fit.q),
                fit.a0.to_string(),
                fit.s0.to_string(),
            ])?;
        }
    }

    csv.flush()?;
    Ok(())
}

/// Export removed samples with the reason they were removed
pub fn export_flagged<P: AsRef<Path>>(
    sets: &[&FlaggedSet],
    output_path: P,
) -> Result<(), ExportError> {
    let mut csv = Writer::from_path(output_path)?;
    csv.write_record([
        "Id",
        "Player",
        "Timestamp",
        "Date",
        "Speed",
        "Acceleration",
        "Error",
        "Flagged_Count",
        "Cluster_Label",
    ])?;

    for set in sets {
        for flagged in &set.samples {
            let sample = &flagged.sample;
            csv.write_record([
                sample.id.0.to_string(),
                sample.athlete.clone(),
                sample.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
                sample.date.format("%Y-%m-%d").to_string(),
                sample.speed.to_string(),
                sample.acceleration.to_string(),
                set.kind.to_string(),
                flagged.flagged_count.map_or(String::new(), |c| c.to_string()),
                flagged.cluster_label.map_or(String::new(), |l| l.to_string()),
            ])?;
        }
    }

    csv.flush()?;
    Ok(())
}

//! Result files of a profiling run

use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::OutputSettings;
use crate::error::ExportError;
use crate::pipeline::ProfilingReport;

pub mod csv;
pub mod json;
pub mod text;

/// Writes the result files of one session into the results directory
#[derive(Debug, Clone)]
pub struct SessionExporter {
    results_dir: PathBuf,
    session: String,
    settings: OutputSettings,
}

impl SessionExporter {
    pub fn new(session: &str, settings: &OutputSettings) -> Self {
        Self {
            results_dir: settings.results_dir.clone(),
            session: session.to_string(),
            settings: settings.clone(),
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Directory receiving chart images
    pub fn images_dir(&self) -> PathBuf {
        self.results_dir.join("images")
    }

    pub fn profile_path(&self) -> PathBuf {
        self.results_dir
            .join(format!("ProfilAV_insitu_{}.csv", self.session))
    }

    pub fn quantile_table_path(&self) -> PathBuf {
        self.results_dir
            .join(format!("ProfilAV_quantiles_{}.csv", self.session))
    }

    pub fn flagged_path(&self) -> PathBuf {
        self.results_dir
            .join(format!("Outliers_{}.csv", self.session))
    }

    pub fn json_path(&self) -> PathBuf {
        self.results_dir.join(format!("Report_{}.json", self.session))
    }

    /// Write the profile table and the optional extra files, returning the
    /// paths written. Fails before touching the disk if no fitting mode ran.
    pub fn export(&self, report: &ProfilingReport) -> Result<Vec<PathBuf>, ExportError> {
        let table = report.profile_table()?;
        std::fs::create_dir_all(&self.results_dir)?;

        let mut written = Vec::new();

        let path = self.profile_path();
        csv::export_profile_table(&table, &path)?;
        written.push(path);

        if self.settings.export_quantile_table && table.has_quantile() {
            let path = self.quantile_table_path();
            csv::export_quantile_table(&table, &path)?;
            written.push(path);
        }

        if self.settings.export_flagged {
            let path = self.flagged_path();
            csv::export_flagged(&[&report.misuse, &report.measurement], &path)?;
            written.push(path);
        }

        if self.settings.export_json {
            let path = self.json_path();
            json::export_json(report, &path)?;
            written.push(path);
        }

        for path in &written {
            info!(path = %path.display(), "Result file written");
        }
        Ok(written)
    }
}

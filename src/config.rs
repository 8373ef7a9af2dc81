use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::intensity::IntensityExtractor;
use crate::logging::LogConfig;
use crate::outliers::{ClusterFilter, MisuseFilter, PlausibilityEnvelope};
use crate::regression::quantile::SolverKind;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Session file reading preferences
    pub input: InputSettings,

    /// Misuse and measurement error detection
    pub outliers: OutlierSettings,

    /// High-intensity point selection
    pub intensity: IntensitySettings,

    /// Linear and quantile fitting
    pub regression: RegressionSettings,

    /// Result files and charts
    pub output: OutputSettings,

    /// Logging setup
    pub logging: LogConfig,
}

/// Session file reading preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    /// Field delimiter of the session file
    pub delimiter: char,

    /// Divide speed by 3.6 (km/h to m/s) after loading
    pub convert_speed: bool,

    /// Trust the device acceleration channel instead of deriving it from speed
    pub keep_acceleration: bool,

    /// Upper bound for the 99th percentile of speed, in m/s
    pub max_speed_p99: f64,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            delimiter: ',',
            convert_speed: false,
            keep_acceleration: false,
            max_speed_p99: 10.0,
        }
    }
}

/// Outlier detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierSettings {
    /// Minimum envelope hits on an athlete-day to discard it as misuse
    pub nb_outlier: usize,

    /// Clustering neighborhood radius in the (speed, acceleration) plane
    pub eps: f64,

    /// Neighbors (point included) required for a core point
    pub min_neighbors: usize,

    /// Acceleration ceiling at zero speed, m/s²
    pub envelope_acceleration: f64,

    /// Speed at which the ceiling reaches zero, m/s
    pub envelope_speed: f64,

    /// Clustering candidates satisfy `acceleration >= offset - speed`
    pub candidate_offset: f64,
}

impl Default for OutlierSettings {
    fn default() -> Self {
        Self {
            nb_outlier: 10,
            eps: 0.5,
            min_neighbors: 3,
            envelope_acceleration: 10.93,
            envelope_speed: 10.5,
            candidate_offset: 5.0,
        }
    }
}

impl OutlierSettings {
    pub fn misuse_filter(&self) -> MisuseFilter {
        MisuseFilter {
            envelope: PlausibilityEnvelope {
                max_acceleration: self.envelope_acceleration,
                max_speed: self.envelope_speed,
            },
            nb_outlier: self.nb_outlier,
        }
    }

    pub fn cluster_filter(&self) -> ClusterFilter {
        ClusterFilter {
            eps: self.eps,
            min_neighbors: self.min_neighbors,
            candidate_offset: self.candidate_offset,
        }
    }
}

/// High-intensity selection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntensitySettings {
    /// Speed bin width in m/s
    pub dv: f64,

    /// Number of acceleration ranks kept per bin
    pub n_max: usize,
}

impl Default for IntensitySettings {
    fn default() -> Self {
        Self { dv: 0.3, n_max: 2 }
    }
}

impl IntensitySettings {
    pub fn extractor(&self) -> IntensityExtractor {
        IntensityExtractor {
            dv: self.dv,
            n_max: self.n_max,
        }
    }
}

/// Fitting parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionSettings {
    /// Run the ordinary least-squares fit
    pub linear: bool,

    /// Run the quantile-regression family
    pub quantile: bool,

    /// Linear fits with R² at or below this value are reported untrained
    pub min_r_squared: f64,

    pub quantile_min: f64,
    pub quantile_max: f64,
    pub quantile_step: f64,

    /// Numeric routine used for each quantile fit
    pub solver: SolverKind,
}

impl Default for RegressionSettings {
    fn default() -> Self {
        Self {
            linear: true,
            quantile: true,
            min_r_squared: 0.5,
            quantile_min: 0.05,
            quantile_max: 0.95,
            quantile_step: 0.01,
            solver: SolverKind::Irls,
        }
    }
}

impl RegressionSettings {
    /// Quantile levels from min to max inclusive, rounded to remove step drift
    pub fn quantile_levels(&self) -> Vec<f64> {
        let steps = ((self.quantile_max - self.quantile_min) / self.quantile_step).round() as usize;
        (0..=steps)
            .map(|i| {
                let q = self.quantile_min + i as f64 * self.quantile_step;
                (q * 1e9).round() / 1e9
            })
            .collect()
    }
}

/// Result files and charts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Directory receiving profile tables (charts go to `images/` below it)
    pub results_dir: PathBuf,

    pub plot_outliers: bool,
    pub plot_linear: bool,
    pub plot_quantile: bool,

    /// Also write the full per-quantile (q, a0, s0) table
    pub export_quantile_table: bool,

    /// Also write every removed sample with its error kind
    pub export_flagged: bool,

    /// Also write the whole report as JSON
    pub export_json: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            plot_outliers: true,
            plot_linear: false,
            plot_quantile: true,
            export_quantile_table: false,
            export_flagged: false,
            export_json: false,
        }
    }
}

impl AppConfig {
    /// Default configuration file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("accelprofile")
            .join("config.toml")
    }

    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from the given path, or the default location, or fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::load_from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Reject parameter values the algorithms cannot work with
    pub fn validate(&self) -> Result<()> {
        if !self.input.delimiter.is_ascii() {
            anyhow::bail!("Delimiter must be a single ASCII character, got {:?}", self.input.delimiter);
        }
        if self.intensity.dv <= 0.0 {
            anyhow::bail!("Speed bin width dv must be positive, got {}", self.intensity.dv);
        }
        if self.intensity.n_max == 0 {
            anyhow::bail!("n_max must be at least 1");
        }
        if self.outliers.eps <= 0.0 {
            anyhow::bail!("Clustering radius must be positive, got {}", self.outliers.eps);
        }
        if self.outliers.min_neighbors == 0 {
            anyhow::bail!("Clustering min_neighbors must be at least 1");
        }
        if self.outliers.envelope_speed <= 0.0 {
            anyhow::bail!("Envelope speed must be positive, got {}", self.outliers.envelope_speed);
        }

        let r = &self.regression;
        if !(0.0 < r.quantile_min && r.quantile_min <= r.quantile_max && r.quantile_max < 1.0) {
            anyhow::bail!(
                "Quantile range must satisfy 0 < min <= max < 1, got {}..{}",
                r.quantile_min,
                r.quantile_max
            );
        }
        if r.quantile_step <= 0.0 {
            anyhow::bail!("Quantile step must be positive, got {}", r.quantile_step);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_quantile_levels() {
        let levels = RegressionSettings::default().quantile_levels();
        assert_eq!(levels.len(), 91);
        assert_eq!(levels[0], 0.05);
        assert_eq!(levels[45], 0.5);
        assert_eq!(levels[90], 0.95);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = toml::from_str("[intensity]\nn_max = 3\n").unwrap();
        assert_eq!(config.intensity.n_max, 3);
        assert_eq!(config.intensity.dv, 0.3);
        assert_eq!(config.outliers.nb_outlier, 10);
    }

    #[test]
    fn test_config_file_io() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = AppConfig::default();
        original.outliers.eps = 0.6;
        original.regression.solver = SolverKind::Exact;

        original.save_to_file(&config_path).unwrap();
        let loaded = AppConfig::load_from_file(&config_path).unwrap();

        assert_eq!(loaded.outliers.eps, 0.6);
        assert_eq!(loaded.regression.solver, SolverKind::Exact);
    }

    #[test]
    fn test_validation_rejects_bad_parameters() {
        let mut config = AppConfig::default();
        config.intensity.dv = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.regression.quantile_max = 1.0;
        assert!(config.validate().is_err());

        assert!(AppConfig::default().validate().is_ok());
    }
}

//! Unified error hierarchy for accelprofile
//!
//! Fatal errors abort a run before any filtering starts (schema and unit
//! validation) or at export time. Per-athlete fit problems are not errors;
//! they surface as [`crate::models::FitWarning`] values instead.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all profiling operations
#[derive(Debug, Error)]
pub enum ProfilerError {
    /// Session file loading errors
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Post-ingestion validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Result export errors
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Errors raised while reading a session file
#[derive(Debug, Error)]
pub enum ImportError {
    /// File not found at specified path
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Delimited reader failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A value could not be parsed for a known column
    #[error("Invalid value in column {column} at row {row}: {value:?}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },

    /// The file held no usable rows
    #[error("No usable samples in {path}")]
    Empty { path: PathBuf },
}

/// Schema and unit checks run before any filtering
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Required columns are absent after normalisation
    #[error("Missing required columns: {}", columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    /// Speed data looks like km/h rather than m/s
    #[error("Speed 99th percentile is {p99:.2} (limit {limit}); data is probably in km/h")]
    SpeedUnits { p99: f64, limit: f64 },
}

/// Errors raised when writing results
#[derive(Debug, Error)]
pub enum ExportError {
    /// Neither linear nor quantile fitting has been run
    #[error("No speed-acceleration profile has been computed")]
    NothingToExport,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited writer failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization failures
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Chart rendering failures
    #[error("Chart error: {0}")]
    Chart(String),
}

/// Result type alias for profiling operations
pub type Result<T> = std::result::Result<T, ProfilerError>;

impl ProfilerError {
    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ProfilerError::Validation(_) => ErrorSeverity::Critical,
            ProfilerError::Import(ImportError::FileNotFound { .. }) => ErrorSeverity::Error,
            ProfilerError::Export(ExportError::NothingToExport) => ErrorSeverity::Error,
            ProfilerError::Export(ExportError::Chart(_)) => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            ProfilerError::Import(ImportError::FileNotFound { path }) => {
                format!("Could not find session file: {}", path.display())
            }
            ProfilerError::Validation(ValidationError::MissingColumns { columns }) => {
                format!(
                    "The session file lacks columns needed for profiling: {}",
                    columns.join(", ")
                )
            }
            ProfilerError::Validation(ValidationError::SpeedUnits { .. }) => {
                "Speed values look like km/h. Convert them to m/s (use --convert-speed).".to_string()
            }
            ProfilerError::Export(ExportError::NothingToExport) => {
                "Nothing to export: run linear and/or quantile fitting first.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// The whole run is invalid
    Critical,
    /// Error that prevents the operation
    Error,
    /// Warning that doesn't prevent operation
    Warning,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
        }
    }
}

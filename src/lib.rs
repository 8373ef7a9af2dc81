// Library interface for accelprofile modules
// This allows integration tests and benches to access the core functionality

#[cfg(feature = "charts")]
pub mod charts;
pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod intensity;
pub mod logging;
pub mod models;
pub mod outliers;
pub mod pipeline;
pub mod regression;
pub mod store;

// Re-export commonly used types for convenience
pub use models::*;
pub use config::AppConfig;
pub use error::{ProfilerError, Result};
pub use import::{LoadOptions, SessionLoader};
pub use intensity::{HighIntensitySubset, IntensityExtractor};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use outliers::{ClusterFilter, MisuseFilter, PlausibilityEnvelope};
pub use pipeline::{FitModes, ProfilingPipeline, ProfilingReport};
pub use regression::{ProfileFitter, ProfileTable, QuantileSolver, SolverKind};
pub use store::SampleStore;

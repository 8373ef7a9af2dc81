//! End-to-end profiling run over one loaded session

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::ExportError;
use crate::intensity::{HighIntensitySubset, IntensityExtractor};
use crate::models::{AthleteCohort, FitWarning, FlaggedSet, LinearProfile, QuantileProfile};
use crate::outliers::{ClusterFilter, MisuseFilter};
use crate::regression::{LinearFitter, ProfileFitter, ProfileTable, QuantileFitter};
use crate::store::SampleStore;

/// Which fitting modes a run performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitModes {
    pub linear: bool,
    pub quantile: bool,
}

impl Default for FitModes {
    fn default() -> Self {
        Self {
            linear: true,
            quantile: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct ProfilingPipeline {
    pub misuse: MisuseFilter,
    pub cluster: ClusterFilter,
    pub intensity: IntensityExtractor,
    pub fitter: ProfileFitter,
    pub modes: FitModes,
}

/// Everything a run produced, kept for export and charts
#[derive(Debug, Clone, Serialize)]
pub struct ProfilingReport {
    pub cohort: AthleteCohort,

    /// Samples admitted at ingestion, before any filter
    #[serde(skip)]
    pub admitted: SampleStore,

    /// Samples left after both filters
    #[serde(skip)]
    pub cleaned: SampleStore,

    pub misuse: FlaggedSet,
    pub measurement: FlaggedSet,

    #[serde(skip)]
    pub high_intensity: HighIntensitySubset,

    pub linear: Option<BTreeMap<String, LinearProfile>>,
    pub quantile: Option<BTreeMap<String, QuantileProfile>>,
    pub warnings: Vec<FitWarning>,
}

impl ProfilingReport {
    /// Merged per-athlete rows; fails when no fitting mode ran
    pub fn profile_table(&self) -> Result<ProfileTable, ExportError> {
        ProfileTable::merge(self.linear.as_ref(), self.quantile.as_ref())
    }

    /// Athletes of the cohort with no high-intensity point, absent from
    /// every profile
    pub fn unprofiled_athletes(&self) -> Vec<&str> {
        self.cohort
            .iter()
            .filter(|athlete| !self.high_intensity.contains(athlete))
            .collect()
    }

    pub fn removed_count(&self) -> usize {
        self.misuse.len() + self.measurement.len()
    }
}

impl ProfilingPipeline {
    pub fn from_config(config: &AppConfig) -> Self {
        let regression = &config.regression;
        let fitter = ProfileFitter::new(
            LinearFitter {
                min_r_squared: regression.min_r_squared,
            },
            QuantileFitter {
                levels: regression.quantile_levels(),
                solver: regression.solver.solver(),
            },
        );

        Self {
            misuse: config.outliers.misuse_filter(),
            cluster: config.outliers.cluster_filter(),
            intensity: config.intensity.extractor(),
            fitter,
            modes: FitModes {
                linear: regression.linear,
                quantile: regression.quantile,
            },
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.fitter = self.fitter.with_progress(show_progress);
        self
    }

    /// Run both filters, high-intensity selection and the enabled fits.
    ///
    /// Each filter flags from the store it receives and returns a fresh
    /// retained store, so no stage observes a partially filtered set.
    pub fn run(&self, admitted: SampleStore) -> ProfilingReport {
        let cohort = admitted.cohort();
        info!(
            samples = admitted.len(),
            athletes = cohort.len(),
            "Profiling session"
        );

        let (after_misuse, misuse) = self.misuse.apply(&admitted);
        let (cleaned, measurement) = self.cluster.apply(&after_misuse);

        let high_intensity = self.intensity.extract(&cleaned);

        let mut warnings = Vec::new();
        let linear = self.modes.linear.then(|| {
            let (profiles, fit_warnings) = self.fitter.fit_linear(&high_intensity);
            warnings.extend(fit_warnings);
            profiles
        });
        let quantile = self.modes.quantile.then(|| {
            let (profiles, fit_warnings) = self.fitter.fit_quantile(&high_intensity);
            warnings.extend(fit_warnings);
            profiles
        });

        let report = ProfilingReport {
            cohort,
            admitted,
            cleaned,
            misuse,
            measurement,
            high_intensity,
            linear,
            quantile,
            warnings,
        };

        for athlete in report.unprofiled_athletes() {
            warn!(athlete, "No high-intensity points; athlete is not profiled");
        }
        info!(
            removed = report.removed_count(),
            warnings = report.warnings.len(),
            "Profiling complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Sample, SampleId};
    use chrono::NaiveDate;

    fn profile_store() -> SampleStore {
        let date = NaiveDate::from_ymd_opt(2023, 5, 3).unwrap();
        let samples = (0..60)
            .map(|i| {
                let speed = 0.5 + i as f64 * 0.14;
                Sample {
                    id: SampleId(i),
                    athlete: "A".to_string(),
                    timestamp: date.and_hms_opt(10, 0, 0).unwrap() + chrono::Duration::seconds(i as i64),
                    date,
                    speed,
                    acceleration: 7.0 - 0.8 * speed,
                }
            })
            .collect();
        SampleStore::admit(samples)
    }

    #[test]
    fn test_modes_can_be_disabled() {
        let mut config = AppConfig::default();
        config.regression.quantile = false;
        let report = ProfilingPipeline::from_config(&config).run(profile_store());

        assert!(report.linear.is_some());
        assert!(report.quantile.is_none());
        assert!(report.profile_table().is_ok());
    }

    #[test]
    fn test_no_mode_means_nothing_to_export() {
        let mut config = AppConfig::default();
        config.regression.linear = false;
        config.regression.quantile = false;
        let report = ProfilingPipeline::from_config(&config).run(profile_store());

        assert!(matches!(report.profile_table(), Err(ExportError::NothingToExport)));
    }

    #[test]
    fn test_clean_profile_is_recovered() {
        let report = ProfilingPipeline::default().run(profile_store());

        assert_eq!(report.removed_count(), 0);
        let linear = &report.linear.as_ref().unwrap()["A"];
        assert!((linear.a0().unwrap() - 7.0).abs() < 1e-6);
        assert!((linear.s0().unwrap() - 8.75).abs() < 1e-6);
        assert!(report.unprofiled_athletes().is_empty());
    }

    // Property-based tests using proptest
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_samples_partition_into_store_and_flagged_sets(
            readings in prop::collection::vec((0usize..3, 0.0f64..10.0, 0.0f64..12.0), 1..120)
        ) {
            let date = NaiveDate::from_ymd_opt(2023, 5, 3).unwrap();
            let samples: Vec<Sample> = readings
                .iter()
                .enumerate()
                .map(|(i, &(athlete, speed, acceleration))| Sample {
                    id: SampleId(i),
                    athlete: format!("P{}", athlete),
                    timestamp: date.and_hms_opt(9, 0, 0).unwrap() + chrono::Duration::seconds(i as i64),
                    date,
                    speed,
                    acceleration,
                })
                .collect();

            let mut config = AppConfig::default();
            config.regression.quantile = false;
            let report = ProfilingPipeline::from_config(&config).run(SampleStore::admit(samples));

            let kept = report.cleaned.ids();
            let misuse = report.misuse.ids();
            let measurement = report.measurement.ids();

            prop_assert!(kept.is_disjoint(&misuse));
            prop_assert!(kept.is_disjoint(&measurement));
            prop_assert!(misuse.is_disjoint(&measurement));
            prop_assert_eq!(kept.len() + misuse.len() + measurement.len(), report.admitted.len());
            prop_assert!(report.cleaned.samples().iter().all(|s| s.acceleration >= 0.0));
        }
    }
}

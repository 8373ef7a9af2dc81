//! Speed-acceleration profile fitting
//!
//! Both modes run per athlete over the high-intensity subset. Athletes are
//! fitted in parallel and collected into maps keyed by athlete identifier,
//! so the output order never depends on scheduling.

pub mod linear;
pub mod quantile;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use crate::error::ExportError;
use crate::intensity::HighIntensitySubset;
use crate::models::{AthleteProfile, FitWarning, LinearProfile, QuantileProfile};

pub use linear::{ordinary_least_squares, LinearFitter, OlsFit};
pub use quantile::{pinball_loss, ExactSolver, IrlsSolver, QuantileFitter, QuantileSolver, SolverKind};

#[derive(Debug, Default)]
pub struct ProfileFitter {
    pub linear: LinearFitter,
    pub quantile: QuantileFitter,

    /// Show a progress bar while fitting quantile families
    pub show_progress: bool,
}

impl ProfileFitter {
    pub fn new(linear: LinearFitter, quantile: QuantileFitter) -> Self {
        Self {
            linear,
            quantile,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Ordinary least-squares profile of every athlete in the subset
    pub fn fit_linear(
        &self,
        subset: &HighIntensitySubset,
    ) -> (BTreeMap<String, LinearProfile>, Vec<FitWarning>) {
        let athletes: Vec<_> = subset.iter().collect();

        let results: Vec<(LinearProfile, Option<FitWarning>)> = athletes
            .par_iter()
            .map(|(athlete, samples)| self.linear.fit(athlete, samples))
            .collect();

        let mut profiles = BTreeMap::new();
        let mut warnings = Vec::new();
        for (profile, warning) in results {
            warnings.extend(warning);
            profiles.insert(profile.athlete.clone(), profile);
        }

        info!(
            athletes = profiles.len(),
            trained = profiles.values().filter(|p| p.is_trained()).count(),
            "Linear profiles fitted"
        );
        (profiles, warnings)
    }

    /// Quantile-regression family of every athlete in the subset
    pub fn fit_quantile(
        &self,
        subset: &HighIntensitySubset,
    ) -> (BTreeMap<String, QuantileProfile>, Vec<FitWarning>) {
        let athletes: Vec<_> = subset.iter().collect();
        let progress = self.progress_bar(athletes.len());

        let results: Vec<(Option<QuantileProfile>, Vec<FitWarning>)> = athletes
            .par_iter()
            .map(|(athlete, samples)| {
                let result = self.quantile.fit(athlete, samples);
                progress.inc(1);
                result
            })
            .collect();
        progress.finish_and_clear();

        let mut profiles = BTreeMap::new();
        let mut warnings = Vec::new();
        for (profile, fit_warnings) in results {
            warnings.extend(fit_warnings);
            if let Some(profile) = profile {
                profiles.insert(profile.athlete.clone(), profile);
            }
        }

        info!(
            athletes = profiles.len(),
            levels = self.quantile.levels.len(),
            "Quantile profiles fitted"
        );
        (profiles, warnings)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} athletes ({msg})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message("quantile regression");
        pb
    }
}

/// Per-athlete profile rows merged from the modes that ran
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileTable {
    pub rows: Vec<AthleteProfile>,
}

impl ProfileTable {
    /// Merge linear and quantile results into one row per athlete, ordered
    /// by athlete identifier. Fails when neither mode has been run.
    pub fn merge(
        linear: Option<&BTreeMap<String, LinearProfile>>,
        quantile: Option<&BTreeMap<String, QuantileProfile>>,
    ) -> Result<Self, ExportError> {
        if linear.is_none() && quantile.is_none() {
            return Err(ExportError::NothingToExport);
        }

        let athletes: BTreeSet<&String> = linear
            .into_iter()
            .flat_map(|m| m.keys())
            .chain(quantile.into_iter().flat_map(|m| m.keys()))
            .collect();

        let rows = athletes
            .into_iter()
            .map(|athlete| AthleteProfile {
                athlete: athlete.clone(),
                linear: linear.and_then(|m| m.get(athlete)).cloned(),
                quantile: quantile.and_then(|m| m.get(athlete)).cloned(),
            })
            .collect();

        Ok(Self { rows })
    }

    /// Whether the linear mode contributed to this table
    pub fn has_linear(&self) -> bool {
        self.rows.iter().any(|r| r.linear.is_some())
    }

    pub fn has_quantile(&self) -> bool {
        self.rows.iter().any(|r| r.quantile.is_some())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

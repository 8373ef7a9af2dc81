use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Stable identity of a sample inside one loaded session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleId(pub usize);

/// One telemetry reading from a tracking sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Identity assigned at ingestion, in (athlete, timestamp) order
    pub id: SampleId,

    /// Athlete identifier as found in the Player column
    pub athlete: String,

    /// Reading time
    pub timestamp: NaiveDateTime,

    /// Calendar date of the reading (session day)
    pub date: NaiveDate,

    /// Speed in meters per second
    pub speed: f64,

    /// Acceleration in meters per second squared
    pub acceleration: f64,
}

/// Distinct athletes present in a loaded session, in identifier order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AthleteCohort(BTreeSet<String>);

impl AthleteCohort {
    pub fn from_samples<'a, I>(samples: I) -> Self
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        Self(samples.into_iter().map(|s| s.athlete.clone()).collect())
    }

    pub fn contains(&self, athlete: &str) -> bool {
        self.0.contains(athlete)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Why a sample was removed from the working set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Device worn or used incorrectly for a whole athlete-day
    Misuse,
    /// Sensor or positioning artifact isolated from the athlete's cloud
    Measurement,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Misuse => write!(f, "misuse"),
            ErrorKind::Measurement => write!(f, "measurement"),
        }
    }
}

/// A removed sample plus the evidence used to remove it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedSample {
    pub sample: Sample,

    /// Number of envelope hits on the same athlete-day (misuse only)
    pub flagged_count: Option<usize>,

    /// Clustering label, -1 for noise (measurement only)
    pub cluster_label: Option<i64>,
}

/// Samples removed by one filter, all of the same kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedSet {
    pub kind: ErrorKind,
    pub samples: Vec<FlaggedSample>,
}

impl FlaggedSet {
    pub fn empty(kind: ErrorKind) -> Self {
        Self {
            kind,
            samples: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Identities of every flagged sample
    pub fn ids(&self) -> BTreeSet<SampleId> {
        self.samples.iter().map(|f| f.sample.id).collect()
    }

    pub fn contains(&self, id: SampleId) -> bool {
        self.samples.iter().any(|f| f.sample.id == id)
    }

    pub fn for_athlete<'a>(&'a self, athlete: &'a str) -> impl Iterator<Item = &'a FlaggedSample> {
        self.samples.iter().filter(move |f| f.sample.athlete == athlete)
    }
}

/// A sample retained as representative of an athlete's peak effort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighIntensitySample {
    pub sample: Sample,

    /// Index of the speed bin, `floor(speed / dv)`
    pub speed_bin: i64,

    /// Dense rank of the acceleration inside its (athlete, bin), 1 = highest
    pub rank: usize,

    /// The athlete's maximum acceleration over all retained points
    pub max_acceleration: f64,

    /// Largest speed at which that maximum acceleration occurs
    pub speed_at_max_acceleration: f64,
}

/// Straight line `acceleration = intercept + slope * speed`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub intercept: f64,
    pub slope: f64,
}

impl Line {
    /// Theoretical maximum acceleration at zero speed
    pub fn a0(&self) -> f64 {
        self.intercept
    }

    /// Theoretical maximum speed at zero acceleration
    pub fn s0(&self) -> f64 {
        -self.intercept / self.slope
    }

    pub fn predict(&self, speed: f64) -> f64 {
        self.intercept + self.slope * speed
    }
}

/// Outcome of the ordinary least-squares fit for one athlete
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LinearModel {
    Trained(Line),
    /// Placeholder reported when the fit is unreliable
    Untrained,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearProfile {
    pub athlete: String,
    pub model: LinearModel,

    /// Coefficient of determination, absent when it cannot be computed
    pub r_squared: Option<f64>,

    pub n_points: usize,
}

impl LinearProfile {
    pub fn is_trained(&self) -> bool {
        matches!(self.model, LinearModel::Trained(_))
    }

    pub fn a0(&self) -> Option<f64> {
        match self.model {
            LinearModel::Trained(line) => Some(line.a0()),
            LinearModel::Untrained => None,
        }
    }

    pub fn s0(&self) -> Option<f64> {
        match self.model {
            LinearModel::Trained(line) => Some(line.s0()),
            LinearModel::Untrained => None,
        }
    }
}

/// Parameters derived from one quantile regression
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantileFit {
    pub q: f64,
    pub a0: f64,
    pub s0: f64,
}

/// Quantile-regression family for one athlete with its aggregates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileProfile {
    pub athlete: String,
    pub fits: Vec<QuantileFit>,
    pub mean_a0: f64,
    pub std_a0: f64,
    pub mean_s0: f64,
    pub std_s0: f64,
    pub n_points: usize,
}

/// Final per-athlete row, merged from whichever fitting modes ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthleteProfile {
    pub athlete: String,
    pub linear: Option<LinearProfile>,
    pub quantile: Option<QuantileProfile>,
}

/// Advisory conditions raised while fitting; the run continues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FitWarning {
    /// Linear fit R² at or below the quality gate
    PoorLinearFit { athlete: String, r_squared: f64 },
    /// Too few distinct speeds to fit a line at all
    InsufficientData { athlete: String, n_points: usize },
    /// The quantile solver produced no line for this level
    QuantileFitFailed { athlete: String, q: f64 },
}

impl FitWarning {
    pub fn athlete(&self) -> &str {
        match self {
            FitWarning::PoorLinearFit { athlete, .. }
            | FitWarning::InsufficientData { athlete, .. }
            | FitWarning::QuantileFitFailed { athlete, .. } => athlete,
        }
    }
}

impl fmt::Display for FitWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitWarning::PoorLinearFit { athlete, r_squared } => write!(
                f,
                "linear regression for {} is of poor quality (R² = {:.3}); check the data",
                athlete, r_squared
            ),
            FitWarning::InsufficientData { athlete, n_points } => write!(
                f,
                "not enough distinct speeds to fit {} ({} high-intensity points)",
                athlete, n_points
            ),
            FitWarning::QuantileFitFailed { athlete, q } => {
                write!(f, "quantile regression q={:.2} failed for {}", q, athlete)
            }
        }
    }
}

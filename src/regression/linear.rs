use tracing::{debug, warn};

use crate::models::{FitWarning, HighIntensitySample, Line, LinearModel, LinearProfile};

/// Ordinary least-squares line with its coefficient of determination
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OlsFit {
    pub line: Line,
    pub r_squared: f64,
}

/// Fit `y = intercept + slope * x` by least squares.
///
/// Returns `None` with fewer than two distinct x values. When all y values
/// are equal the line explains none of the (zero) variance and R² is 0.
pub fn ordinary_least_squares(points: &[(f64, f64)]) -> Option<OlsFit> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (sxx, sxy) = points.iter().fold((0.0, 0.0), |(sxx, sxy), (x, y)| {
        let dx = x - mean_x;
        (sxx + dx * dx, sxy + dx * (y - mean_y))
    });
    if sxx <= f64::EPSILON * n * (mean_x * mean_x).max(1.0) {
        return None;
    }

    let slope = sxy / sxx;
    let line = Line {
        intercept: mean_y - slope * mean_x,
        slope,
    };

    let (ss_res, ss_tot) = points.iter().fold((0.0, 0.0), |(res, tot), (x, y)| {
        let r = y - line.predict(*x);
        let d = y - mean_y;
        (res + r * r, tot + d * d)
    });
    let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

    Some(OlsFit { line, r_squared })
}

/// Linear-mode fitter with a quality gate on R²
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFitter {
    /// Fits with R² at or below this value are reported untrained
    pub min_r_squared: f64,
}

impl Default for LinearFitter {
    fn default() -> Self {
        Self { min_r_squared: 0.5 }
    }
}

impl LinearFitter {
    /// Fit one athlete. An unreliable fit yields the untrained placeholder
    /// and a warning; callers must check [`LinearProfile::is_trained`].
    pub fn fit(
        &self,
        athlete: &str,
        samples: &[HighIntensitySample],
    ) -> (LinearProfile, Option<FitWarning>) {
        let points: Vec<(f64, f64)> = samples
            .iter()
            .map(|h| (h.sample.speed, h.sample.acceleration))
            .collect();

        let untrained = |r_squared| LinearProfile {
            athlete: athlete.to_string(),
            model: LinearModel::Untrained,
            r_squared,
            n_points: points.len(),
        };

        let Some(fit) = ordinary_least_squares(&points) else {
            warn!(athlete, n_points = points.len(), "Not enough distinct speeds for a linear fit");
            let warning = FitWarning::InsufficientData {
                athlete: athlete.to_string(),
                n_points: points.len(),
            };
            return (untrained(None), Some(warning));
        };

        if fit.r_squared <= self.min_r_squared {
            warn!(
                athlete,
                r_squared = fit.r_squared,
                "Linear regression is of poor quality; check the data"
            );
            let warning = FitWarning::PoorLinearFit {
                athlete: athlete.to_string(),
                r_squared: fit.r_squared,
            };
            return (untrained(Some(fit.r_squared)), Some(warning));
        }

        debug!(
            athlete,
            a0 = fit.line.a0(),
            s0 = fit.line.s0(),
            r_squared = fit.r_squared,
            "Linear profile fitted"
        );
        let profile = LinearProfile {
            athlete: athlete.to_string(),
            model: LinearModel::Trained(fit.line),
            r_squared: Some(fit.r_squared),
            n_points: points.len(),
        };
        (profile, None)
    }
}

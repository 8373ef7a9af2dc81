//! Linear quantile regression of acceleration on speed
//!
//! Each level `q` minimises the pinball loss
//! `sum(rho_q(y - a - b x))`, `rho_q(u) = u (q - 1[u < 0])`. The numeric
//! routine sits behind [`QuantileSolver`] so solvers can be swapped without
//! touching the fitting pipeline.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::cmp::Ordering;
use tracing::debug;

use crate::models::{FitWarning, HighIntensitySample, Line, QuantileFit, QuantileProfile};

/// Numeric routine fitting one quantile line
pub trait QuantileSolver: Send + Sync {
    /// Fit the `q`-th conditional quantile line, `None` if it is not identifiable
    fn fit(&self, points: &[(f64, f64)], q: f64) -> Option<Line>;

    fn name(&self) -> &'static str;
}

/// Pinball (check) loss of a line over a point set
pub fn pinball_loss(points: &[(f64, f64)], line: &Line, q: f64) -> f64 {
    points
        .iter()
        .map(|&(x, y)| {
            let u = y - line.predict(x);
            if u < 0.0 {
                (q - 1.0) * u
            } else {
                q * u
            }
        })
        .sum()
}

/// Iteratively reweighted least squares.
///
/// Each pass solves a weighted least-squares problem with weights
/// `1 / |rho_q(residual)|`, residual magnitudes floored at `residual_floor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrlsSolver {
    pub max_iter: usize,
    pub tolerance: f64,
    pub residual_floor: f64,
}

impl Default for IrlsSolver {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            tolerance: 1e-6,
            residual_floor: 1e-6,
        }
    }
}

impl QuantileSolver for IrlsSolver {
    fn fit(&self, points: &[(f64, f64)], q: f64) -> Option<Line> {
        if points.len() < 2 {
            return None;
        }

        let mut weights = vec![1.0; points.len()];
        let mut beta = [1.0, 1.0];
        let mut diff = f64::INFINITY;
        let mut iterations = 0;

        while iterations < self.max_iter && diff > self.tolerance {
            iterations += 1;
            let previous = beta;

            let (mut s00, mut s01, mut s11, mut t0, mut t1) = (0.0, 0.0, 0.0, 0.0, 0.0);
            for (&(x, y), w) in points.iter().zip(&weights) {
                s00 += w;
                s01 += w * x;
                s11 += w * x * x;
                t0 += w * y;
                t1 += w * x * y;
            }
            let det = s00 * s11 - s01 * s01;
            if !det.is_finite() || det <= f64::EPSILON * s00 * s11 {
                return None;
            }
            beta = [(s11 * t0 - s01 * t1) / det, (s00 * t1 - s01 * t0) / det];

            for (&(x, y), w) in points.iter().zip(weights.iter_mut()) {
                let mut residual = y - beta[0] - beta[1] * x;
                if residual.abs() < self.residual_floor {
                    residual = self.residual_floor.copysign(residual);
                }
                let check = if residual < 0.0 {
                    q * residual
                } else {
                    (1.0 - q) * residual
                };
                *w = 1.0 / check.abs();
            }

            diff = (beta[0] - previous[0])
                .abs()
                .max((beta[1] - previous[1]).abs());
        }

        Some(Line {
            intercept: beta[0],
            slope: beta[1],
        })
    }

    fn name(&self) -> &'static str {
        "irls"
    }
}

/// Exact pinball-loss minimiser for a single predictor.
///
/// An optimal line always passes through at least one sample. For a line
/// pinned at sample `i`, the loss in the slope `b` is a weighted sum of
/// asymmetric absolute deviations around the pairwise slopes
/// `(y_j - y_i) / (x_j - x_i)`, minimised at a weighted quantile of them.
/// Trying every pivot costs O(n² log n).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExactSolver;

impl ExactSolver {
    fn best_slope_through(points: &[(f64, f64)], pivot: (f64, f64), q: f64) -> Option<f64> {
        let (xi, yi) = pivot;
        // (pairwise slope, weight); left derivative at -inf starts negative
        let mut knots: Vec<(f64, f64)> = Vec::with_capacity(points.len());
        let mut derivative = 0.0;
        for &(x, y) in points {
            let dx = x - xi;
            if dx == 0.0 {
                continue;
            }
            let weight = dx.abs();
            derivative -= if dx > 0.0 { weight * q } else { weight * (1.0 - q) };
            knots.push(((y - yi) / dx, weight));
        }
        if knots.is_empty() {
            return None;
        }

        knots.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        for &(slope, weight) in &knots {
            derivative += weight;
            if derivative >= 0.0 {
                return Some(slope);
            }
        }
        knots.last().map(|k| k.0)
    }
}

impl QuantileSolver for ExactSolver {
    fn fit(&self, points: &[(f64, f64)], q: f64) -> Option<Line> {
        let mut best: Option<(f64, Line)> = None;
        for &pivot in points {
            let Some(slope) = Self::best_slope_through(points, pivot, q) else {
                continue;
            };
            let line = Line {
                intercept: pivot.1 - slope * pivot.0,
                slope,
            };
            let loss = pinball_loss(points, &line, q);
            if best.map_or(true, |(best_loss, _)| loss < best_loss) {
                best = Some((loss, line));
            }
        }
        best.map(|(_, line)| line)
    }

    fn name(&self) -> &'static str {
        "exact"
    }
}

/// Solver selection as it appears in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    #[default]
    Irls,
    Exact,
}

impl SolverKind {
    pub fn solver(&self) -> Box<dyn QuantileSolver> {
        match self {
            SolverKind::Irls => Box::new(IrlsSolver::default()),
            SolverKind::Exact => Box::new(ExactSolver),
        }
    }
}

impl std::str::FromStr for SolverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "irls" => Ok(SolverKind::Irls),
            "exact" | "simplex" => Ok(SolverKind::Exact),
            _ => Err(format!("Invalid quantile solver: {}", s)),
        }
    }
}

/// Quantile-mode fitter: one line per level, aggregated into mean and
/// sample standard deviation of a0 and s0.
pub struct QuantileFitter {
    pub levels: Vec<f64>,
    pub solver: Box<dyn QuantileSolver>,
}

impl Default for QuantileFitter {
    fn default() -> Self {
        Self {
            levels: (5..=95).map(|k| k as f64 / 100.0).collect(),
            solver: Box::new(IrlsSolver::default()),
        }
    }
}

impl std::fmt::Debug for QuantileFitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuantileFitter")
            .field("levels", &self.levels.len())
            .field("solver", &self.solver.name())
            .finish()
    }
}

impl QuantileFitter {
    pub fn fit(
        &self,
        athlete: &str,
        samples: &[HighIntensitySample],
    ) -> (Option<QuantileProfile>, Vec<FitWarning>) {
        let points: Vec<(f64, f64)> = samples
            .iter()
            .map(|h| (h.sample.speed, h.sample.acceleration))
            .collect();

        let mut warnings = Vec::new();
        let mut fits = Vec::with_capacity(self.levels.len());
        for &q in &self.levels {
            match self.solver.fit(&points, q) {
                Some(line) => fits.push(QuantileFit {
                    q,
                    a0: line.a0(),
                    s0: line.s0(),
                }),
                None => warnings.push(FitWarning::QuantileFitFailed {
                    athlete: athlete.to_string(),
                    q,
                }),
            }
        }

        if fits.is_empty() {
            return (None, warnings);
        }

        let a0s: Vec<f64> = fits.iter().map(|f| f.a0).collect();
        let s0s: Vec<f64> = fits.iter().map(|f| f.s0).collect();
        let profile = QuantileProfile {
            athlete: athlete.to_string(),
            mean_a0: a0s.iter().mean(),
            std_a0: a0s.iter().std_dev(),
            mean_s0: s0s.iter().mean(),
            std_s0: s0s.iter().std_dev(),
            fits,
            n_points: points.len(),
        };

        debug!(
            athlete,
            solver = self.solver.name(),
            mean_a0 = profile.mean_a0,
            mean_s0 = profile.mean_s0,
            "Quantile profile fitted"
        );
        (Some(profile), warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noisy_profile() -> Vec<(f64, f64)> {
        // Deterministic scatter around a = 7 - 0.8 v
        (0..40)
            .map(|i| {
                let speed = 1.0 + i as f64 * 0.17;
                let noise = ((i * 37 % 11) as f64 - 5.0) * 0.06;
                (speed, 7.0 - 0.8 * speed + noise)
            })
            .collect()
    }

    #[test]
    fn test_solvers_recover_collinear_line() {
        let points: Vec<(f64, f64)> = (0..15).map(|i| (i as f64 * 0.5, 8.0 - i as f64 * 0.45)).collect();

        for solver in [SolverKind::Irls.solver(), SolverKind::Exact.solver()] {
            for q in [0.05, 0.5, 0.95] {
                let line = solver.fit(&points, q).unwrap();
                assert!((line.intercept - 8.0).abs() < 1e-6, "{} q={}", solver.name(), q);
                assert!((line.slope + 0.9).abs() < 1e-6, "{} q={}", solver.name(), q);
            }
        }
    }

    #[test]
    fn test_exact_median_ignores_single_outlier() {
        let mut points: Vec<(f64, f64)> = (0..9).map(|i| (i as f64, 6.0 - 0.5 * i as f64)).collect();
        points.push((4.5, 40.0));

        let line = ExactSolver.fit(&points, 0.5).unwrap();

        assert!((line.intercept - 6.0).abs() < 1e-9);
        assert!((line.slope + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_irls_loss_close_to_exact_optimum() {
        let points = noisy_profile();
        for q in [0.1, 0.5, 0.9] {
            let exact = ExactSolver.fit(&points, q).unwrap();
            let irls = IrlsSolver::default().fit(&points, q).unwrap();

            let exact_loss = pinball_loss(&points, &exact, q);
            let irls_loss = pinball_loss(&points, &irls, q);
            assert!(exact_loss <= irls_loss + 1e-9);
            assert!(irls_loss <= exact_loss * 1.05 + 1e-6);
        }
    }

    #[test]
    fn test_higher_quantile_lines_sit_higher() {
        let points = noisy_profile();
        let low = ExactSolver.fit(&points, 0.1).unwrap();
        let high = ExactSolver.fit(&points, 0.9).unwrap();
        let mid_speed = 4.0;
        assert!(high.predict(mid_speed) > low.predict(mid_speed));
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(ExactSolver.fit(&[(2.0, 1.0), (2.0, 3.0)], 0.5).is_none());
        assert!(IrlsSolver::default().fit(&[(2.0, 1.0)], 0.5).is_none());
    }

    #[test]
    fn test_default_fitter_has_91_levels() {
        let fitter = QuantileFitter::default();
        assert_eq!(fitter.levels.len(), 91);
        assert_eq!(fitter.levels[0], 0.05);
        assert_eq!(fitter.levels[90], 0.95);
    }

    #[test]
    fn test_solver_kind_parsing() {
        assert_eq!("IRLS".parse::<SolverKind>().unwrap(), SolverKind::Irls);
        assert_eq!("exact".parse::<SolverKind>().unwrap(), SolverKind::Exact);
        assert!("newton".parse::<SolverKind>().is_err());
    }
}

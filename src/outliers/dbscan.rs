//! Density-based spatial clustering (DBSCAN) over 2D points
//!
//! A point is *core* when at least `min_points` points (itself included) lie
//! within distance `eps`. Clusters grow from core points through their
//! neighborhoods; non-core points reached this way become *border* points of
//! the first cluster that reaches them, and everything else is *noise*.

use std::cmp::Ordering;

/// Cluster assignment of one point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterLabel {
    Noise,
    Cluster(usize),
}

impl ClusterLabel {
    pub fn is_noise(&self) -> bool {
        matches!(self, ClusterLabel::Noise)
    }

    /// Conventional numeric label, -1 for noise
    pub fn as_i64(&self) -> i64 {
        match self {
            ClusterLabel::Noise => -1,
            ClusterLabel::Cluster(id) => *id as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dbscan {
    pub eps: f64,
    pub min_points: usize,
}

impl Dbscan {
    pub fn new(eps: f64, min_points: usize) -> Self {
        Self { eps, min_points }
    }

    /// Label every point; output is index-aligned with `points`
    pub fn fit(&self, points: &[(f64, f64)]) -> Vec<ClusterLabel> {
        let neighborhoods = self.neighborhoods(points);
        let is_core: Vec<bool> = neighborhoods
            .iter()
            .map(|nb| nb.len() >= self.min_points)
            .collect();

        let mut labels: Vec<Option<ClusterLabel>> = vec![None; points.len()];
        let mut next_cluster = 0;

        for seed in 0..points.len() {
            if labels[seed].is_some() || !is_core[seed] {
                continue;
            }

            let cluster = ClusterLabel::Cluster(next_cluster);
            labels[seed] = Some(cluster);
            let mut frontier = vec![seed];

            // Only core points are pushed, so every popped point expands
            while let Some(point) = frontier.pop() {
                for &neighbor in &neighborhoods[point] {
                    if labels[neighbor].is_none() {
                        labels[neighbor] = Some(cluster);
                        if is_core[neighbor] {
                            frontier.push(neighbor);
                        }
                    }
                }
            }

            next_cluster += 1;
        }

        labels
            .into_iter()
            .map(|label| label.unwrap_or(ClusterLabel::Noise))
            .collect()
    }

    /// Indices within `eps` of each point (inclusive, point itself included).
    ///
    /// Points are swept in x order so each search stops once the x gap alone
    /// exceeds `eps`.
    fn neighborhoods(&self, points: &[(f64, f64)]) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..points.len()).collect();
        order.sort_by(|&a, &b| {
            points[a]
                .0
                .partial_cmp(&points[b].0)
                .unwrap_or(Ordering::Equal)
        });

        let eps_sq = self.eps * self.eps;
        let mut neighborhoods: Vec<Vec<usize>> = (0..points.len()).map(|i| vec![i]).collect();

        for (pos, &i) in order.iter().enumerate() {
            let (xi, yi) = points[i];
            for &j in &order[pos + 1..] {
                let (xj, yj) = points[j];
                let dx = xj - xi;
                if dx > self.eps {
                    break;
                }
                let dy = yj - yi;
                if dx * dx + dy * dy <= eps_sq {
                    neighborhoods[i].push(j);
                    neighborhoods[j].push(i);
                }
            }
        }

        neighborhoods
    }
}

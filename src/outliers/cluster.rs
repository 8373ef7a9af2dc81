use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::dbscan::Dbscan;
use crate::models::{ErrorKind, FlaggedSample, FlaggedSet, Sample};
use crate::store::SampleStore;

/// Flags readings isolated from the athlete's own speed-acceleration cloud
/// as measurement errors.
///
/// Only candidates with `acceleration >= candidate_offset - speed` are
/// clustered; the low-intensity corner of the plane is dense by nature and
/// never holds isolated artifacts worth the compute. Each athlete is
/// clustered on its own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterFilter {
    pub eps: f64,
    pub min_neighbors: usize,
    pub candidate_offset: f64,
}

impl Default for ClusterFilter {
    fn default() -> Self {
        Self {
            eps: 0.5,
            min_neighbors: 3,
            candidate_offset: 5.0,
        }
    }
}

impl ClusterFilter {
    pub fn is_candidate(&self, sample: &Sample) -> bool {
        sample.acceleration >= self.candidate_offset - sample.speed
    }

    pub fn identify(&self, store: &SampleStore) -> FlaggedSet {
        let mut candidates: BTreeMap<&str, Vec<&Sample>> = BTreeMap::new();
        for sample in store.samples().iter().filter(|s| self.is_candidate(s)) {
            candidates.entry(sample.athlete.as_str()).or_default().push(sample);
        }

        if candidates.is_empty() {
            debug!("No clustering candidates");
            return FlaggedSet::empty(ErrorKind::Measurement);
        }

        let dbscan = Dbscan::new(self.eps, self.min_neighbors);
        let groups: Vec<(&str, Vec<&Sample>)> = candidates.into_iter().collect();

        let mut flagged: Vec<FlaggedSample> = groups
            .par_iter()
            .flat_map_iter(|(athlete, samples)| {
                let points: Vec<(f64, f64)> =
                    samples.iter().map(|s| (s.speed, s.acceleration)).collect();
                let labels = dbscan.fit(&points);

                let noise: Vec<FlaggedSample> = samples
                    .iter()
                    .zip(labels)
                    .filter(|(_, label)| label.is_noise())
                    .map(|(sample, label)| FlaggedSample {
                        sample: (*sample).clone(),
                        flagged_count: None,
                        cluster_label: Some(label.as_i64()),
                    })
                    .collect();

                debug!(
                    athlete = *athlete,
                    candidates = samples.len(),
                    noise = noise.len(),
                    "Athlete clustered"
                );
                noise
            })
            .collect();
        flagged.sort_by_key(|f| f.sample.id);

        FlaggedSet {
            kind: ErrorKind::Measurement,
            samples: flagged,
        }
    }

    /// Flag from the current snapshot, then return the retained store and the removed set
    pub fn apply(&self, store: &SampleStore) -> (SampleStore, FlaggedSet) {
        let flagged = self.identify(store);
        info!(removed = flagged.len(), "Measurement errors identified");
        (store.without(&flagged), flagged)
    }
}

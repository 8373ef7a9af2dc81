//! Working set of cleaned samples
//!
//! The store never mutates a sample. Filters compute a [`FlaggedSet`] from a
//! borrowed snapshot and the pipeline then builds a fresh store without
//! those identities, so every stage's removals stay auditable.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::models::{AthleteCohort, FlaggedSet, Sample, SampleId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleStore {
    samples: Vec<Sample>,
}

impl SampleStore {
    /// Admit loaded samples, silently discarding those that cannot be profiled:
    /// negative acceleration (deceleration phases), negative speed and
    /// non-finite values.
    pub fn admit(samples: Vec<Sample>) -> Self {
        let total = samples.len();
        let samples: Vec<Sample> = samples
            .into_iter()
            .filter(|s| {
                s.speed.is_finite()
                    && s.acceleration.is_finite()
                    && s.speed >= 0.0
                    && s.acceleration >= 0.0
            })
            .collect();

        debug!(
            admitted = samples.len(),
            discarded = total - samples.len(),
            "Samples admitted to store"
        );

        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn contains(&self, id: SampleId) -> bool {
        self.samples.iter().any(|s| s.id == id)
    }

    pub fn ids(&self) -> BTreeSet<SampleId> {
        self.samples.iter().map(|s| s.id).collect()
    }

    pub fn cohort(&self) -> AthleteCohort {
        AthleteCohort::from_samples(&self.samples)
    }

    /// Partition samples by athlete, keeping ingestion order inside each group
    pub fn by_athlete(&self) -> BTreeMap<&str, Vec<&Sample>> {
        let mut groups: BTreeMap<&str, Vec<&Sample>> = BTreeMap::new();
        for sample in &self.samples {
            groups.entry(sample.athlete.as_str()).or_default().push(sample);
        }
        groups
    }

    /// Build the retained set left after removing a filter's flags
    pub fn without(&self, flagged: &FlaggedSet) -> SampleStore {
        if flagged.is_empty() {
            return self.clone();
        }
        let removed = flagged.ids();
        SampleStore {
            samples: self
                .samples
                .iter()
                .filter(|s| !removed.contains(&s.id))
                .cloned()
                .collect(),
        }
    }
}

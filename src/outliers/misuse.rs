use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::models::{ErrorKind, FlaggedSample, FlaggedSet, Sample};
use crate::store::SampleStore;

/// Physiological ceiling on acceleration as a linear function of speed.
///
/// The defaults (10.93 m/s² at rest, reaching zero at 10.5 m/s) sit at mean
/// plus three standard deviations of published elite sprint profiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlausibilityEnvelope {
    pub max_acceleration: f64,
    pub max_speed: f64,
}

impl Default for PlausibilityEnvelope {
    fn default() -> Self {
        Self {
            max_acceleration: 10.93,
            max_speed: 10.5,
        }
    }
}

impl PlausibilityEnvelope {
    pub fn ceiling(&self, speed: f64) -> f64 {
        self.max_acceleration - self.max_acceleration / self.max_speed * speed
    }

    /// True when the reading sits on or above the ceiling
    pub fn is_exceeded(&self, sample: &Sample) -> bool {
        sample.acceleration >= self.ceiling(sample.speed)
    }
}

/// Detects athlete-days dominated by implausible readings (device misuse)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MisuseFilter {
    pub envelope: PlausibilityEnvelope,

    /// Envelope hits needed on one athlete-day before the day's hits are removed
    pub nb_outlier: usize,
}

impl Default for MisuseFilter {
    fn default() -> Self {
        Self {
            envelope: PlausibilityEnvelope::default(),
            nb_outlier: 10,
        }
    }
}

impl MisuseFilter {
    /// Flag every envelope hit on athlete-days with at least `nb_outlier` hits.
    /// Hits on quieter days are tolerated as sensor noise and stay in the store.
    pub fn identify(&self, store: &SampleStore) -> FlaggedSet {
        let mut hits_by_day: BTreeMap<(&str, NaiveDate), Vec<&Sample>> = BTreeMap::new();
        for sample in store.samples() {
            if self.envelope.is_exceeded(sample) {
                hits_by_day
                    .entry((sample.athlete.as_str(), sample.date))
                    .or_default()
                    .push(sample);
            }
        }

        let mut flagged = Vec::new();
        for ((athlete, date), hits) in hits_by_day {
            if hits.len() < self.nb_outlier {
                debug!(athlete, %date, hits = hits.len(), "Envelope hits below misuse threshold");
                continue;
            }

            debug!(athlete, %date, hits = hits.len(), "Athlete-day confirmed as misuse");
            let count = hits.len();
            flagged.extend(hits.into_iter().map(|sample| FlaggedSample {
                sample: sample.clone(),
                flagged_count: Some(count),
                cluster_label: None,
            }));
        }
        flagged.sort_by_key(|f| f.sample.id);

        FlaggedSet {
            kind: ErrorKind::Misuse,
            samples: flagged,
        }
    }

    /// Flag from the current snapshot, then return the retained store and the removed set
    pub fn apply(&self, store: &SampleStore) -> (SampleStore, FlaggedSet) {
        let flagged = self.identify(store);
        info!(removed = flagged.len(), "Misuse errors identified");
        (store.without(&flagged), flagged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SampleId;

    fn day_with_hits(athlete: &str, day: u32, hits: usize, first_id: usize) -> Vec<Sample> {
        let date = NaiveDate::from_ymd_opt(2023, 6, day).unwrap();
        let mut samples: Vec<Sample> = (0..hits)
            .map(|i| Sample {
                id: SampleId(first_id + i),
                athlete: athlete.to_string(),
                timestamp: date.and_hms_opt(9, 0, i as u32).unwrap(),
                date,
                speed: 6.0,
                acceleration: 9.0,
            })
            .collect();
        // One plausible reading on the same day
        samples.push(Sample {
            id: SampleId(first_id + hits),
            athlete: athlete.to_string(),
            timestamp: date.and_hms_opt(9, 30, 0).unwrap(),
            date,
            speed: 6.0,
            acceleration: 1.0,
        });
        samples
    }

    #[test]
    fn test_envelope_boundary() {
        let envelope = PlausibilityEnvelope::default();
        assert!((envelope.ceiling(0.0) - 10.93).abs() < 1e-12);
        assert!(envelope.ceiling(10.5).abs() < 1e-12);

        let date = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let mut sample = Sample {
            id: SampleId(0),
            athlete: "A".to_string(),
            timestamp: date.and_hms_opt(0, 0, 0).unwrap(),
            date,
            speed: 0.0,
            acceleration: 10.93,
        };
        assert!(envelope.is_exceeded(&sample));
        sample.acceleration = 10.9;
        assert!(!envelope.is_exceeded(&sample));
    }

    #[test]
    fn test_day_at_threshold_is_removed() {
        let store = SampleStore::admit(day_with_hits("A", 1, 10, 0));
        let (cleaned, flagged) = MisuseFilter::default().apply(&store);

        assert_eq!(flagged.len(), 10);
        assert_eq!(flagged.kind, ErrorKind::Misuse);
        assert!(flagged.samples.iter().all(|f| f.flagged_count == Some(10)));
        assert_eq!(cleaned.len(), 1);
    }

    #[test]
    fn test_day_below_threshold_is_kept() {
        let store = SampleStore::admit(day_with_hits("A", 1, 9, 0));
        let (cleaned, flagged) = MisuseFilter::default().apply(&store);

        assert!(flagged.is_empty());
        assert_eq!(cleaned, store);
    }

    #[test]
    fn test_threshold_is_per_athlete_day() {
        let mut samples = day_with_hits("A", 1, 6, 0);
        samples.extend(day_with_hits("A", 2, 6, 100));
        samples.extend(day_with_hits("B", 1, 12, 200));
        let store = SampleStore::admit(samples);

        let flagged = MisuseFilter::default().identify(&store);

        assert_eq!(flagged.len(), 12);
        assert!(flagged.samples.iter().all(|f| f.sample.athlete == "B"));
    }
}

//! Session file ingestion
//!
//! Normalises a device export into admitted [`Sample`]s: column aliases,
//! optional km/h conversion, per-athlete ordering, optional acceleration
//! recomputation from speed, and the schema and unit checks that abort a
//! run before any filtering.

pub mod csv;
pub mod validation;

use std::path::Path;
use tracing::{debug, info};

use crate::config::InputSettings;
use crate::error::{ImportError, Result};
use crate::models::{Sample, SampleId};
use crate::store::SampleStore;
use self::csv::{RawReading, SessionCsvReader};
use self::validation::SessionValidator;

/// Reading options for a session file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadOptions {
    pub delimiter: u8,
    pub convert_speed: bool,
    pub keep_acceleration: bool,
    pub max_speed_p99: f64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::from(&InputSettings::default())
    }
}

impl From<&InputSettings> for LoadOptions {
    fn from(settings: &InputSettings) -> Self {
        Self {
            delimiter: settings.delimiter as u8,
            convert_speed: settings.convert_speed,
            keep_acceleration: settings.keep_acceleration,
            max_speed_p99: settings.max_speed_p99,
        }
    }
}

pub struct SessionLoader {
    options: LoadOptions,
    reader: SessionCsvReader,
}

impl SessionLoader {
    pub fn new(options: LoadOptions) -> Self {
        Self {
            reader: SessionCsvReader::new(options.delimiter),
            options,
        }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Session name used for result file names: the file stem
    pub fn session_name(file_path: &Path) -> String {
        file_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session".to_string())
    }

    /// Load, validate and admit a session file
    pub fn load(&self, file_path: &Path) -> Result<SampleStore> {
        info!(path = %file_path.display(), "Loading session");

        let mut readings = self.reader.read(file_path, self.options.keep_acceleration)?;
        if readings.is_empty() {
            return Err(ImportError::Empty {
                path: file_path.to_path_buf(),
            }
            .into());
        }

        if self.options.convert_speed {
            for reading in &mut readings {
                reading.speed /= 3.6;
            }
        }

        // Stable sort keeps file order for duplicate timestamps
        readings.sort_by(|a, b| {
            a.athlete
                .cmp(&b.athlete)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });

        if !self.options.keep_acceleration {
            recompute_acceleration(&mut readings);
        }

        let speeds: Vec<f64> = readings.iter().map(|r| r.speed).collect();
        SessionValidator::check_speed_units(&speeds, self.options.max_speed_p99)?;

        let total = readings.len();
        let samples: Vec<Sample> = readings
            .into_iter()
            .enumerate()
            .filter_map(|(i, reading)| {
                let acceleration = reading.acceleration?;
                Some(Sample {
                    id: SampleId(i),
                    date: reading.date.unwrap_or_else(|| reading.timestamp.date()),
                    athlete: reading.athlete,
                    timestamp: reading.timestamp,
                    speed: reading.speed,
                    acceleration,
                })
            })
            .collect();
        debug!(
            readings = total,
            without_acceleration = total - samples.len(),
            "Session readings parsed"
        );

        let store = SampleStore::admit(samples);
        if store.is_empty() {
            return Err(ImportError::Empty {
                path: file_path.to_path_buf(),
            }
            .into());
        }

        info!(
            samples = store.len(),
            athletes = store.cohort().len(),
            "Session loaded"
        );
        Ok(store)
    }
}

/// Replace acceleration by the discrete derivative of speed within each
/// athlete. Readings must be sorted by (athlete, timestamp). The first
/// reading of an athlete and readings with no elapsed time get none.
pub fn recompute_acceleration(readings: &mut [RawReading]) {
    let mut previous: Option<(String, chrono::NaiveDateTime, f64)> = None;

    for reading in readings.iter_mut() {
        reading.acceleration = match &previous {
            Some((athlete, timestamp, speed)) if *athlete == reading.athlete => {
                let elapsed = (reading.timestamp - *timestamp)
                    .num_microseconds()
                    .map(|us| us as f64 / 1e6)
                    .unwrap_or(0.0);
                if elapsed > 0.0 {
                    Some((reading.speed - speed) / elapsed)
                } else {
                    None
                }
            }
            _ => None,
        };
        previous = Some((reading.athlete.clone(), reading.timestamp, reading.speed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn reading(athlete: &str, tenths: u32, speed: f64) -> RawReading {
        RawReading {
            athlete: athlete.to_string(),
            timestamp: NaiveDate::from_ymd_opt(2023, 5, 3)
                .unwrap()
                .and_hms_milli_opt(10, 0, tenths / 10, (tenths % 10) * 100)
                .unwrap(),
            date: None,
            speed,
            acceleration: Some(99.0),
        }
    }

    #[test]
    fn test_recompute_stays_within_athlete() {
        let mut readings = vec![
            reading("A", 0, 1.0),
            reading("A", 1, 1.5),
            reading("A", 3, 1.7),
            reading("B", 4, 5.0),
            reading("B", 5, 5.2),
        ];

        recompute_acceleration(&mut readings);

        assert_eq!(readings[0].acceleration, None);
        assert!((readings[1].acceleration.unwrap() - 5.0).abs() < 1e-9);
        assert!((readings[2].acceleration.unwrap() - 1.0).abs() < 1e-9);
        // No derivative across the athlete boundary
        assert_eq!(readings[3].acceleration, None);
        assert!((readings[4].acceleration.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_timestamp_has_no_acceleration() {
        let mut readings = vec![reading("A", 0, 1.0), reading("A", 0, 1.2)];
        recompute_acceleration(&mut readings);
        assert_eq!(readings[1].acceleration, None);
    }

    #[test]
    fn test_session_name_is_file_stem() {
        assert_eq!(
            SessionLoader::session_name(Path::new("data/Session_example.csv")),
            "Session_example"
        );
    }
}

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::path::Path;

use super::validation::{SessionValidator, ACCELERATION, DATE, PLAYER, SPEED, TIMESTAMP};
use crate::error::{ImportError, ProfilerError, Result, ValidationError};

/// One parsed row before unit conversion and acceleration recomputation
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    pub athlete: String,
    pub timestamp: NaiveDateTime,
    pub date: Option<NaiveDate>,
    pub speed: f64,
    pub acceleration: Option<f64>,
}

/// Session file reader with flexible column mapping
pub struct SessionCsvReader {
    column_mapping: HashMap<String, String>,
    delimiter: u8,
}

impl SessionCsvReader {
    pub fn new(delimiter: u8) -> Self {
        let mut column_mapping = HashMap::new();

        // Column name variations across tracking devices
        Self::add_mapping(
            &mut column_mapping,
            PLAYER,
            &["player", "player_name", "athlete", "athlete_id", "name"],
        );
        Self::add_mapping(
            &mut column_mapping,
            TIMESTAMP,
            &["timestamp", "time", "datetime", "date_time", "utc_time"],
        );
        Self::add_mapping(&mut column_mapping, DATE, &["date", "day", "session_date"]);
        Self::add_mapping(
            &mut column_mapping,
            SPEED,
            &["speed", "velocity", "speed_ms", "speed_kmh", "vitesse"],
        );
        Self::add_mapping(
            &mut column_mapping,
            ACCELERATION,
            &["acceleration", "accel", "acc", "acceleration_ms2"],
        );

        Self {
            column_mapping,
            delimiter,
        }
    }

    fn add_mapping(mapping: &mut HashMap<String, String>, standard: &str, variations: &[&str]) {
        for variation in variations {
            mapping.insert(variation.to_lowercase(), standard.to_string());
        }
    }

    pub fn normalize_column_name(&self, name: &str) -> String {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");

        self.column_mapping
            .get(&normalized)
            .cloned()
            .unwrap_or(normalized)
    }

    pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
        let formats = [
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%SZ",
            "%Y-%m-%dT%H:%M:%S%.fZ",
            "%d/%m/%Y %H:%M:%S",
            "%d/%m/%Y %H:%M:%S%.f",
            "%Y/%m/%d %H:%M:%S%.f",
        ];

        for format in &formats {
            if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
                return Some(dt);
            }
        }

        // Seconds since epoch, possibly fractional
        let seconds = parse_number(value)?;
        let whole = seconds.floor();
        let nanos = ((seconds - whole) * 1e9).round() as u32;
        DateTime::from_timestamp(whole as i64, nanos.min(999_999_999)).map(|dt| dt.naive_utc())
    }

    pub fn parse_date(value: &str) -> Option<NaiveDate> {
        ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"]
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
    }

    /// Read every row of a session file.
    ///
    /// Rows with an empty speed (or an empty acceleration when
    /// `keep_acceleration` is set) are skipped; any other unparseable value
    /// is an error.
    pub fn read(&self, file_path: &Path, keep_acceleration: bool) -> Result<Vec<RawReading>> {
        if !file_path.exists() {
            return Err(ImportError::FileNotFound {
                path: file_path.to_path_buf(),
            }
            .into());
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .from_path(file_path)
            .map_err(ImportError::from)?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(ImportError::from)?
            .iter()
            .map(|h| self.normalize_column_name(h))
            .collect();
        SessionValidator::check_columns(&headers, keep_acceleration)?;

        let index = |name: &str| headers.iter().position(|h| h == name);
        let required = |name: &str| {
            index(name).ok_or_else(|| {
                ProfilerError::from(ValidationError::MissingColumns {
                    columns: vec![name.to_string()],
                })
            })
        };
        let player = required(PLAYER)?;
        let timestamp = required(TIMESTAMP)?;
        let speed = required(SPEED)?;
        let date = index(DATE);
        let acceleration = if keep_acceleration {
            index(ACCELERATION)
        } else {
            None
        };

        let mut readings = Vec::new();
        for (row, result) in reader.records().enumerate() {
            let record = result.map_err(ImportError::from)?;
            let field = |i: usize| record.get(i).unwrap_or("");
            let invalid = |column: &str, value: &str| -> ProfilerError {
                ImportError::InvalidValue {
                    column: column.to_string(),
                    row: row + 1,
                    value: value.to_string(),
                }
                .into()
            };

            let speed_value = field(speed);
            if speed_value.is_empty() {
                continue;
            }
            let speed_value = parse_number(speed_value).ok_or_else(|| invalid(SPEED, speed_value))?;

            let acceleration_value = match acceleration {
                Some(i) if field(i).is_empty() => continue,
                Some(i) => {
                    Some(parse_number(field(i)).ok_or_else(|| invalid(ACCELERATION, field(i)))?)
                }
                None => None,
            };

            let athlete = field(player);
            if athlete.is_empty() {
                return Err(invalid(PLAYER, athlete));
            }

            let timestamp_value = Self::parse_datetime(field(timestamp))
                .ok_or_else(|| invalid(TIMESTAMP, field(timestamp)))?;

            let date_value = match date.map(field) {
                Some(value) if !value.is_empty() => {
                    Some(Self::parse_date(value).ok_or_else(|| invalid(DATE, value))?)
                }
                _ => None,
            };

            readings.push(RawReading {
                athlete: athlete.to_string(),
                timestamp: timestamp_value,
                date: date_value,
                speed: speed_value,
                acceleration: acceleration_value,
            });
        }

        Ok(readings)
    }
}

/// Parse a number, accepting a decimal comma (`"3,5"`)
pub fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    value
        .parse::<f64>()
        .ok()
        .or_else(|| value.replace(',', ".").parse::<f64>().ok())
}

use tracing::debug;

use crate::error::ValidationError;

/// Standard column names the pipeline requires after normalisation
pub const PLAYER: &str = "player";
pub const TIMESTAMP: &str = "timestamp";
pub const DATE: &str = "date";
pub const SPEED: &str = "speed";
pub const ACCELERATION: &str = "acceleration";

/// Schema and unit checks applied to a session before any filtering
pub struct SessionValidator;

impl SessionValidator {
    /// Fail when a required column is missing. Acceleration is only required
    /// when the device channel is kept; otherwise it is derived from speed.
    pub fn check_columns(columns: &[String], keep_acceleration: bool) -> Result<(), ValidationError> {
        let mut required = vec![PLAYER, TIMESTAMP, SPEED];
        if keep_acceleration {
            required.push(ACCELERATION);
        }

        let missing: Vec<String> = required
            .into_iter()
            .filter(|name| !columns.iter().any(|c| c == name))
            .map(display_name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingColumns { columns: missing })
        }
    }

    /// Reject speed data whose 99th percentile exceeds `limit` m/s, the
    /// signature of data recorded in km/h. Returns the percentile.
    pub fn check_speed_units(speeds: &[f64], limit: f64) -> Result<f64, ValidationError> {
        let Some(p99) = percentile(speeds, 0.99) else {
            return Ok(0.0);
        };
        debug!(p99, limit, "Speed unit check");

        if p99 > limit {
            return Err(ValidationError::SpeedUnits { p99, limit });
        }
        Ok(p99)
    }
}

/// Percentile with linear interpolation between closest ranks; non-finite
/// values are ignored.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let position = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

fn display_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_missing_columns_are_reported() {
        let err = SessionValidator::check_columns(&columns(&["player", "speed"]), true).unwrap_err();
        match err {
            ValidationError::MissingColumns { columns } => {
                assert_eq!(columns, vec!["Timestamp".to_string(), "Acceleration".to_string()]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_acceleration_optional_when_recomputed() {
        let found = columns(&["player", "timestamp", "speed"]);
        assert!(SessionValidator::check_columns(&found, false).is_ok());
        assert!(SessionValidator::check_columns(&found, true).is_err());
    }

    #[test]
    fn test_percentile_interpolates() {
        let values: Vec<f64> = (0..=100).map(|v| v as f64).collect();
        assert_eq!(percentile(&values, 0.99), Some(99.0));
        assert_eq!(percentile(&[1.0, 2.0], 0.5), Some(1.5));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn test_speed_in_kmh_is_rejected() {
        let kmh: Vec<f64> = (0..200).map(|i| i as f64 * 0.15).collect();
        assert!(matches!(
            SessionValidator::check_speed_units(&kmh, 10.0),
            Err(ValidationError::SpeedUnits { .. })
        ));

        let ms: Vec<f64> = kmh.iter().map(|v| v / 3.6).collect();
        assert!(SessionValidator::check_speed_units(&ms, 10.0).is_ok());
    }
}

use std::io::Write;
use std::path::Path;

use crate::error::ExportError;

/// Export any serializable data structure to JSON
pub fn export_json<T, P>(data: &T, output_path: P) -> Result<(), ExportError>
where
    T: serde::Serialize,
    P: AsRef<Path>,
{
    let json_data = serde_json::to_string_pretty(data)
        .map_err(|e| ExportError::Serialization(e.to_string()))?;

    let mut file = std::fs::File::create(output_path)?;
    file.write_all(json_data.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuantileFit;
    use tempfile::NamedTempFile;

    #[test]
    fn test_export_json() {
        let fits = vec![QuantileFit {
            q: 0.5,
            a0: 7.8,
            s0: 9.1,
        }];
        let temp_file = NamedTempFile::new().unwrap();

        export_json(&fits, temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        let parsed: Vec<QuantileFit> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, fits);
    }
}

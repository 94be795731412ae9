use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ExportError;
use crate::tsne::N_COMPONENTS;

/// 2D projection of every node, for use outside the plot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionExport {
    pub ids: Vec<String>,
    pub labels: Vec<String>,
    /// `points[i]` is the projected position of `ids[i]`
    pub points: Vec<[f64; N_COMPONENTS]>,
    pub perplexity: f64,
    pub seed: u64,
    pub kl_divergence: f64,
}

impl ProjectionExport {
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ExportError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|source| ExportError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, ExportError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ExportError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample() -> ProjectionExport {
        ProjectionExport {
            ids: vec!["CID1".to_string(), "PROT1".to_string()],
            labels: vec!["Chemical".to_string(), "Protein".to_string()],
            points: vec![[1.5, -2.0], [0.0, 3.25]],
            perplexity: 1.0,
            seed: 42,
            kl_divergence: 0.125,
        }
    }

    #[test]
    fn test_projection_save_load() {
        let original = sample();
        let temp_file = NamedTempFile::new().unwrap();

        original.save_json(temp_file.path()).unwrap();
        let loaded = ProjectionExport::load_json(temp_file.path()).unwrap();

        assert_eq!(loaded, original);
    }

    #[test]
    fn test_projection_json_format() {
        let json = serde_json::to_string_pretty(&sample()).unwrap();
        assert!(json.contains("\"seed\": 42"));
        assert!(json.contains("\"ids\""));
        assert!(json.contains("\"Chemical\""));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ProjectionExport::load_json("/no/such/projection.json").unwrap_err();
        assert!(matches!(err, ExportError::Io { .. }));
        assert!(err.to_string().contains("/no/such/projection.json"));
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"{\"ids\": [\"CID1\"]").unwrap();

        let err = ProjectionExport::load_json(temp_file.path()).unwrap_err();
        assert!(matches!(err, ExportError::Json { .. }));
    }

    #[test]
    fn test_save_into_missing_directory_is_io_error() {
        let err = sample()
            .save_json("/no/such/dir/projection.json")
            .unwrap_err();
        assert!(matches!(err, ExportError::Io { .. }));
    }
}

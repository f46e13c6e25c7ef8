//! Constraint subsystem configuration.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConstraintError;

/// Constraint subsystem configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConstraintConfig {
    /// Upper bound of bytes a single decode may take from its region
    pub region_limit: usize,
    /// Size of each region chunk in bytes
    pub region_chunk_size: usize,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            region_limit: usize::MAX,
            region_chunk_size: 4096,
        }
    }
}

impl ConstraintConfig {
    /// Loads configuration from a JSON file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConstraintError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConstraintError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Parses configuration from a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, ConstraintError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| ConstraintError::SerializationError(e.to_string()))?;
        if config.region_chunk_size == 0 {
            return Err(ConstraintError::SerializationError(
                "region_chunk_size must be > 0".to_string(),
            ));
        }
        Ok(config)
    }
}

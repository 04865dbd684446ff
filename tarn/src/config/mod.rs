//! Runtime configuration for Tarn
//!
//! All fields have defaults, so an empty TOML document is a valid config.
//!
//! ```toml
//! max_call_depth = 64
//! intern_prune_threshold = 4096
//! drain_launched_tasks = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid runtime config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of nested closure invocations per logical thread.
    pub max_call_depth: usize,
    /// Number of intern-table insertions between sweeps of dead entries.
    pub intern_prune_threshold: usize,
    /// Keep running launched-but-unawaited tasks after the root value is produced.
    pub drain_launched_tasks: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_call_depth: 128,
            intern_prune_threshold: 1024,
            drain_launched_tasks: true,
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_document_uses_defaults() {
        assert_eq!(
            RuntimeConfig::from_toml_str("").unwrap(),
            RuntimeConfig::default()
        );
    }

    #[test]
    fn test_partial_document() {
        let config = RuntimeConfig::from_toml_str("max_call_depth = 16\n").unwrap();
        assert_eq!(config.max_call_depth, 16);
        assert_eq!(config.intern_prune_threshold, 1024);
        assert!(config.drain_launched_tasks);
    }

    #[test]
    fn test_rejects_wrong_types() {
        assert!(matches!(
            RuntimeConfig::from_toml_str("max_call_depth = \"deep\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = RuntimeConfig::from_file("/nonexistent/tarn.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/tarn.toml"));
    }
}

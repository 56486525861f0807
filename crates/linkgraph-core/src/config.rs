//! Store configuration.
//!
//! Selects the backend and its tuning knobs. Loaded from TOML:
//!
//! ```toml
//! backend = "sqlite"
//! path = "linkgraph.db"
//! busy_timeout_ms = 5000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Default wait on a locked SQLite database before a call fails.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Which backend to open, with its backend-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BackendConfig {
    #[default]
    Memory,
    Sqlite {
        /// Database file. Created if missing.
        path: PathBuf,
        #[serde(default = "default_busy_timeout_ms")]
        busy_timeout_ms: u64,
    },
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Top-level store configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(flatten)]
    pub backend: BackendConfig,
}

impl StoreConfig {
    /// Configuration for a SQLite database at `path` with default tuning.
    #[must_use]
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendConfig::Sqlite {
                path: path.into(),
                busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            },
        }
    }

    /// Parse configuration from a TOML document. A document without a
    /// `backend` key selects the in-memory backend.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Config`] if the document is malformed or names
    /// an unknown backend.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut table: toml::Table =
            toml::from_str(s).map_err(|e| GraphError::Config(e.to_string()))?;
        table
            .entry("backend")
            .or_insert_with(|| toml::Value::String("memory".into()));
        toml::Value::Table(table)
            .try_into()
            .map_err(|e| GraphError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Io`] if the file cannot be read, or
    /// [`GraphError::Config`] if it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Lock wait deadline for backends that block on I/O.
    #[must_use]
    pub fn busy_timeout(&self) -> Option<Duration> {
        match self.backend {
            BackendConfig::Memory => None,
            BackendConfig::Sqlite {
                busy_timeout_ms, ..
            } => Some(Duration::from_millis(busy_timeout_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_selects_memory_backend() {
        assert_eq!(StoreConfig::from_toml_str("").unwrap(), StoreConfig::default());
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        let err = StoreConfig::from_toml_str("backend = ").unwrap_err();
        assert!(matches!(err, GraphError::Config(_)));
    }

    #[test]
    fn parses_memory_backend() {
        let cfg = StoreConfig::from_toml_str("backend = \"memory\"").unwrap();
        assert_eq!(cfg.backend, BackendConfig::Memory);
        assert_eq!(cfg.busy_timeout(), None);
    }

    #[test]
    fn parses_sqlite_backend_with_default_timeout() {
        let cfg = StoreConfig::from_toml_str(
            r#"
            backend = "sqlite"
            path = "/var/lib/linkgraph/graph.db"
            "#,
        )
        .unwrap();
        assert_eq!(cfg, StoreConfig::sqlite("/var/lib/linkgraph/graph.db"));
        assert_eq!(
            cfg.busy_timeout(),
            Some(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
        );
    }

    #[test]
    fn unknown_backend_is_a_config_error() {
        let err = StoreConfig::from_toml_str("backend = \"cockroach\"").unwrap_err();
        assert!(matches!(err, GraphError::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linkgraph.toml");
        std::fs::write(
            &path,
            "backend = \"sqlite\"\npath = \"graph.db\"\nbusy_timeout_ms = 250\n",
        )
        .unwrap();

        let cfg = StoreConfig::load(&path).unwrap();
        assert_eq!(cfg.busy_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = StoreConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, GraphError::Io(_)));
    }
}

//! Handler config persistence.
//!
//! # Responsibility
//! - Read and write the handler config (`psd_path` + category tree) and bare
//!   category trees as JSON files.
//!
//! # Invariants
//! - `_layer_count` and `_layer_dict` are written for diagnostics and never
//!   required on load.
//! - Written JSON is pretty-printed and keeps non-ASCII names verbatim.

use crate::error::ErrorKind;
use crate::model::record::CategoryRecord;
use indexmap::IndexMap;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Result type used by config repository operations.
pub type ConfigRepoResult<T> = Result<T, ConfigRepoError>;

/// Errors from config repository operations.
#[derive(Debug)]
pub enum ConfigRepoError {
    /// File cannot be read or written.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// File content is not a valid config.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl ConfigRepoError {
    /// Returns the coarse error class.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Invariant
    }
}

impl Display for ConfigRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "config io error at `{}`: {source}", path.display()),
            Self::Json { path, source } => {
                write!(f, "malformed config `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for ConfigRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

/// Persisted handler state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Location of the layered document.
    pub psd_path: PathBuf,
    /// Category tree root.
    pub root: CategoryRecord,
    #[serde(rename = "_layer_count", default)]
    pub layer_count: usize,
    /// Identifier -> display name, diagnostics only.
    #[serde(rename = "_layer_dict", default)]
    pub layer_dict: IndexMap<String, String>,
}

/// Storage contract for handler configs and category trees.
pub trait ConfigRepository {
    /// Loads one handler config.
    fn load_config(&self, path: &Path) -> ConfigRepoResult<HandlerConfig>;
    /// Writes one handler config, replacing any existing file.
    fn save_config(&self, path: &Path, config: &HandlerConfig) -> ConfigRepoResult<()>;
    /// Loads a bare category tree.
    fn load_tree(&self, path: &Path) -> ConfigRepoResult<CategoryRecord>;
    /// Writes a bare category tree.
    fn save_tree(&self, path: &Path, tree: &CategoryRecord) -> ConfigRepoResult<()>;
}

/// JSON file-backed config repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConfigRepository;

impl ConfigRepository for JsonConfigRepository {
    fn load_config(&self, path: &Path) -> ConfigRepoResult<HandlerConfig> {
        read_json(path, "config_load")
    }

    fn save_config(&self, path: &Path, config: &HandlerConfig) -> ConfigRepoResult<()> {
        write_json(path, config, "config_save")
    }

    fn load_tree(&self, path: &Path) -> ConfigRepoResult<CategoryRecord> {
        read_json(path, "tree_load")
    }

    fn save_tree(&self, path: &Path, tree: &CategoryRecord) -> ConfigRepoResult<()> {
        write_json(path, tree, "tree_save")
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path, event: &str) -> ConfigRepoResult<T> {
    let started_at = Instant::now();
    let result = std::fs::read_to_string(path)
        .map_err(|source| ConfigRepoError::Io {
            path: path.to_path_buf(),
            source,
        })
        .and_then(|raw| {
            serde_json::from_str(&raw).map_err(|source| ConfigRepoError::Json {
                path: path.to_path_buf(),
                source,
            })
        });
    log_outcome(event, started_at, &result);
    result
}

fn write_json<T: Serialize>(path: &Path, value: &T, event: &str) -> ConfigRepoResult<()> {
    let started_at = Instant::now();
    let result = serde_json::to_string_pretty(value)
        .map_err(|source| ConfigRepoError::Json {
            path: path.to_path_buf(),
            source,
        })
        .and_then(|raw| {
            std::fs::write(path, raw).map_err(|source| ConfigRepoError::Io {
                path: path.to_path_buf(),
                source,
            })
        });
    log_outcome(event, started_at, &result);
    result
}

fn log_outcome<T>(event: &str, started_at: Instant, result: &ConfigRepoResult<T>) {
    match result {
        Ok(_) => info!(
            "event={} module=repo status=ok duration_ms={}",
            event,
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event={} module=repo status=error duration_ms={} error={}",
            event,
            started_at.elapsed().as_millis(),
            err
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigRepoError, ConfigRepository, JsonConfigRepository};

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonConfigRepository
            .load_config(&dir.path().join("absent.json"))
            .unwrap_err();
        assert!(matches!(err, ConfigRepoError::Io { .. }));
    }

    #[test]
    fn diagnostics_fields_are_optional_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vh_config.json");
        std::fs::write(
            &path,
            r#"{ "psd_path": "doc.json", "root": { "name": "root", "mode": "all", "subcategories": [], "layers": [] } }"#,
        )
        .unwrap();

        let config = JsonConfigRepository.load_config(&path).unwrap();
        assert_eq!(config.layer_count, 0);
        assert!(config.layer_dict.is_empty());
        assert_eq!(config.root.name, "root");
    }
}

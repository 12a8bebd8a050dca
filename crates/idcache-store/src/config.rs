//! Store configuration.
//!
//! Read from the `[store]` table of a TOML file:
//!
//! ```toml
//! [store]
//! database_path = "data/idcache.db"
//! domain = "ad.example.com"
//! cache_timeout = 5400
//! ```
//!
//! Every key is optional. A missing file yields the defaults; a file that
//! exists but does not parse is an error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// Default entry lifetime in seconds (90 minutes).
pub const DEFAULT_CACHE_TIMEOUT: u32 = 5_400;

/// Settings for opening the cache and writing entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Identity domain whose entries this cache holds.
    pub domain: String,
    /// Seconds a freshly written entry stays valid; 0 disables expiry.
    pub cache_timeout: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/idcache.db"),
            domain: "localdomain".to_string(),
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    store: StoreConfig,
}

impl StoreConfig {
    /// Load the `[store]` table from `path`, or defaults if the file is absent.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(StoreError::Config(format!(
                    "failed to read {}: {err}",
                    path.display()
                )));
            }
        };

        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), domain = %config.domain, "configuration loaded");
        Ok(config)
    }

    /// Parse a TOML document containing an optional `[store]` table.
    pub fn from_toml_str(content: &str) -> StoreResult<Self> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| StoreError::Config(e.to_string()))?;
        file.store.validate()?;
        Ok(file.store)
    }

    fn validate(&self) -> StoreResult<()> {
        if self.domain.is_empty() {
            return Err(StoreError::Config("store.domain must not be empty".into()));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(StoreError::Config(
                "store.database_path must not be empty".into(),
            ));
        }
        Ok(())
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = StoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn partial_table_keeps_other_defaults() {
        let config = StoreConfig::from_toml_str(
            r#"
            [store]
            domain = "ad.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.domain, "ad.example.com");
        assert_eq!(config.cache_timeout, DEFAULT_CACHE_TIMEOUT);
        assert_eq!(config.database_path, PathBuf::from("data/idcache.db"));
    }

    #[test]
    fn full_table() {
        let config = StoreConfig::from_toml_str(
            r#"
            [store]
            database_path = "/var/lib/idcache/cache.db"
            domain = "ad.example.com"
            cache_timeout = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.cache_timeout, 0);
        assert_eq!(
            config.database_path,
            PathBuf::from("/var/lib/idcache/cache.db")
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(StoreConfig::from_toml_str("[store]\ndomain = \"\"").is_err());
        assert!(StoreConfig::from_toml_str("[store]\ncache_timeout = -1").is_err());
        assert!(StoreConfig::from_toml_str("[store]\nunknown = 1").is_err());
        assert!(StoreConfig::from_toml_str("not toml at all [").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idcache.toml");
        std::fs::write(&path, "[store]\ndomain = \"corp.test\"\ncache_timeout = 60\n").unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.domain, "corp.test");
        assert_eq!(config.cache_timeout, 60);
    }
}

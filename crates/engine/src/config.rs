//! Mapper configuration via `stratamap.toml`
//!
//! On first load a default `stratamap.toml` is written next to the caller's
//! data. To change settings, edit the file and restart.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use stratamap_core::{Error, Result};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "stratamap.toml";

/// Background reconciler settings, the `[reconciler]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Worker threads of the background scheduler
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Jobs that may wait in the scheduler queue
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,
    /// Log partitions processed per drain; 0 drains everything eligible
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_workers() -> usize {
    1
}

fn default_max_queue_depth() -> usize {
    1024
}

fn default_batch_size() -> usize {
    100
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        ReconcilerConfig {
            workers: default_workers(),
            max_queue_depth: default_max_queue_depth(),
            batch_size: default_batch_size(),
        }
    }
}

/// Object mapper configuration loaded from `stratamap.toml`.
///
/// # Example
///
/// ```toml
/// consistency_horizon_ms = 1000
/// use_batching = false
///
/// [reconciler]
/// workers = 1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Minimum age of a reconciliation-log entry before it is processed
    #[serde(default = "default_consistency_horizon_ms")]
    pub consistency_horizon_ms: u64,
    /// Timeout for one batch submission
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    /// Run bounded statement lists concurrently
    #[serde(default = "default_true")]
    pub execute_async: bool,
    /// Submit fully preparable bounded writes as one atomic batch
    #[serde(default)]
    pub use_batching: bool,
    /// Log every executed statement at debug level
    #[serde(default)]
    pub log_cql: bool,
    /// Prepare and cache statements from bounded iterators
    #[serde(default = "default_true")]
    pub cache_bounded_queries: bool,
    /// Statements one logical call may execute
    #[serde(default = "default_statement_ceiling")]
    pub statement_ceiling: usize,
    /// Background reconciler
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

fn default_consistency_horizon_ms() -> u64 {
    1000
}

fn default_batch_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_statement_ceiling() -> usize {
    50
}

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfig {
            consistency_horizon_ms: default_consistency_horizon_ms(),
            batch_timeout_ms: default_batch_timeout_ms(),
            execute_async: true,
            use_batching: false,
            log_cql: false,
            cache_bounded_queries: true,
            statement_ceiling: default_statement_ceiling(),
            reconciler: ReconcilerConfig::default(),
        }
    }
}

impl MapperConfig {
    /// Consistency horizon as a duration
    pub fn consistency_horizon(&self) -> Duration {
        Duration::from_millis(self.consistency_horizon_ms)
    }

    /// Batch timeout as a duration
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Reject settings no mapper can run with
    pub fn validate(&self) -> Result<()> {
        if self.statement_ceiling == 0 {
            return Err(Error::Config("statement_ceiling must be at least 1".to_string()));
        }
        if self.reconciler.workers == 0 {
            return Err(Error::Config("reconciler.workers must be at least 1".to_string()));
        }
        if self.reconciler.max_queue_depth == 0 {
            return Err(Error::Config(
                "reconciler.max_queue_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: MapperConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, writing the default file first when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize and write to `path`
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!("Failed to write config file '{}': {}", path.display(), e))
        })
    }

    /// Default config file content with comments
    pub fn default_toml() -> &'static str {
        r#"# stratamap configuration

# Minimum age (ms) of a reconciliation-log entry before stale index rows
# recorded in it are deleted
consistency_horizon_ms = 1000

# Timeout (ms) for one atomic batch submission
batch_timeout_ms = 10000

# Run bounded statement lists concurrently, one worker per list
execute_async = true

# Merge fully preparable writes into one atomic batch
use_batching = false

# Log every executed statement at debug level
log_cql = false

# Prepare and cache statements from bounded lists
cache_bounded_queries = true

# Statements a single logical call may execute before it is aborted
statement_ceiling = 50

[reconciler]
workers = 1
max_queue_depth = 1024
# Log partitions per drain, 0 for no cap
batch_size = 100
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_toml_matches_defaults() {
        let parsed = MapperConfig::from_toml_str(MapperConfig::default_toml()).unwrap();
        assert_eq!(parsed, MapperConfig::default());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = MapperConfig::from_toml_str("").unwrap();
        assert_eq!(config.statement_ceiling, 50);
        assert_eq!(config.consistency_horizon(), Duration::from_secs(1));
        assert!(config.execute_async);
        assert!(!config.use_batching);
        assert_eq!(config.reconciler.workers, 1);
    }

    #[test]
    fn partial_reconciler_table() {
        let config = MapperConfig::from_toml_str("[reconciler]\nbatch_size = 5\n").unwrap();
        assert_eq!(config.reconciler.batch_size, 5);
        assert_eq!(config.reconciler.max_queue_depth, 1024);
    }

    #[test]
    fn zero_ceiling_rejected() {
        let err = MapperConfig::from_toml_str("statement_ceiling = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_workers_rejected() {
        let err = MapperConfig::from_toml_str("[reconciler]\nworkers = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = MapperConfig::from_toml_str("use_batching = maybe").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn load_writes_default_when_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = MapperConfig::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, MapperConfig::default());
    }

    #[test]
    fn load_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "use_batching = true\n").unwrap();
        let config = MapperConfig::load(&path).unwrap();
        assert!(config.use_batching);
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = MapperConfig {
            log_cql: true,
            statement_ceiling: 7,
            ..MapperConfig::default()
        };
        config.write_to_file(&path).unwrap();
        assert_eq!(MapperConfig::load(&path).unwrap(), config);
    }
}

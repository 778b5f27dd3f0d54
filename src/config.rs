//! Configuration
//!
//! The host owns and persists configuration; this crate only reads it. Each
//! aggregation call takes one immutable snapshot from a [`SharedConfig`], so
//! toggling a source or changing priorities takes effect on the next call
//! without a restart.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to determine the configuration directory location
    #[error("Failed to determine configuration directory location")]
    ConfigDirectoryNotFound,

    /// Failed to read the configuration file
    #[error("Failed to read configuration file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema
    #[error("Failed to parse configuration file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level configuration consumed by the aggregation engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Pick the first of several ambiguous candidates instead of giving up
    pub first_only: bool,
    /// Let later sources replace scalar fields filled by earlier ones
    pub overwrite: bool,
    /// HTTP client settings for built-in sources
    pub http: HttpConfig,
    /// Document cache settings for built-in sources
    pub cache: CacheConfig,
    /// Per-source settings keyed by source name
    pub sources: BTreeMap<String, SourceSettings>,
}

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            user_agent: concat!("iv_info/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Document cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_hours: u64,
    /// Overrides the platform cache directory
    pub directory: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_hours: 24,
            directory: None,
        }
    }
}

/// Settings of a single source.
///
/// Sources without an entry are disabled.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub enabled: bool,
    pub image_enabled: bool,
    /// Lower runs earlier; `None` uses the source's built-in default
    pub priority: Option<i32>,
    /// Source specific switches
    pub options: BTreeMap<String, bool>,
}

impl SourceSettings {
    /// Returns a named switch, false when unset.
    pub fn option(&self, key: &str) -> bool {
        self.options.get(key).copied().unwrap_or(false)
    }
}

impl PluginConfig {
    /// Parses configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Returns the default configuration file path in the platform config dir.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let proj_dirs = directories::ProjectDirs::from("org", "ivinfo", "iv_info")
            .ok_or(ConfigError::ConfigDirectoryNotFound)?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Returns the settings for a source, or disabled defaults.
    pub fn source(&self, name: &str) -> SourceSettings {
        self.sources.get(name).cloned().unwrap_or_default()
    }

    /// Builder style helper to set a source's settings.
    pub fn with_source(mut self, name: &str, settings: SourceSettings) -> Self {
        self.sources.insert(name.to_string(), settings);
        self
    }
}

/// A cheaply clonable handle to the live configuration.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<PluginConfig>>>,
}

impl SharedConfig {
    pub fn new(config: PluginConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Returns the configuration as of now; later updates do not affect it.
    pub fn snapshot(&self) -> Arc<PluginConfig> {
        self.inner.read().clone()
    }

    /// Replaces the live configuration.
    pub fn replace(&self, config: PluginConfig) {
        *self.inner.write() = Arc::new(config);
    }
}

//! TOML configuration for the persistence backend, auth and logging.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides the default config location.
pub const CONFIG_ENV: &str = "FREECLOUD_CONFIG";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Backend selection and tuning.
    pub persistence: PersistenceConfig,
    /// Session lifetimes and cleanup cadence.
    pub auth: AuthConfig,
    /// Log filter.
    pub logging: LoggingConfig,
}

/// Graph backend edition. Only enterprise stores get existence constraints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Edition {
    /// Uniqueness constraints and indexes only.
    Community,
    /// Additionally enforces mandatory properties.
    #[default]
    Enterprise,
}

impl Edition {
    /// Whether mandatory-property constraints can be installed.
    pub fn supports_existence_constraints(self) -> bool {
        matches!(self, Edition::Enterprise)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct PersistenceConfig {
    /// Registry key of the backend to initialise.
    pub backend: String,
    /// Database file. Defaults to the platform data directory.
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    /// Server-side limit after which a transaction is aborted.
    pub transaction_timeout_ms: u64,
    pub edition: Edition,
    /// Upper bound on variable-length traversals.
    pub max_traversal_depth: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            path: None,
            busy_timeout_ms: 5_000,
            transaction_timeout_ms: 10_000,
            edition: Edition::default(),
            max_traversal_depth: 256,
        }
    }
}

impl PersistenceConfig {
    /// Config pointing at an explicit database file, everything else default.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Resolved database location.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => default_data_path().ok_or(ConfigError::NoDataDir),
        }
    }

    /// Busy timeout as a [`Duration`].
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Transaction timeout as a [`Duration`].
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct AuthConfig {
    /// Random bytes per session token; tokens are hex encoded.
    pub session_token_length: usize,
    pub session_expiration_secs: u64,
    pub session_cleanup_interval_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_token_length: 32,
            session_expiration_secs: 7 * 24 * 60 * 60,
            session_cleanup_interval_secs: 300,
        }
    }
}

impl AuthConfig {
    /// How long a new session stays valid.
    pub fn session_expiration(&self) -> Duration {
        Duration::from_secs(self.session_expiration_secs)
    }

    /// Period of the expired-session sweep.
    pub fn session_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.session_cleanup_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads the config from `explicit`, `$FREECLOUD_CONFIG`, or the platform
    /// config directory, in that order. A missing file yields defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(default_config_path);
        let config = match path {
            Some(path) if path.exists() => read_file(&path)?,
            _ => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a config from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the config as pretty TOML, creating parent directories.
    pub fn persist(&self, target: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let serialized =
            toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })?;
        fs::write(target, serialized).map_err(|source| ConfigError::Write {
            path: target.to_path_buf(),
            source,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&'static str, bool); 4] = [
            (
                "persistence.transaction_timeout_ms",
                self.persistence.transaction_timeout_ms > 0,
            ),
            (
                "persistence.max_traversal_depth",
                self.persistence.max_traversal_depth > 0,
            ),
            ("auth.session_token_length", self.auth.session_token_length >= 16),
            (
                "auth.session_cleanup_interval_secs",
                self.auth.session_cleanup_interval_secs > 0,
            ),
        ];
        for (key, ok) in checks {
            if !ok {
                return Err(ConfigError::InvalidValue { key });
            }
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Failures while loading or writing the configuration.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {source}")]
    Serialize { source: toml::ser::Error },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config value '{key}' is out of range")]
    InvalidValue { key: &'static str },
    #[error("no data directory found; set persistence.path")]
    NoDataDir,
}

/// `<config dir>/freecloud/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("freecloud").join("config.toml"))
}

/// `<data dir>/freecloud/graph.db`.
pub fn default_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|base| base.join("freecloud").join("graph.db"))
}

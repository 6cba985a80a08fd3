//! Configuration for udsock
//!
//! Settings come from `udsock.toml`. Every field has a default, so an empty
//! or missing `[section]` is valid. The file is located by, in order:
//!
//! 1. an explicit path (`--config`)
//! 2. the `UDSOCK_CONFIG` environment variable
//! 3. `<config dir>/udsock/udsock.toml`
//!
//! ```toml
//! [endpoint]
//! mode = "stream"
//! backlog = 16
//! receive_timeout_ms = 500
//! stale_socket = "probe"
//! unlink_on_drop = true
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```

use crate::error::{ConfigError, Result};
use crate::logging::LogConfig;
use crate::manager::{EndpointManager, EndpointOptions};
use crate::mode::TransportMode;
use crate::stale::StaleSocketPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "UDSOCK_CONFIG";

/// File name looked up under the user config directory.
pub const CONFIG_FILE_NAME: &str = "udsock.toml";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, for terminals
    #[default]
    Pretty,
    /// JSON lines, for collectors
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected pretty or json")),
        }
    }
}

/// Defaults applied to endpoints opened through the CLI or [`Config::manager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub mode: TransportMode,
    /// Pending-connection queue length for `listen`.
    pub backlog: u32,
    /// `0` keeps reads fully blocking.
    pub receive_timeout_ms: u32,
    pub stale_socket: StaleSocketPolicy,
    /// Remove the socket node when a server shuts down.
    pub unlink_on_drop: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Stream,
            backlog: 16,
            receive_timeout_ms: 0,
            stale_socket: StaleSocketPolicy::Probe,
            unlink_on_drop: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: EndpointConfig,
    pub logging: LogConfig,
}

impl Config {
    /// Load configuration, falling back to defaults when no file is found.
    ///
    /// An explicit path that does not exist is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_resolved(explicit, resolve_config_path())
    }

    fn load_resolved(explicit: Option<&Path>, implicit: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.display().to_string()).into());
            }
            return Self::load_from(path);
        }

        match implicit {
            Some(path) if path.exists() => Self::load_from(&path),
            Some(path) => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Load and validate a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::ReadFailed(path.display().to_string(), e.to_string())
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeFailed(e.to_string()).into())
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.backlog == 0 {
            return Err(
                ConfigError::ValidationError("endpoint.backlog must be at least 1".into()).into(),
            );
        }
        if self.logging.level.parse::<crate::logging::LogLevel>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "logging.level {:?} is not one of trace, debug, info, warn, error",
                self.logging.level
            ))
            .into());
        }
        Ok(())
    }

    #[must_use]
    pub fn options(&self) -> EndpointOptions {
        EndpointOptions {
            stale_socket: self.endpoint.stale_socket,
            receive_timeout_ms: self.endpoint.receive_timeout_ms,
        }
    }

    #[must_use]
    pub fn manager(&self) -> EndpointManager {
        EndpointManager::new(self.options())
    }
}

/// The config path that would be used without an explicit `--config`.
pub fn resolve_config_path() -> Option<PathBuf> {
    let env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    resolve_from(env.as_deref(), dirs::config_dir().as_deref())
}

fn resolve_from(env: Option<&Path>, config_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = env.filter(|p| !p.as_os_str().is_empty()) {
        return Some(path.to_path_buf());
    }
    config_dir.map(|dir| dir.join("udsock").join(CONFIG_FILE_NAME))
}

//! Configuration for the helpdesk stores and server
//!
//! Loaded from TOML (by default `<config dir>/helpdesk/config.toml`), then
//! overridden by `HELPDESK_*` environment variables. Every section may be
//! omitted; missing values take their defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variables read by [`HelpdeskConfig::apply_env`].
pub const ENV_DOCUMENT_URL: &str = "HELPDESK_DOCUMENT_URL";
pub const ENV_DOCUMENT_TIMEOUT_SECS: &str = "HELPDESK_DOCUMENT_TIMEOUT_SECS";
pub const ENV_WIDE_COLUMN_PATH: &str = "HELPDESK_WIDE_COLUMN_PATH";
pub const ENV_GRAPH_PATH: &str = "HELPDESK_GRAPH_PATH";
pub const ENV_LISTEN_ADDR: &str = "HELPDESK_LISTEN_ADDR";
pub const ENV_DATABASE_PATH: &str = "HELPDESK_DATABASE_PATH";

/// Handles for all three stores plus the document server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelpdeskConfig {
    pub document_store: DocumentStoreConfig,
    pub wide_column: WideColumnConfig,
    pub graph: GraphConfig,
    pub server: ServerConfig,
}

/// Where the document store API lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentStoreConfig {
    pub base_url: String,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 30,
        }
    }
}

impl DocumentStoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WideColumnConfig {
    /// SQLite file holding the projection keyspace
    pub path: PathBuf,
}

impl Default for WideColumnConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("wide_column.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub path: PathBuf,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("graph.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// SQLite file backing the document store
    pub database_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            database_path: data_dir().join("documents.db"),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("helpdesk")
}

impl HelpdeskConfig {
    /// `<config dir>/helpdesk/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("helpdesk").join("config.toml"))
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml(&text)
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used when present and built-in defaults otherwise. Environment
    /// overrides are applied last, then the result is validated.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => {
                    tracing::debug!(path = %path.display(), "loading default config");
                    Self::load(&path)?
                }
                None => Self::default(),
            },
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HELPDESK_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup(ENV_DOCUMENT_URL) {
            self.document_store.base_url = url;
        }
        if let Some(secs) = lookup(ENV_DOCUMENT_TIMEOUT_SECS) {
            self.document_store.timeout_secs = secs.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} must be a whole number of seconds, got {:?}", ENV_DOCUMENT_TIMEOUT_SECS, secs))
            })?;
        }
        if let Some(path) = lookup(ENV_WIDE_COLUMN_PATH) {
            self.wide_column.path = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_GRAPH_PATH) {
            self.graph.path = PathBuf::from(path);
        }
        if let Some(addr) = lookup(ENV_LISTEN_ADDR) {
            self.server.listen_addr = addr;
        }
        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            self.server.database_path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.document_store.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "document_store.base_url must be an http(s) URL, got {:?}",
                url
            )));
        }
        if self.document_store.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "document_store.timeout_secs must be positive".to_string(),
            ));
        }
        if self.server.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "server.listen_addr is not a socket address: {:?}",
                self.server.listen_addr
            )));
        }
        for (name, path) in [
            ("wide_column.path", &self.wide_column.path),
            ("graph.path", &self.graph.path),
            ("server.database_path", &self.server.database_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::MissingField(name.to_string()));
            }
        }
        Ok(())
    }
}

/// Configuration loading or validation error
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// The file could not be read
    Read { path: PathBuf, message: String },
    /// The file is not valid TOML for this schema
    Parse(String),
    /// A value is out of its valid range
    Invalid(String),
    /// Required field is missing
    MissingField(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, message } => {
                write!(f, "Cannot read {}: {}", path.display(), message)
            }
            ConfigError::Parse(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid value: {}", msg),
            ConfigError::MissingField(msg) => write!(f, "Missing field: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

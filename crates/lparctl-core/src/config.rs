//! Configuration management for lparctl
//!
//! Handles loading and validation of lparctl.toml configuration files. Every
//! section is optional; a missing file yields the defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inventory::{DEFAULT_COUNT_COMMAND, DEFAULT_LIST_COMMAND, Inventory};
use crate::logging::LogConfig;
use crate::target::DEFAULT_PORT;
use crate::uuid_table::TablePaths;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Console connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Correspondence table locations
    #[serde(default)]
    pub table: TableConfig,

    /// Partition enumeration commands
    #[serde(default)]
    pub inventory: InventoryConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LogConfig,
}

/// Connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Default target, e.g. `phyp://hscroot@hmc01/Server-8203-E4A`
    #[serde(default)]
    pub target: Option<String>,

    /// SSH port when the target does not name one
    #[serde(default = "default_port")]
    pub port: u16,

    /// Private key for public key authentication; `~/.ssh/id_rsa` if unset
    #[serde(default)]
    pub private_key: Option<PathBuf>,

    /// Public half of the key pair; `~/.ssh/id_rsa.pub` if unset
    #[serde(default)]
    pub public_key: Option<PathBuf>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            target: None,
            port: default_port(),
            private_key: None,
            public_key: None,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Correspondence table configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    /// Local cache of the table
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,

    /// Parent of the per-user home directories on the console
    #[serde(default = "default_remote_home_root")]
    pub remote_home_root: String,

    /// File name of the remote copy inside the user's home
    #[serde(default = "default_remote_file_name")]
    pub remote_file_name: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            local_path: default_local_path(),
            remote_home_root: default_remote_home_root(),
            remote_file_name: default_remote_file_name(),
        }
    }
}

fn default_local_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lparctl")
        .join("uuid_table")
}

fn default_remote_home_root() -> String {
    "/home".to_string()
}

fn default_remote_file_name() -> String {
    "lparctl_uuid_table".to_string()
}

impl TableConfig {
    /// `<remote_home_root>/<user>/<remote_file_name>`
    pub fn remote_path(&self, user: &str) -> PathBuf {
        Path::new(&self.remote_home_root)
            .join(user)
            .join(&self.remote_file_name)
    }

    pub fn paths_for(&self, user: &str) -> TablePaths {
        TablePaths {
            local: self.local_path.clone(),
            remote: self.remote_path(user),
        }
    }
}

/// Inventory command templates; `{scope}` becomes ` -m <system>` on an HMC
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    #[serde(default = "default_count_command")]
    pub count_command: String,

    #[serde(default = "default_list_command")]
    pub list_command: String,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            count_command: default_count_command(),
            list_command: default_list_command(),
        }
    }
}

fn default_count_command() -> String {
    DEFAULT_COUNT_COMMAND.to_string()
}

fn default_list_command() -> String {
    DEFAULT_LIST_COMMAND.to_string()
}

impl From<&InventoryConfig> for Inventory {
    fn from(config: &InventoryConfig) -> Self {
        Self::new(&config.count_command, &config.list_command)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly output
    #[default]
    Pretty,
    /// JSON lines
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

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected one of: pretty, json")),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lparctl").join("lparctl.toml"))
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given, else the default location.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load_from(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.port == 0 {
            return Err(ConfigError::Invalid("connection.port must be non-zero".into()));
        }
        if self.table.remote_file_name.is_empty() || self.table.remote_file_name.contains('/') {
            return Err(ConfigError::Invalid(
                "table.remote_file_name must be a plain file name".into(),
            ));
        }
        if self.table.local_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("table.local_path must be set".into()));
        }
        for (name, value) in [
            ("inventory.count_command", &self.inventory.count_command),
            ("inventory.list_command", &self.inventory.list_command),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.connection.port, 22);
        assert_eq!(config.table.remote_file_name, "lparctl_uuid_table");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn remote_path_is_under_user_home() {
        let table = TableConfig::default();
        assert_eq!(
            table.remote_path("hscroot"),
            PathBuf::from("/home/hscroot/lparctl_uuid_table")
        );
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [connection]
            target = "phyp://hscroot@hmc01/sys1"
            port = 2222

            [table]
            remote_home_root = "/export/home"

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.port, 2222);
        assert_eq!(
            config.table.remote_path("padmin"),
            PathBuf::from("/export/home/padmin/lparctl_uuid_table")
        );
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.inventory.count_command, DEFAULT_COUNT_COMMAND);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            Config::from_toml("[connection]\nport = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[table]\nremote_file_name = \"a/b\"\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[connection\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn explicit_missing_path_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lparctl.toml");
        std::fs::write(&path, "[inventory]\nlist_command = \"ls-ids\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.inventory.list_command, "ls-ids");
    }
}

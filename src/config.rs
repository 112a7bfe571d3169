//! Settings for the server and the terminal client.
//!
//! Sources, lowest precedence first: built-in defaults, the TOML file,
//! `TASKBOARD_*` environment variables (a `.env` file is loaded first), and
//! finally command-line flags, which `main` applies on top.

use crate::models::Role;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:4000";
pub const DEFAULT_API_URL: &str = "http://localhost:4000";
pub const MAX_FILES: usize = 10;
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    Value { key: &'static str, value: String },
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    pub data_file: PathBuf,
    pub upload_dir: PathBuf,
    pub max_files: usize,
    pub max_file_bytes: usize,
    /// Allowed CORS origin. Any origin when unset.
    pub client_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: DEFAULT_LISTEN.to_string(),
            data_file: PathBuf::from("data/tasks.json"),
            upload_dir: PathBuf::from("uploads"),
            max_files: MAX_FILES,
            max_file_bytes: MAX_FILE_BYTES,
            client_origin: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub api_url: String,
    pub user_id: String,
    pub role: Role,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            api_url: DEFAULT_API_URL.to_string(),
            user_id: String::from("student1"),
            role: Role::Student,
        }
    }
}

impl Config {
    /// Loads the config file and environment overrides.
    ///
    /// An explicitly given file must exist; the default location is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Config::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config file");
        Ok(toml::from_str(&raw)?)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(listen) = lookup("TASKBOARD_LISTEN") {
            self.server.listen = listen;
        }
        if let Some(path) = lookup("TASKBOARD_DATA_FILE") {
            self.server.data_file = PathBuf::from(path);
        }
        if let Some(path) = lookup("TASKBOARD_UPLOAD_DIR") {
            self.server.upload_dir = PathBuf::from(path);
        }
        if let Some(origin) = lookup("TASKBOARD_CLIENT_ORIGIN") {
            self.server.client_origin = Some(origin);
        }
        if let Some(url) = lookup("TASKBOARD_API_URL") {
            self.client.api_url = url;
        }
        if let Some(user) = lookup("TASKBOARD_USER") {
            self.client.user_id = user;
        }
        if let Some(role) = lookup("TASKBOARD_ROLE") {
            self.client.role = role.parse().map_err(|_| ConfigError::Value {
                key: "TASKBOARD_ROLE",
                value: role,
            })?;
        }
        Ok(())
    }
}

/// `<config dir>/taskboard/config.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("taskboard").join("config.toml"))
}

/// Where the terminal client writes its log file.
pub fn log_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("taskboard"))
        .unwrap_or_else(|| PathBuf::from("."))
}

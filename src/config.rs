use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a number, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
}

/// Runtime configuration for the gateway.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub host: String,
    pub port: u16,
    /// Directory holding the session file and sealed media.
    pub data_dir: PathBuf,
    /// JSON file with the device identity and message log.
    pub session_file: PathBuf,
    /// Device name recorded in a freshly created session.
    pub device_name: String,
    /// Upper bound on the wait for a pairing code during login.
    pub login_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            session_file: PathBuf::from("./data/session.json"),
            device_name: "wa-gateway".into(),
            login_timeout: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup; unset or empty
    /// keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(host) = get("HTTP_HOST") {
            config.host = host;
        }
        if let Some(port) = get("HTTP_PORT") {
            config.port = parse_number("HTTP_PORT", &port)?;
        }
        if let Some(dir) = get("WA_DATA_DIR") {
            config = config.with_data_dir(dir);
        }
        if let Some(file) = get("WA_SESSION_FILE") {
            config.session_file = PathBuf::from(file);
        }
        if let Some(name) = get("WA_DEVICE_NAME") {
            config.device_name = name;
        }
        if let Some(secs) = get("WA_LOGIN_TIMEOUT_SECS") {
            config.login_timeout = Duration::from_secs(parse_number("WA_LOGIN_TIMEOUT_SECS", &secs)?);
        }

        Ok(config)
    }

    /// Override the data directory. The session file moves along with it.
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self.session_file = self.data_dir.join("session.json");
        self
    }

    /// Override the session file path.
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = path.into();
        self
    }

    /// Override the listen port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        key,
        value: value.to_string(),
    })
}

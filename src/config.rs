//! Client configuration.
//!
//! `ClientConfig` is built once at startup (from a JSON file or with
//! `Default`) and shared read-only through an `Arc`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Where the visualization server listens.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Fixed delay between reconnection attempts. There is no backoff and no
    /// retry limit.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Size of the buffer handed to each socket read.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Upper bound for length-prefixed strings and byte arrays. `None` accepts
    /// any length the stream declares.
    #[serde(default)]
    pub max_blob_len: Option<u32>,

    /// Send `IdentHeadset` each time a connection is established.
    #[serde(default = "default_true")]
    pub identify_on_connect: bool,

    /// `log` level filter name (`error`, `warn`, `info`, `debug`, `trace`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            read_buffer_size: default_read_buffer_size(),
            max_blob_len: None,
            identify_on_connect: true,
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ClientConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size == 0 {
            return Err(Error::Config("read_buffer_size must be positive".into()));
        }
        if self.server.host.is_empty() {
            return Err(Error::Config("server.host must not be empty".into()));
        }
        if self.log_level.parse::<log::LevelFilter>().is_err() {
            return Err(Error::Config(format!("unknown log level '{}'", self.log_level)));
        }
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_read_buffer_size() -> usize {
    64 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

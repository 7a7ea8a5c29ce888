use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::DEFAULT_MAX_FRAME_SIZE;
use crate::endpoint::Endpoint;
use crate::Error;

/// Top-level configuration, usually loaded from a TOML file.
///
/// Every section and field is optional; missing values fall back to the defaults below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server used when no URL is given on the command line.
    pub endpoint: Option<Endpoint>,
    pub pool: PoolConfig,
    pub connection: ConnectionConfig,
    pub session: SessionConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Upper bound on open connections per endpoint, idle and checked out together.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(with = "humantime_serde", default = "default_acquire_timeout")]
    pub acquire_timeout: Duration,
    /// Connections older than this are closed instead of being handed out again.
    #[serde(with = "humantime_serde", default = "default_connection_ttl")]
    pub connection_ttl: Duration,
    /// Idle connections unused for longer than this are probed with PING before reuse.
    #[serde(with = "humantime_serde", default = "default_health_check_interval")]
    pub health_check_interval: Duration,
    #[serde(default = "default_max_connect_attempts")]
    pub max_connect_attempts: u32,
    #[serde(with = "humantime_serde", default = "default_backoff_base")]
    pub backoff_base: Duration,
    #[serde(with = "humantime_serde", default = "default_backoff_max")]
    pub backoff_max: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_command_timeout")]
    pub command_timeout: Duration,
    /// TCP keep-alive idle time. `None` leaves the OS default.
    #[serde(with = "humantime_serde", default = "default_keepalive")]
    pub keepalive: Option<Duration>,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Sent as the connection name during the handshake.
    #[serde(default = "default_client_name")]
    pub client_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_pipeline_batch_size")]
    pub pipeline_batch_size: usize,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// COUNT hint passed to SCAN.
    #[serde(default = "default_page_size")]
    pub scan_page_size: usize,
    /// Elements fetched per page when reading a collection.
    #[serde(default = "default_page_size")]
    pub read_page_size: usize,
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Config, Error> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| Error::Config(format!("failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, Error> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Config::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.pool.max_size == 0 {
            return Err(Error::Config("pool.max_size must be at least 1".into()));
        }
        if self.pool.max_connect_attempts == 0 {
            return Err(Error::Config(
                "pool.max_connect_attempts must be at least 1".into(),
            ));
        }
        if self.pool.backoff_base > self.pool.backoff_max {
            return Err(Error::Config(
                "pool.backoff_base must not exceed pool.backoff_max".into(),
            ));
        }
        if self.session.pipeline_batch_size == 0 {
            return Err(Error::Config(
                "session.pipeline_batch_size must be at least 1".into(),
            ));
        }
        if self.browser.scan_page_size == 0 || self.browser.read_page_size == 0 {
            return Err(Error::Config("browser page sizes must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_size: default_max_size(),
            acquire_timeout: default_acquire_timeout(),
            connection_ttl: default_connection_ttl(),
            health_check_interval: default_health_check_interval(),
            max_connect_attempts: default_max_connect_attempts(),
            backoff_base: default_backoff_base(),
            backoff_max: default_backoff_max(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
            keepalive: default_keepalive(),
            max_frame_size: default_max_frame_size(),
            client_name: default_client_name(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            pipeline_batch_size: default_pipeline_batch_size(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        BrowserConfig {
            scan_page_size: default_page_size(),
            read_page_size: default_page_size(),
        }
    }
}

fn default_max_size() -> usize {
    10
}
fn default_acquire_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_connection_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}
fn default_health_check_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_max_connect_attempts() -> u32 {
    3
}
fn default_backoff_base() -> Duration {
    Duration::from_millis(100)
}
fn default_backoff_max() -> Duration {
    Duration::from_secs(2)
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_command_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_keepalive() -> Option<Duration> {
    Some(Duration::from_secs(60))
}
fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}
fn default_client_name() -> Option<String> {
    Some(env!("CARGO_PKG_NAME").to_string())
}
fn default_pipeline_batch_size() -> usize {
    100
}
fn default_history_capacity() -> usize {
    100
}
fn default_page_size() -> usize {
    100
}

//! Connector configuration management

use relink_transport_traits::StreamTimeouts;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default environment variable prefix for [`ConnectorConfig::from_file`]
pub const ENV_PREFIX: &str = "RELINK";

/// Connector configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Remote address, `host` or `host:port`
    pub address: Option<String>,
    /// Keep reconnecting after failures and session ends
    pub persistent: bool,
    /// Pause between a failed connect attempt and the next one
    pub retry_delay_ms: u64,
    /// Inter-character read timeout applied to every new stream
    pub char_timeout_ms: u64,
    /// Timeout for establishing the stream (used by the TCP factory)
    pub connect_timeout_ms: u64,
    /// Upper bound on how long `stop()` waits for the worker to exit
    pub shutdown_timeout_ms: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            address: None,
            persistent: true,
            retry_delay_ms: 60_000,
            char_timeout_ms: 500,
            connect_timeout_ms: 5_000,
            shutdown_timeout_ms: 1_000,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),
}

impl ConnectorConfig {
    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// The format follows the file extension. Environment variables prefixed
    /// with `RELINK_` override file values, e.g. `RELINK_RETRY_DELAY_MS=5000`.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use relink::ConnectorConfig;
    ///
    /// let config = ConnectorConfig::from_file("connector.toml")
    ///     .expect("Failed to load config");
    /// ```
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix
    pub fn from_file_with_prefix(
        path: impl AsRef<std::path::Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Create a configuration builder
    #[must_use]
    pub fn builder() -> ConnectorConfigBuilder {
        ConnectorConfigBuilder::new()
    }

    /// Pause between failed connect attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Inter-character read timeout
    pub fn char_timeout(&self) -> Duration {
        Duration::from_millis(self.char_timeout_ms)
    }

    /// Stream connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Bound on `stop()`
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Timeouts handed to stream factories
    pub fn stream_timeouts(&self) -> StreamTimeouts {
        StreamTimeouts {
            connect: self.connect_timeout(),
            ..StreamTimeouts::default()
        }
        .with_char_timeout(self.char_timeout())
    }
}

/// Builder for [`ConnectorConfig`]
#[derive(Debug, Default)]
pub struct ConnectorConfigBuilder {
    config: ConnectorConfig,
}

impl ConnectorConfigBuilder {
    /// Create a builder holding the defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the remote address
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.address = Some(address.into());
        self
    }

    /// Enable or disable reconnection
    #[must_use]
    pub const fn persistent(mut self, persistent: bool) -> Self {
        self.config.persistent = persistent;
        self
    }

    /// Set the retry delay
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the inter-character read timeout
    #[must_use]
    pub const fn char_timeout(mut self, timeout: Duration) -> Self {
        self.config.char_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the stream connect timeout
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the bound on `stop()`
    #[must_use]
    pub const fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> ConnectorConfig {
        self.config
    }
}

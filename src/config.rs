//! # Configuration Management
//!
//! Centralized configuration for connections built by this crate.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()` (`NETSTATE_*` variables)
//!
//! ## Sections
//! - **client**: connect timeout, inactivity window, liveness probing
//! - **transport**: buffer sizes, send-queue ceiling, coalescing, compression
//! - **logging**: subscriber level and format

use crate::error::{ProtocolError, Result};
use crate::utils::compression::CompressionKind;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default time allowed for the TCP connect to complete
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default window without received bytes before a connection counts as dead
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(90);

/// Default receive buffer size (also the buffer-pool slot size)
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 4096;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Connection behavior
    #[serde(default)]
    pub client: ClientConfig,

    /// Buffering and send-path configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(ms) = env_parse::<u64>("NETSTATE_CONNECT_TIMEOUT_MS")? {
            config.client.connect_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = env_parse::<u64>("NETSTATE_INACTIVITY_TIMEOUT_MS")? {
            config.client.inactivity_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = env_parse::<u64>("NETSTATE_LIVENESS_CHECK_INTERVAL_MS")? {
            config.client.liveness_check_interval = Duration::from_millis(ms);
        }

        if let Some(bytes) = env_parse::<usize>("NETSTATE_SEND_QUEUE_CAPACITY")? {
            config.transport.send_queue_capacity = bytes;
        }

        if let Some(bytes) = env_parse::<usize>("NETSTATE_RECEIVE_BUFFER_SIZE")? {
            config.transport.receive_buffer_size = bytes;
        }

        if let Some(enabled) = env_parse::<bool>("NETSTATE_COMPRESSION")? {
            config.transport.compression_enabled = enabled;
        }

        if let Ok(level) = std::env::var("NETSTATE_LOG_LEVEL") {
            config.logging.log_level = level.parse::<Level>().map_err(|_| {
                ProtocolError::ConfigError(format!("Invalid NETSTATE_LOG_LEVEL: {level}"))
            })?;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.client.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ProtocolError::ConfigError(format!("Invalid value for {name}: {raw}"))),
        Err(_) => Ok(None),
    }
}

/// Connection behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Timeout for the TCP connect
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// A connection with no received bytes for this long is disposed by `check_alive`
    #[serde(with = "duration_serde")]
    pub inactivity_timeout: Duration,

    /// How often the connection probes itself; zero leaves probing to the caller
    #[serde(with = "duration_serde")]
    pub liveness_check_interval: Duration,

    /// Dispose the connection when a frame with an unregistered identifier arrives
    pub disconnect_on_unknown_packet: bool,

    /// Disable Nagle's algorithm on the socket
    pub nodelay: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            liveness_check_interval: Duration::ZERO,
            disconnect_on_unknown_packet: true,
            nodelay: true,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        } else if self.connect_timeout.as_secs() > 300 {
            errors.push("Connect timeout too long (maximum: 300s)".to_string());
        }

        if self.inactivity_timeout.as_millis() < 100 {
            errors.push("Inactivity timeout too short (minimum: 100ms)".to_string());
        }

        if !self.liveness_check_interval.is_zero() {
            if self.liveness_check_interval.as_millis() < 10 {
                errors.push("Liveness check interval too short (minimum: 10ms)".to_string());
            } else if self.liveness_check_interval > self.inactivity_timeout {
                errors.push(
                    "Liveness check interval cannot be longer than the inactivity timeout"
                        .to_string(),
                );
            }
        }

        errors
    }
}

/// Buffering and send-path configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Bytes read per socket receive; also the buffer-pool slot size
    pub receive_buffer_size: usize,

    /// Slots allocated up front in the buffer pool
    pub buffer_pool_preallocate: usize,

    /// Idle packet writers kept for reuse
    pub writer_pool_size: usize,

    /// Ceiling on bytes waiting in the send queue
    pub send_queue_capacity: usize,

    /// Largest merged transmission built from queued grams
    pub coalesce_limit: usize,

    /// Whether outbound grams are compressed
    pub compression_enabled: bool,

    /// Algorithm used when compression is enabled
    pub compression_kind: CompressionKind,

    /// Grams smaller than this are sent uncompressed
    pub compression_threshold_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            buffer_pool_preallocate: 4,
            writer_pool_size: 16,
            send_queue_capacity: crate::transport::send_queue::DEFAULT_SEND_CAPACITY,
            coalesce_limit: crate::transport::send_queue::DEFAULT_COALESCE_LIMIT,
            compression_enabled: false,
            compression_kind: CompressionKind::Lz4,
            compression_threshold_bytes: 512,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.receive_buffer_size < 64 {
            errors.push("Receive buffer size too small (minimum: 64 bytes)".to_string());
        } else if self.receive_buffer_size > 1024 * 1024 {
            errors.push("Receive buffer size too large (maximum: 1 MB)".to_string());
        }

        if self.send_queue_capacity == 0 {
            errors.push("Send queue capacity must be greater than 0".to_string());
        } else if self.send_queue_capacity < u16::MAX as usize {
            errors.push(format!(
                "Send queue capacity too small: {} (must hold one maximum-size frame of {} bytes)",
                self.send_queue_capacity,
                u16::MAX
            ));
        }

        if self.coalesce_limit == 0 {
            errors.push("Coalesce limit must be greater than 0".to_string());
        } else if self.coalesce_limit > self.send_queue_capacity {
            errors.push("Coalesce limit cannot be larger than send queue capacity".to_string());
        }

        if self.compression_enabled && self.compression_threshold_bytes > u16::MAX as usize {
            errors.push(
                "Compression threshold cannot be larger than the maximum frame size".to_string(),
            );
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,

    /// Include span/target information in each line
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("netstate"),
            log_level: Level::INFO,
            json_format: false,
            with_target: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        level.to_string().to_lowercase().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}

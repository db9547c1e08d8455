//! # Configuration Management
//!
//! Centralized configuration for the protocol engine.
//!
//! This module provides structured configuration for framing limits,
//! compression, the outbound worker pool, and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Programmatic overrides via `default_with_overrides()`
//!
//! ## Security Considerations
//! - The maximum message size (default 2 MiB) bounds a hostile client's
//!   declared frame length before any payload is read.
//! - The bounded outbound queue caps the memory a slow client can pin.

use crate::error::{ProtocolError, Result};
use crate::utils::compression::CompressionKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Max declared length of a single length-prefixed message (2 MiB).
pub const MAX_MESSAGE_SIZE: usize = 2 * 1024 * 1024;

/// Default compression threshold in bytes when compression is enabled.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 256;

/// Default number of outbound worker tasks.
pub const DEFAULT_OUTBOUND_WORKERS: usize = 4;

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EngineConfig {
    /// Framing limits and decoder behavior
    #[serde(default)]
    pub framing: FramingConfig,

    /// Compression pipeline settings
    #[serde(default)]
    pub compression: CompressionConfig,

    /// Outbound orchestrator settings
    #[serde(default)]
    pub outbound: OutboundConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProtocolError::ConfigError(format!("failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("failed to parse TOML: {e}")))
    }

    /// Apply overrides to the default configuration.
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Validate the configuration for common issues and misconfigurations.
    ///
    /// Returns a list of validation errors. Empty list means the
    /// configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.framing.validate());
        errors.extend(self.compression.validate(self.framing.max_message_size));
        errors.extend(self.outbound.validate());
        errors
    }

    /// Validate and return Result - convenience method.
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Frame decoder limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FramingConfig {
    /// Maximum declared total message length; larger claims close the
    /// connection before any payload is read.
    pub max_message_size: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl FramingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_message_size == 0 {
            errors.push("max message size cannot be 0".to_string());
        } else if self.max_message_size > 100 * 1024 * 1024 {
            errors.push(format!(
                "max message size too large: {} bytes (maximum recommended: 100 MB)",
                self.max_message_size
            ));
        }

        errors
    }
}

/// Compression pipeline settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompressionConfig {
    /// Minimum serialized size (bytes) before a packet is compressed.
    /// `None` disables the compressed frame layout entirely.
    pub threshold: Option<usize>,

    /// Compression algorithm for packets at or above the threshold.
    pub kind: CompressionKind,

    /// Compression level (algorithm-specific, used by Zstd).
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold: None,
            kind: CompressionKind::Zstd,
            level: 1,
        }
    }
}

impl CompressionConfig {
    pub fn validate(&self, max_message_size: usize) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(threshold) = self.threshold {
            if threshold > max_message_size {
                errors.push("compression threshold cannot exceed max message size".to_string());
            }
        }

        if !(1..=22).contains(&self.level) {
            errors.push(format!(
                "invalid compression level: {} (valid range: 1-22)",
                self.level
            ));
        }

        errors
    }
}

/// Outbound orchestrator settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutboundConfig {
    /// Fixed number of worker tasks draining outbound queues.
    pub workers: usize,

    /// Maximum holders one connection may queue before it is kicked.
    pub max_queue_depth: usize,

    /// Upper bound on a worker's wait for a wake signal; the pool rechecks
    /// the ready list at least this often even if a signal is missed.
    #[serde(with = "duration_serde")]
    pub wake_interval: Duration,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_OUTBOUND_WORKERS,
            max_queue_depth: 4096,
            wake_interval: Duration::from_millis(100),
        }
    }
}

impl OutboundConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.workers == 0 {
            errors.push("outbound worker count must be greater than 0".to_string());
        } else if self.workers > 1024 {
            errors.push(format!(
                "outbound worker count very high: {} (ensure system resources can support this)",
                self.workers
            ));
        }

        if self.max_queue_depth == 0 {
            errors.push("max queue depth must be greater than 0".to_string());
        }

        if self.wake_interval.as_millis() < 10 {
            errors.push("wake interval too short (minimum: 10ms)".to_string());
        } else if self.wake_interval.as_secs() > 10 {
            errors.push("wake interval too long (maximum: 10s)".to_string());
        }

        errors
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("packet-engine"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

/// Helper module for Duration serialization/deserialization (milliseconds).
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

/// Helper module for tracing::Level serialization/deserialization.
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("invalid log level: {level_str}")))
    }
}

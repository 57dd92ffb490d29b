//! Configuration schema definitions.
//!
//! All sections use `#[serde(default)]` so a partial file fills in the rest.

use crate::actor::Variant;
use crate::port::PortOptions;
use crate::service::{IdleTimeout, ServiceOptions, DEFAULT_EVENT_BUFFER};
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Adapter construction settings
    pub adapter: AdapterConfig,
    /// Host requirement checks
    pub host: HostConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Adapter section. Fixed for the adapter's lifetime once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Calling convention and method naming
    pub variant: Variant,
    /// Port used when connect/open is called without a path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Idle auto-close in ms, or "Infinity". Interface variant only.
    pub timeout: IdleTimeout,
    /// Events buffered per subscriber
    pub event_buffer: usize,
    /// Port options used when connect/open is called without options
    pub options: PortOptions,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            variant: Variant::default(),
            path: None,
            timeout: IdleTimeout::Never,
            event_buffer: DEFAULT_EVENT_BUFFER,
            options: PortOptions::default(),
        }
    }
}

impl AdapterConfig {
    /// Service settings for this adapter. Only the interface variant auto-closes.
    pub fn service_options(&self) -> ServiceOptions {
        let idle_timeout = match self.variant {
            Variant::Interface => self.timeout,
            Variant::Module => IdleTimeout::Never,
        };
        ServiceOptions {
            idle_timeout,
            event_buffer: self.event_buffer,
        }
    }
}

/// Host section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Commands `assert` requires on PATH
    pub required_commands: Vec<String>,
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}

//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Message served when neither the environment nor the config file sets one.
pub const DEFAULT_MESSAGE: &str = "Hello World";

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address, shutdown grace).
    pub listener: ListenerConfig,

    /// Message endpoint settings.
    pub message: MessageConfig,

    /// Logging, metrics and tracing settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9000").
    pub bind_address: String,

    /// How long shutdown waits for pending log/trace work, in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9000".to_string(),
            shutdown_grace_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MessageConfig {
    /// Value seeded into the shared message at startup.
    pub initial: String,

    /// Artificial processing delay for `GET /message`, in milliseconds.
    pub read_delay_ms: u64,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            initial: DEFAULT_MESSAGE.to_string(),
            read_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Export request spans through the log exporter.
    pub tracing_enabled: bool,

    /// `service.name` resource attribute on spans.
    pub service_name: String,

    /// Deployment environment, attached to spans.
    pub environment: String,

    /// Prefix for metric names (`<prefix>_http_request_count`).
    pub metrics_prefix: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "debug".to_string(),
            log_format: LogFormat::Json,
            tracing_enabled: true,
            service_name: "micro-api".to_string(),
            environment: "development".to_string(),
            metrics_prefix: "microapi".to_string(),
        }
    }
}

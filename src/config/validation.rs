//! Configuration validation.
//!
//! Returns every problem found, not just the first.

use std::net::SocketAddr;

use crate::config::schema::ServiceConfig;

/// Upper bound for the simulated read delay.
const MAX_READ_DELAY_MS: u64 = 60_000;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.message.initial.trim().is_empty() {
        errors.push(ValidationError::new("message.initial", "must not be empty"));
    }
    if config.message.read_delay_ms > MAX_READ_DELAY_MS {
        errors.push(ValidationError::new(
            "message.read_delay_ms",
            format!("must be at most {MAX_READ_DELAY_MS}"),
        ));
    }
    if config.observability.metrics_prefix.is_empty()
        || !config
            .observability
            .metrics_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        errors.push(ValidationError::new(
            "observability.metrics_prefix",
            "must be non-empty and contain only [A-Za-z0-9_]",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

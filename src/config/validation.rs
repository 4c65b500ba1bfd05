//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ranges non-empty)
//! - Validate addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: {value:?} is not a socket address")]
    BadAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field}: range {min}..{max} is empty")]
    EmptyRange {
        field: &'static str,
        min: u64,
        max: u64,
    },
}

/// Check a parsed configuration, collecting every violation.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BadAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::BadAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let non_zero = [
        ("listener.max_connections", config.listener.max_connections as u64),
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.header_secs", config.timeouts.header_secs),
        ("timeouts.body_secs", config.timeouts.body_secs),
        ("timeouts.idle_secs", config.timeouts.idle_secs),
        ("limits.max_header_bytes", config.limits.max_header_bytes as u64),
        ("limits.buffer_size", config.limits.buffer_size as u64),
        ("obfuscation.first_chunk", config.obfuscation.first_chunk as u64),
        ("obfuscation.chunk_min", config.obfuscation.chunk_min as u64),
    ];
    for (field, value) in non_zero {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    let obfuscation = &config.obfuscation;
    if obfuscation.chunk_min >= obfuscation.chunk_max {
        errors.push(ValidationError::EmptyRange {
            field: "obfuscation.chunk_min/chunk_max",
            min: obfuscation.chunk_min as u64,
            max: obfuscation.chunk_max as u64,
        });
    }
    if obfuscation.delay_min_ms >= obfuscation.delay_max_ms {
        errors.push(ValidationError::EmptyRange {
            field: "obfuscation.delay_min_ms/delay_max_ms",
            min: obfuscation.delay_min_ms,
            max: obfuscation.delay_max_ms,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

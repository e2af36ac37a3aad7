//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, key sizes)
//! - Check that addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ServerConfig;

/// Smallest RSA modulus accepted for authority keys.
pub const MIN_KEY_BITS: usize = 1024;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),
    #[error("listener.max_connections must be greater than zero")]
    MaxConnections,
    #[error("dispatch.max_body_bytes must be greater than zero")]
    MaxBodyBytes,
    #[error("authority.key_bits must be at least 1024, got {0}")]
    KeyBits(usize),
    #[error("authority.validity_days must be greater than zero")]
    ValidityDays,
    #[error("observability.metrics_address `{0}` is not a socket address")]
    MetricsAddress(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::MaxConnections);
    }
    if config.dispatch.max_body_bytes == 0 {
        errors.push(ValidationError::MaxBodyBytes);
    }
    if config.authority.key_bits < MIN_KEY_BITS {
        errors.push(ValidationError::KeyBits(config.authority.key_bits));
    }
    if config.authority.validity_days == 0 {
        errors.push(ValidationError::ValidityDays);
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

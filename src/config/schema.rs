//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the test server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the signing test server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Dispatch behaviour (fault policy, body limits).
    pub dispatch: DispatchConfig,

    /// Certificate authority defaults used by the binary.
    pub authority: AuthorityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address. Port 0 lets the OS pick an ephemeral port.
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            max_connections: 1024,
        }
    }
}

/// What the dispatcher does after a responder fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Abort the connection without writing any response.
    #[default]
    DropConnection,
    /// Answer with an empty 500 response.
    InternalServerError,
}

/// Dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Behaviour after a responder error or panic.
    pub fault_policy: FaultPolicy,

    /// Upper bound on request bodies read by responders, in bytes.
    pub max_body_bytes: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            fault_policy: FaultPolicy::default(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Certificate authority settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Common name of the root authority.
    pub common_name: String,

    /// RSA modulus size for generated authority keys.
    pub key_bits: usize,

    /// Certificate validity in days.
    pub validity_days: u64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            common_name: "Test Root CA".to_string(),
            key_bits: 2048,
            validity_days: 365,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

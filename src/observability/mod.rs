//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher, registrations, authorities produce:
//!     → logging.rs (structured tracing events, EnvFilter)
//!     → metrics.rs (counters, histograms, registered-responder gauge)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Prometheus scrape endpoint (binary only, when enabled)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through the trace span of every request
//! - Metric updates go through the `metrics` facade and cost nothing without a recorder

pub mod logging;
pub mod metrics;

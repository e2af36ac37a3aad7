//! Loopback HTTP test server for signing and revocation-checking scenarios.
//!
//! A [`DispatchServer`] binds an ephemeral port and routes each request by
//! its first path segment to a registered [`Responder`]. The crate ships an
//! RFC 6960 OCSP responder, a certificate responder, and an in-memory
//! [`CertificateAuthority`] to drive them.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod ocsp;
pub mod pki;
pub mod responder;
pub mod routing;

pub use config::ServerConfig;
pub use http::{DispatchServer, ServerError};
pub use pki::CertificateAuthority;
pub use responder::Responder;
pub use routing::{Registration, RegistrationError};

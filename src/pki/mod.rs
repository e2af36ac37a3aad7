//! Test public key infrastructure.
//!
//! # Data Flow
//! ```text
//! create_root (self-signed)
//!     → create_intermediate (certified by its parent)
//!     → issue_certificate (leaf, serial recorded)
//!     → revoke / status (consulted by the OCSP responder)
//! ```

pub mod authority;

pub use authority::{
    generate_key, AuthorityError, AuthoritySettings, CertificateAuthority,
};
pub use x509_cert::ext::pkix::CrlReason;

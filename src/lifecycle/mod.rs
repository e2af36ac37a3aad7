//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! DispatchServer::start:
//!     Bind listener → resolve address → spawn accept loop
//!
//! DispatchServer::stop (or drop):
//!     shutdown.rs trigger → stop accepting → connections finish → exit
//! ```
//!
//! # Design Decisions
//! - Shutdown is one-shot; repeated stops are no-ops
//! - Late subscribers observe an earlier trigger

pub mod shutdown;

pub use shutdown::{Shutdown, ShutdownSignal};

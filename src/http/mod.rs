//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::Listener, permit + tracker guard)
//!     → server.rs (hyper auto connection, HTTP/1.1 or HTTP/2)
//!     → request ID + trace layers (request.rs)
//!     → dispatch.rs (routing key → responder, on its own task)
//!     → fault.rs on error or panic (observer, then fault policy)
//!     → Send to client, or drop the connection
//! ```

pub mod dispatch;
pub mod fault;
pub mod request;
pub mod server;

pub use dispatch::Dispatcher;
pub use fault::{DispatchFault, FaultObserver, LogFaultObserver};
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{DispatchServer, ServerError};

//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → matcher.rs (first segment → routing key)
//!     → router.rs (key → registered responder snapshot)
//!     → Return: responder or NoMatch
//!
//! Registration (at runtime, any thread):
//!     responder.url().path()
//!     → router.rs insert (last writer wins)
//!     → Registration handle (remove-if-still-mine on release)
//! ```
//!
//! # Design Decisions
//! - Routes are mutable at runtime, unlike a compiled router
//! - Single-segment keys only
//! - Explicit NoMatch rather than silent default

pub mod matcher;
pub mod router;

pub use matcher::{is_route_key, remainder, route_key};
pub use router::{Registration, RegistrationError, RouteTable};

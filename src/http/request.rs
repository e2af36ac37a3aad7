//! Request identification.
//!
//! # Responsibilities
//! - Name the request ID header set by the server's middleware stack
//! - Read the ID back for log correlation
//!
//! # Design Decisions
//! - Request ID added as early as possible (outermost layer) so the trace span carries it
//! - Incoming IDs are kept; only requests without one get a fresh UUID v4

use axum::http::{HeaderName, Request};

/// Header carrying the request ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Access to the request ID header.
pub trait RequestIdExt {
    /// The request ID, if present and valid UTF-8.
    fn request_id(&self) -> Option<&str>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&str> {
        self.headers()
            .get(&X_REQUEST_ID)
            .and_then(|value| value.to_str().ok())
    }
}

//! Handler faults and what happens after them.
//!
//! A fault is a responder returning an error or panicking. It never reaches
//! other requests: the dispatcher reports it to a [`FaultObserver`] and then
//! applies the configured [`FaultPolicy`](crate::config::FaultPolicy).

use crate::observability::metrics;
use crate::responder::ResponderError;

/// A responder failed while handling one request.
#[derive(Debug, thiserror::Error)]
pub enum DispatchFault {
    #[error("responder at {route} failed: {source}")]
    Responder {
        route: String,
        #[source]
        source: ResponderError,
    },
    #[error("responder at {route} panicked: {message}")]
    Panic { route: String, message: String },
    #[error("responder task at {route} was cancelled")]
    Cancelled { route: String },
}

impl DispatchFault {
    /// Routing key of the responder that faulted.
    pub fn route(&self) -> &str {
        match self {
            DispatchFault::Responder { route, .. }
            | DispatchFault::Panic { route, .. }
            | DispatchFault::Cancelled { route } => route,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchFault::Responder { .. } => "error",
            DispatchFault::Panic { .. } => "panic",
            DispatchFault::Cancelled { .. } => "cancelled",
        }
    }

    pub(crate) fn from_join_error(route: &str, error: tokio::task::JoinError) -> Self {
        if error.is_panic() {
            let payload = error.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            DispatchFault::Panic {
                route: route.to_string(),
                message,
            }
        } else {
            DispatchFault::Cancelled {
                route: route.to_string(),
            }
        }
    }
}

/// Receives every fault before the fault policy is applied.
pub trait FaultObserver: Send + Sync {
    fn on_fault(&self, fault: &DispatchFault);
}

/// Default observer: logs the fault and counts it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFaultObserver;

impl FaultObserver for LogFaultObserver {
    fn on_fault(&self, fault: &DispatchFault) {
        tracing::error!(route = %fault.route(), kind = fault.kind(), error = %fault, "Responder fault");
        metrics::record_fault(fault.route(), fault.kind());
    }
}

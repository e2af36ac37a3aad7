//! Per-request dispatch.
//!
//! # Responsibilities
//! - Map the request path to a registered responder
//! - Run the responder on its own task so faults stay with its request
//! - Apply the fault policy and record metrics
//!
//! # Design Decisions
//! - A routing miss is a plain 404, not a fault
//! - The route table is consulted once per request; a responder released
//!   mid-request finishes that request
//! - Dropping the dispatch (client gone, connection aborted) aborts the
//!   responder task

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use tokio::task::{JoinError, JoinHandle};

use crate::config::{DispatchConfig, FaultPolicy};
use crate::http::fault::{DispatchFault, FaultObserver};
use crate::http::request::RequestIdExt;
use crate::observability::metrics;
use crate::responder::{empty_response, BodyLimit};
use crate::routing::RouteTable;

/// Routes requests to responders. Cheap to clone; one clone per connection.
#[derive(Clone)]
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    fault_policy: FaultPolicy,
    max_body_bytes: usize,
    observer: Arc<dyn FaultObserver>,
}

impl Dispatcher {
    pub fn new(
        routes: Arc<RouteTable>,
        config: &DispatchConfig,
        observer: Arc<dyn FaultObserver>,
    ) -> Self {
        Self {
            routes,
            fault_policy: config.fault_policy,
            max_body_bytes: config.max_body_bytes,
            observer,
        }
    }

    /// Handle one request.
    ///
    /// An `Err` means the fault policy asked for the connection to be
    /// dropped without a response.
    pub async fn dispatch(&self, mut request: Request<Body>) -> Result<Response<Body>, DispatchFault> {
        let start = Instant::now();
        let request_id = request.request_id().unwrap_or("unknown").to_string();

        let Some((key, responder)) = self.routes.lookup(request.uri().path()) else {
            tracing::warn!(
                request_id = %request_id,
                method = %request.method(),
                path = %request.uri().path(),
                "No responder registered"
            );
            metrics::record_miss();
            return Ok(empty_response(StatusCode::NOT_FOUND));
        };
        let route = key.to_string();

        tracing::debug!(
            request_id = %request_id,
            method = %request.method(),
            route = %route,
            "Dispatching request"
        );

        request.extensions_mut().insert(BodyLimit(self.max_body_bytes));
        let task = tokio::spawn(async move { responder.respond(request).await });
        let outcome = ResponderTask(task).await;

        let fault = match outcome {
            Ok(Ok(response)) => {
                metrics::record_request(&route, response.status().as_u16(), start);
                return Ok(response);
            }
            Ok(Err(source)) => DispatchFault::Responder {
                route: route.clone(),
                source,
            },
            Err(join_error) => DispatchFault::from_join_error(&route, join_error),
        };

        self.observer.on_fault(&fault);
        match self.fault_policy {
            FaultPolicy::DropConnection => Err(fault),
            FaultPolicy::InternalServerError => {
                metrics::record_request(&route, StatusCode::INTERNAL_SERVER_ERROR.as_u16(), start);
                Ok(empty_response(StatusCode::INTERNAL_SERVER_ERROR))
            }
        }
    }
}

/// Join handle that aborts its task when dropped before completion.
struct ResponderTask<T>(JoinHandle<T>);

impl<T> Future for ResponderTask<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for ResponderTask<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

//! Dispatch server.
//!
//! # Responsibilities
//! - Bind an ephemeral loopback listener and accept connections
//! - Serve HTTP/1.1 and HTTP/2 on each connection via hyper
//! - Wire up middleware (request ID, tracing)
//! - Own the route table and hand out registrations
//! - Stop once, on request or on drop

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use url::Url;

use crate::config::ServerConfig;
use crate::http::dispatch::Dispatcher;
use crate::http::fault::{FaultObserver, LogFaultObserver};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::responder::Responder;
use crate::routing::{is_route_key, Registration, RegistrationError, RouteTable};

/// How long `stop` waits for open connections to finish before aborting them.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Fatal failure to start the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// HTTP server that routes each request to the responder registered at its first path segment.
pub struct DispatchServer {
    routes: Arc<RouteTable>,
    local_addr: SocketAddr,
    url: OnceLock<Url>,
    shutdown: Shutdown,
    connections: ConnectionTracker,
    accept_task: Mutex<Option<JoinHandle<JoinSet<()>>>>,
}

impl DispatchServer {
    /// Bind and start serving with the default fault observer.
    pub async fn start(config: &ServerConfig) -> Result<Self, ServerError> {
        Self::start_with_observer(config, Arc::new(LogFaultObserver)).await
    }

    /// Bind and start serving; every handler fault is reported to `observer`.
    pub async fn start_with_observer(
        config: &ServerConfig,
        observer: Arc<dyn FaultObserver>,
    ) -> Result<Self, ServerError> {
        let listener = Listener::bind(&config.listener).await?;
        let local_addr = listener.local_addr();

        let routes = Arc::new(RouteTable::new());
        let dispatcher = Dispatcher::new(Arc::clone(&routes), &config.dispatch, observer);
        let shutdown = Shutdown::new();
        let connections = ConnectionTracker::new();

        let accept_task = tokio::spawn(accept_loop(
            listener,
            dispatcher,
            connections.clone(),
            shutdown.subscribe(),
        ));

        tracing::info!(
            address = %local_addr,
            fault_policy = ?config.dispatch.fault_policy,
            "Dispatch server started"
        );

        Ok(Self {
            routes,
            local_addr,
            url: OnceLock::new(),
            shutdown,
            connections,
            accept_task: Mutex::new(Some(accept_task)),
        })
    }

    /// The socket address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL of the server, `http://{local_addr}/`. Computed once.
    pub fn url(&self) -> &Url {
        self.url.get_or_init(|| {
            Url::parse(&format!("http://{}/", self.local_addr))
                .expect("a bound socket address always forms a valid base URL")
        })
    }

    /// Route requests under `responder.url().path()` to `responder`.
    ///
    /// A responder already registered at the same path is replaced. The
    /// returned handle removes this registration (and only this one) when
    /// released or dropped.
    pub fn register(&self, responder: Arc<dyn Responder>) -> Result<Registration, RegistrationError> {
        let path = responder.url().path().to_string();
        if !is_route_key(&path) {
            return Err(RegistrationError::UnroutablePath(path));
        }
        let id = self.routes.insert(&path, responder);
        metrics::set_registered(self.routes.len());
        tracing::debug!(path = %path, entry = id, "Responder registered");
        Ok(Registration::new(&self.routes, path, id))
    }

    /// Paths that currently have a responder.
    pub fn registered_paths(&self) -> Vec<String> {
        self.routes.paths()
    }

    /// Number of connections currently open.
    pub fn active_connections(&self) -> u64 {
        self.connections.active_count()
    }

    /// Stop accepting connections and wind down open ones. Safe to call repeatedly.
    ///
    /// Connections still open after the drain timeout are aborted, which also
    /// cancels any responder they are waiting on.
    pub async fn stop(&self) {
        if self.shutdown.trigger() {
            tracing::info!(address = %self.local_addr, "Dispatch server stopping");
        }

        let Some(task) = self.accept_task.lock().await.take() else {
            return;
        };
        let mut connections = match task.await {
            Ok(connections) => connections,
            Err(e) => {
                tracing::error!(error = %e, "Accept loop ended abnormally");
                return;
            }
        };

        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            tracing::warn!(
                active = self.connections.active_count(),
                "Connections still open after drain timeout, aborting"
            );
            connections.abort_all();
            while connections.join_next().await.is_some() {}
        }
        tracing::info!(address = %self.local_addr, "Dispatch server stopped");
    }
}

impl Drop for DispatchServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

impl std::fmt::Debug for DispatchServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchServer")
            .field("local_addr", &self.local_addr)
            .field("routes", &self.routes.len())
            .field("stopped", &self.shutdown.is_triggered())
            .finish()
    }
}

async fn accept_loop(
    listener: Listener,
    dispatcher: Dispatcher,
    connections: ConnectionTracker,
    mut signal: ShutdownSignal,
) -> JoinSet<()> {
    let mut tasks = JoinSet::new();
    loop {
        let accepted = tokio::select! {
            _ = signal.recv() => break,
            Some(_) = tasks.join_next(), if !tasks.is_empty() => continue,
            accepted = listener.accept() => accepted,
        };
        let (stream, peer_addr, permit) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        let guard = connections.track();
        let dispatcher = dispatcher.clone();
        let signal = signal.clone();
        tasks.spawn(async move {
            let _permit = permit;
            tracing::trace!(connection_id = %guard.id(), peer_addr = %peer_addr, "Serving connection");
            serve_connection(stream, dispatcher, signal).await;
            drop(guard);
        });
    }
    tracing::debug!(
        address = %listener.local_addr(),
        open = tasks.len(),
        "Accept loop stopped"
    );
    tasks
}

async fn serve_connection(stream: TcpStream, dispatcher: Dispatcher, mut signal: ShutdownSignal) {
    let service = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .service_fn(move |request: Request<Incoming>| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.dispatch(request.map(Body::new)).await }
        });

    let builder = auto::Builder::new(TokioExecutor::new());
    let connection = builder.serve_connection(TokioIo::new(stream), TowerToHyperService::new(service));
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = signal.recv() => {
            connection.as_mut().graceful_shutdown();
            connection.as_mut().await
        }
    };
    // Includes connections aborted by the drop-connection fault policy.
    if let Err(e) = result {
        tracing::debug!(error = %e, "Connection closed with error");
    }
}

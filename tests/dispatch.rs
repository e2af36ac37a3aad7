//! Dispatch server behaviour over real connections.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use url::Url;

use signing_test_server::config::FaultPolicy;
use signing_test_server::http::{DispatchFault, FaultObserver, LogFaultObserver};
use signing_test_server::responder::{Responder, ResponderError};
use signing_test_server::{DispatchServer, RegistrationError, ServerConfig};

mod common;
use common::{client, get_text, start_server, start_server_with, TextResponder};

#[tokio::test]
async fn test_sub_paths_route_to_first_segment() {
    let server = start_server().await;
    let responder = TextResponder::new(server.url(), "/seg/", "seg");
    let _registration = server.register(responder.clone()).unwrap();
    let client = client();

    for path in ["/seg/", "/seg/anything", "/seg/anything/else"] {
        assert_eq!(get_text(&client, &server, path).await, (200, "seg".to_string()));
    }
    assert_eq!(responder.calls(), 3);

    let (status, body) = get_text(&client, &server, "/other/").await;
    assert_eq!(status, 404);
    assert!(body.is_empty());
    assert_eq!(get_text(&client, &server, "/seg").await.0, 404);

    server.stop().await;
}

#[tokio::test]
async fn test_release_unregisters() {
    let server = start_server().await;
    let client = client();
    let registration = server
        .register(TextResponder::new(server.url(), "/gone/", "here"))
        .unwrap();
    assert_eq!(get_text(&client, &server, "/gone/").await.0, 200);

    registration.release();
    assert_eq!(get_text(&client, &server, "/gone/").await.0, 404);
    assert!(server.registered_paths().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_last_writer_wins() {
    let server = start_server().await;
    let client = client();
    let first = TextResponder::new(server.url(), "/p/", "first");
    let second = TextResponder::new(server.url(), "/p/", "second");

    let first_registration = server.register(first.clone()).unwrap();
    let second_registration = server.register(second.clone()).unwrap();
    assert_eq!(get_text(&client, &server, "/p/x").await.1, "second");

    // The superseded handle must not remove the newer entry.
    first_registration.release();
    assert_eq!(get_text(&client, &server, "/p/x").await.1, "second");
    assert_eq!(first.calls(), 0);

    drop(second_registration);
    assert_eq!(get_text(&client, &server, "/p/x").await.0, 404);

    server.stop().await;
}

#[tokio::test]
async fn test_unroutable_paths_are_rejected() {
    let server = start_server().await;
    for path in ["/", "/a/b/", "/noslash"] {
        let result = server.register(TextResponder::new(server.url(), path, "x"));
        assert!(
            matches!(result, Err(RegistrationError::UnroutablePath(_))),
            "{path} should be rejected"
        );
    }
    assert!(server.registered_paths().is_empty());
    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_registration_and_dispatch() {
    let server = Arc::new(start_server().await);
    let stable = TextResponder::new(server.url(), "/stable/", "stable");
    let _stable_registration = server.register(stable.clone()).unwrap();

    let mut tasks = Vec::new();
    for worker in 0..8 {
        let server = Arc::clone(&server);
        tasks.push(tokio::spawn(async move {
            let path = format!("/churn-{worker}/");
            let text = format!("churn-{worker}");
            for _ in 0..20 {
                let registration = server
                    .register(TextResponder::new(server.url(), &path, &text))
                    .unwrap();
                tokio::task::yield_now().await;
                registration.release();
            }
        }));
    }
    for worker in 0..8 {
        let server = Arc::clone(&server);
        tasks.push(tokio::spawn(async move {
            let client = client();
            for _ in 0..10 {
                let (status, body) = get_text(&client, &server, "/stable/").await;
                assert_eq!((status, body.as_str()), (200, "stable"));

                let (status, body) = get_text(&client, &server, &format!("/churn-{worker}/")).await;
                assert!(
                    status == 404 || body == format!("churn-{worker}"),
                    "unexpected response {status} {body}"
                );
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(server.registered_paths(), vec!["/stable/".to_string()]);
    server.stop().await;
}

struct Faulty {
    url: Url,
    panic: bool,
}

#[async_trait]
impl Responder for Faulty {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn respond(&self, _request: Request<Body>) -> Result<Response<Body>, ResponderError> {
        if self.panic {
            panic!("responder exploded");
        }
        Err(ResponderError::Der(der::ErrorKind::Failed.into()))
    }
}

#[derive(Default)]
struct CountingObserver(AtomicUsize);

impl FaultObserver for CountingObserver {
    fn on_fault(&self, fault: &DispatchFault) {
        LogFaultObserver.on_fault(fault);
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_fault_drops_connection_and_isolates() {
    let observer = Arc::new(CountingObserver::default());
    let server = DispatchServer::start_with_observer(&ServerConfig::default(), observer.clone())
        .await
        .unwrap();
    let client = client();
    let _faulty = server
        .register(Arc::new(Faulty {
            url: server.url().join("/faulty/").unwrap(),
            panic: false,
        }))
        .unwrap();
    let _panicky = server
        .register(Arc::new(Faulty {
            url: server.url().join("/panicky/").unwrap(),
            panic: true,
        }))
        .unwrap();
    let _healthy = server
        .register(TextResponder::new(server.url(), "/healthy/", "ok"))
        .unwrap();

    for path in ["/faulty/", "/panicky/"] {
        let result = client.get(server.url().join(path).unwrap()).send().await;
        assert!(result.is_err(), "{path} should yield no response");
    }
    assert_eq!(observer.0.load(Ordering::SeqCst), 2);

    assert_eq!(get_text(&client, &server, "/healthy/").await, (200, "ok".to_string()));
    server.stop().await;
}

#[tokio::test]
async fn test_fault_as_internal_server_error() {
    let server = start_server_with(FaultPolicy::InternalServerError).await;
    let client = client();
    let _panicky = server
        .register(Arc::new(Faulty {
            url: server.url().join("/panicky/").unwrap(),
            panic: true,
        }))
        .unwrap();

    let (status, body) = get_text(&client, &server, "/panicky/").await;
    assert_eq!(status, 500);
    assert!(body.is_empty());
    server.stop().await;
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Never answers; flags entry and cancellation.
struct Hanging {
    url: Url,
    entered: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

#[async_trait]
impl Responder for Hanging {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn respond(&self, _request: Request<Body>) -> Result<Response<Body>, ResponderError> {
        let _flag = SetOnDrop(Arc::clone(&self.cancelled));
        self.entered.store(true, Ordering::SeqCst);
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_hung_responder_ties_up_only_its_request() {
    let server = start_server().await;
    let entered = Arc::new(AtomicBool::new(false));
    let cancelled = Arc::new(AtomicBool::new(false));
    let _hanging = server
        .register(Arc::new(Hanging {
            url: server.url().join("/hang/").unwrap(),
            entered: Arc::clone(&entered),
            cancelled: Arc::clone(&cancelled),
        }))
        .unwrap();
    let _healthy = server
        .register(TextResponder::new(server.url(), "/ok/", "ok"))
        .unwrap();
    let client = client();

    let hung = tokio::spawn({
        let client = client.clone();
        let url = server.url().join("/hang/").unwrap();
        async move { client.get(url).send().await }
    });
    tokio::time::timeout(Duration::from_secs(5), async {
        while !entered.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("hanging responder should be entered");

    assert_eq!(get_text(&client, &server, "/ok/").await, (200, "ok".to_string()));
    assert!(server.active_connections() >= 1);
    assert!(!hung.is_finished());

    // Drain gives up after five seconds and aborts what is left.
    tokio::time::timeout(Duration::from_secs(15), server.stop())
        .await
        .expect("stop should return while a responder hangs");
    assert_eq!(server.active_connections(), 0);

    tokio::time::timeout(Duration::from_secs(2), async {
        while !cancelled.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("hung responder should be cancelled by stop");
    assert!(hung.await.unwrap().is_err(), "hung request should get no response");
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let server = start_server().await;
    let _registration = server
        .register(TextResponder::new(server.url(), "/id/", "id"))
        .unwrap();
    let client = client();

    let response = client.get(server.url().join("/id/").unwrap()).send().await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));

    let response = client
        .get(server.url().join("/id/").unwrap())
        .header("x-request-id", "caller-chosen")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "caller-chosen");
    server.stop().await;
}

#[tokio::test]
async fn test_url_is_stable_and_stop_is_idempotent() {
    let server = start_server().await;
    let url = server.url().clone();
    assert_eq!(url.host_str(), Some("127.0.0.1"));
    assert_eq!(url.port(), Some(server.local_addr().port()));
    assert_eq!(url.path(), "/");
    assert!(std::ptr::eq(server.url(), server.url()));

    server.stop().await;
    server.stop().await;

    let result = client().get(url).send().await;
    assert!(result.is_err(), "listener should be closed after stop");
}

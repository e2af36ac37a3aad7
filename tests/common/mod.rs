//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use rsa::RsaPrivateKey;
use spki::SubjectPublicKeyInfoOwned;
use url::Url;
use x509_cert::Certificate;

use signing_test_server::config::{FaultPolicy, ServerConfig};
use signing_test_server::pki::{generate_key, AuthoritySettings, CertificateAuthority};
use signing_test_server::responder::{Responder, ResponderError};
use signing_test_server::DispatchServer;

/// Start a server on an ephemeral loopback port.
pub async fn start_server() -> DispatchServer {
    start_server_with(FaultPolicy::DropConnection).await
}

pub async fn start_server_with(policy: FaultPolicy) -> DispatchServer {
    let mut config = ServerConfig::default();
    config.dispatch.fault_policy = policy;
    DispatchServer::start(&config).await.unwrap()
}

/// Client without connection reuse, so every request opens a fresh connection.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Responder that answers every request with fixed text and counts calls.
pub struct TextResponder {
    url: Url,
    text: String,
    calls: AtomicUsize,
}

impl TextResponder {
    pub fn new(base: &Url, path: &str, text: &str) -> Arc<Self> {
        Arc::new(Self {
            url: base.join(path).unwrap(),
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Responder for TextResponder {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn respond(&self, _request: Request<Body>) -> Result<Response<Body>, ResponderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Response::new(Body::from(self.text.clone())))
    }
}

/// GET `path` relative to the server and return status and body text.
pub async fn get_text(client: &reqwest::Client, server: &DispatchServer, path: &str) -> (u16, String) {
    let response = client
        .get(server.url().join(path).unwrap())
        .send()
        .await
        .expect("server unreachable");
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}

fn keys() -> &'static [RsaPrivateKey] {
    static KEYS: OnceLock<Vec<RsaPrivateKey>> = OnceLock::new();
    KEYS.get_or_init(|| (0..3).map(|_| generate_key(1024).unwrap()).collect())
}

/// Root → intermediate → leaf, with URLs under the server's base URL.
pub struct Chain {
    pub root: Arc<CertificateAuthority>,
    pub intermediate: Arc<CertificateAuthority>,
    pub leaf: Certificate,
}

pub fn chain(base: &Url) -> Chain {
    let keys = keys();
    let root =
        CertificateAuthority::create_root(base, AuthoritySettings::new("Test Root"), keys[0].clone())
            .unwrap();
    let intermediate = root
        .create_intermediate(AuthoritySettings::new("Test Intermediate"), keys[1].clone())
        .unwrap();
    let leaf_key = SubjectPublicKeyInfoOwned::from_key(keys[2].to_public_key()).unwrap();
    let leaf = intermediate.issue_certificate("Test Leaf", leaf_key).unwrap();
    Chain {
        root,
        intermediate,
        leaf,
    }
}

//! Protocol responders.
//!
//! # Data Flow
//! ```text
//! Dispatcher (routing key matched)
//!     → Responder::respond(request) on its own task
//!     → base helpers (method classification, body read/write)
//!     → concrete responder (ocsp.rs, certificate.rs)
//!     → Response or ResponderError (fault)
//! ```
//!
//! # Design Decisions
//! - A responder's address never changes after construction
//! - Client mistakes are answered with 4xx, never returned as errors
//! - Errors are reserved for faults the dispatcher must isolate

pub mod certificate;
pub mod ocsp;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, response, HeaderMap, Method, Request, Response, StatusCode};
use url::Url;

pub use certificate::CertificateResponder;
pub use ocsp::OcspResponder;

/// Body limit applied when the dispatcher did not attach one.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// A protocol handler bound to one absolute URL.
///
/// The path of [`Responder::url`] is the routing key the responder is
/// registered under, so it must have the form `/segment/`.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Where this responder answers.
    fn url(&self) -> &Url;

    /// Consume one request and produce its complete response.
    ///
    /// Malformed requests should be answered with a 4xx response. An error
    /// means the responder itself failed; the dispatcher applies its fault
    /// policy to it.
    async fn respond(&self, request: Request<Body>) -> Result<Response<Body>, ResponderError>;
}

/// Failure while a responder was producing a response.
#[derive(Debug, thiserror::Error)]
pub enum ResponderError {
    #[error("failed to read request body: {0}")]
    Body(#[from] axum::Error),
    #[error("DER encoding failed: {0}")]
    Der(#[from] der::Error),
    #[error("signature algorithm unavailable: {0}")]
    Algorithm(#[from] spki::Error),
    #[error("signing failed: {0}")]
    Signing(#[from] rsa::signature::Error),
    #[error("failed to build response: {0}")]
    Http(#[from] axum::http::Error),
}

/// Request methods the base helpers recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
}

/// Classify a method token, ignoring ASCII case.
pub fn classify_method(method: &Method) -> Option<RequestMethod> {
    let token = method.as_str();
    if token.eq_ignore_ascii_case("GET") {
        Some(RequestMethod::Get)
    } else if token.eq_ignore_ascii_case("POST") {
        Some(RequestMethod::Post)
    } else {
        None
    }
}

pub fn is_get<B>(request: &Request<B>) -> bool {
    classify_method(request.method()) == Some(RequestMethod::Get)
}

pub fn is_post<B>(request: &Request<B>) -> bool {
    classify_method(request.method()) == Some(RequestMethod::Post)
}

/// The declared `Content-Length`, if present and well formed.
pub fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Maximum body size a responder may read, attached to each request by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimit(pub usize);

/// Why a raw body could not be read.
#[derive(Debug, thiserror::Error)]
pub enum ReadBodyError {
    #[error("request has no declared content length")]
    MissingLength,
    #[error("declared length {declared} exceeds limit {limit}")]
    TooLarge { declared: usize, limit: usize },
    #[error("body ended after {received} of {declared} bytes")]
    Truncated { declared: usize, received: usize },
    #[error(transparent)]
    Transport(#[from] axum::Error),
}

impl ReadBodyError {
    /// Whether the client caused the failure (as opposed to the transport).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ReadBodyError::Transport(_))
    }
}

/// Read the entire declared-length body. Chunked bodies without a length are rejected.
pub async fn read_body(request: Request<Body>) -> Result<Bytes, ReadBodyError> {
    let limit = request
        .extensions()
        .get::<BodyLimit>()
        .map(|limit| limit.0)
        .unwrap_or(DEFAULT_MAX_BODY_BYTES);
    let declared = content_length(request.headers()).ok_or(ReadBodyError::MissingLength)?;
    if declared > limit {
        return Err(ReadBodyError::TooLarge { declared, limit });
    }

    let bytes = axum::body::to_bytes(request.into_body(), declared).await?;
    if bytes.len() != declared {
        return Err(ReadBodyError::Truncated {
            declared,
            received: bytes.len(),
        });
    }
    Ok(bytes)
}

/// Finish `builder` with `bytes` as the body, declaring its exact length.
pub fn write_body(
    builder: response::Builder,
    bytes: impl Into<Bytes>,
) -> Result<Response<Body>, ResponderError> {
    let bytes = bytes.into();
    Ok(builder
        .header(header::CONTENT_LENGTH, bytes.len())
        .body(Body::from(bytes))?)
}

/// A bodiless response with the given status.
pub fn empty_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, header::HeaderValue::from_static("0"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_classification_ignores_case() {
        assert_eq!(classify_method(&Method::GET), Some(RequestMethod::Get));
        assert_eq!(classify_method(&Method::POST), Some(RequestMethod::Post));
        let lower = Method::from_bytes(b"get").unwrap();
        assert_eq!(classify_method(&lower), Some(RequestMethod::Get));
        let mixed = Method::from_bytes(b"PoSt").unwrap();
        assert_eq!(classify_method(&mixed), Some(RequestMethod::Post));
        assert_eq!(classify_method(&Method::PUT), None);
        assert_eq!(classify_method(&Method::HEAD), None);
    }

    #[tokio::test]
    async fn read_body_requires_length() {
        let request = Request::post("/x/").body(Body::from("abc")).unwrap();
        let err = read_body(request).await.unwrap_err();
        assert!(matches!(err, ReadBodyError::MissingLength));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn read_body_reads_declared_length() {
        let request = Request::post("/x/")
            .header(header::CONTENT_LENGTH, "3")
            .body(Body::from("abc"))
            .unwrap();
        assert_eq!(read_body(request).await.unwrap(), Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn read_body_honours_limit() {
        let mut request = Request::post("/x/")
            .header(header::CONTENT_LENGTH, "3")
            .body(Body::from("abc"))
            .unwrap();
        request.extensions_mut().insert(BodyLimit(2));
        assert!(matches!(
            read_body(request).await,
            Err(ReadBodyError::TooLarge { declared: 3, limit: 2 })
        ));
    }

    #[tokio::test]
    async fn read_body_detects_short_body() {
        let request = Request::post("/x/")
            .header(header::CONTENT_LENGTH, "5")
            .body(Body::from("abc"))
            .unwrap();
        assert!(matches!(
            read_body(request).await,
            Err(ReadBodyError::Truncated { declared: 5, received: 3 })
        ));
    }

    #[test]
    fn write_body_sets_length() {
        let response = write_body(Response::builder(), vec![1u8, 2, 3]).unwrap();
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "3");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn empty_response_has_zero_length() {
        let response = empty_response(StatusCode::BAD_REQUEST);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "0");
    }
}

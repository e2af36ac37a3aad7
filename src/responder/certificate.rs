//! Serves one DER certificate so clients can fetch an issuer by URL.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use der::Encode;
use url::Url;
use x509_cert::Certificate;

use super::{empty_response, is_get, write_body, Responder, ResponderError};

/// Content type of a single DER certificate.
pub const CERTIFICATE_CONTENT_TYPE: &str = "application/pkix-cert";

pub struct CertificateResponder {
    certificate: Certificate,
    url: Url,
}

impl CertificateResponder {
    pub fn new(certificate: Certificate, url: Url) -> Self {
        Self { certificate, url }
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }
}

#[async_trait]
impl Responder for CertificateResponder {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn respond(&self, request: Request<Body>) -> Result<Response<Body>, ResponderError> {
        if !is_get(&request) {
            return Ok(empty_response(StatusCode::METHOD_NOT_ALLOWED));
        }
        write_body(
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, CERTIFICATE_CONTENT_TYPE),
            self.certificate.to_der()?,
        )
    }
}

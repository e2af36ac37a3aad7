//! OCSP responder for one certificate authority.
//!
//! Accepts RFC 6960 requests as GET (`{url}{base64 DER}`) or POST
//! (`application/ocsp-request`), asks the authority for each certificate's
//! status and answers with a signed basic response. Anything it cannot
//! decode is answered with an empty 400.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use url::Url;

use super::{
    empty_response, is_get, is_post, read_body, write_body, ReadBodyError, Responder,
    ResponderError,
};
use crate::ocsp::codec::{decode_get_segment, is_request_content_type, RESPONSE_CONTENT_TYPE};
use crate::ocsp::request::{decode_request, find_nonce};
use crate::ocsp::response::{sign_response, ResponseParts};
use crate::pki::CertificateAuthority;
use crate::routing::{remainder, route_key};

/// Answers status queries for certificates issued by one authority.
pub struct OcspResponder {
    authority: Arc<CertificateAuthority>,
    url: Url,
}

impl OcspResponder {
    pub fn new(authority: Arc<CertificateAuthority>, url: Url) -> Self {
        Self { authority, url }
    }

    /// The authority whose certificates this responder reports on.
    pub fn authority(&self) -> &Arc<CertificateAuthority> {
        &self.authority
    }

    /// Extract the DER request, or `None` if the request is not a well-formed OCSP request.
    async fn request_der(&self, request: Request<Body>) -> Result<Option<Vec<u8>>, ResponderError> {
        if is_get(&request) {
            let path = request.uri().path();
            let segment = route_key(path).map(|key| remainder(path, key)).unwrap_or("");
            return Ok(decode_get_segment(segment));
        }

        if !is_post(&request) {
            return Ok(None);
        }
        let content_type_ok = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(is_request_content_type);
        if !content_type_ok {
            return Ok(None);
        }

        match read_body(request).await {
            Ok(bytes) => Ok(Some(bytes.to_vec())),
            Err(ReadBodyError::Transport(error)) => Err(ResponderError::Body(error)),
            Err(error) => {
                tracing::debug!(%error, "Rejected OCSP request body");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Responder for OcspResponder {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn respond(&self, request: Request<Body>) -> Result<Response<Body>, ResponderError> {
        let Some(der_bytes) = self.request_der(request).await? else {
            return Ok(empty_response(StatusCode::BAD_REQUEST));
        };
        let ocsp_request = match decode_request(&der_bytes) {
            Ok(ocsp_request) => ocsp_request,
            Err(error) => {
                tracing::debug!(%error, "Undecodable OCSP request");
                return Ok(empty_response(StatusCode::BAD_REQUEST));
            }
        };

        let tbs = &ocsp_request.tbs_request;
        let statuses = tbs
            .request_list
            .iter()
            .map(|request| {
                let status = self.authority.status(&request.req_cert);
                (request.req_cert.clone(), status)
            })
            .collect();

        let der_response = sign_response(ResponseParts {
            signer_certificate: self.authority.certificate(),
            signing_key: self.authority.signing_key(),
            chain: self.authority.chain(),
            statuses,
            nonce: find_nonce(tbs.request_extensions.as_deref()),
            now: SystemTime::now(),
        })?;

        tracing::debug!(
            authority = %self.authority.id(),
            queries = tbs.request_list.len(),
            "OCSP response signed"
        );
        write_body(
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, RESPONSE_CONTENT_TYPE),
            der_response,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocsp::codec::{encode_get_segment, REQUEST_CONTENT_TYPE};
    use crate::ocsp::request::{cert_id, encode_request, CertIdHash};
    use crate::ocsp::response::decode_basic_response;
    use crate::pki::{generate_key, AuthoritySettings};
    use der::asn1::OctetString;
    use der::Decode;
    use spki::SubjectPublicKeyInfoOwned;
    use std::sync::OnceLock;
    use x509_cert::Certificate;
    use x509_ocsp::CertStatus;

    struct Fixture {
        authority: Arc<CertificateAuthority>,
        leaf: Certificate,
    }

    fn fixture() -> &'static Fixture {
        static FIXTURE: OnceLock<Fixture> = OnceLock::new();
        FIXTURE.get_or_init(|| {
            let base = Url::parse("http://127.0.0.1:9/").unwrap();
            let authority = CertificateAuthority::create_root(
                &base,
                AuthoritySettings::new("Responder Test Root"),
                generate_key(1024).unwrap(),
            )
            .unwrap();
            let spki =
                SubjectPublicKeyInfoOwned::from_key(generate_key(1024).unwrap().to_public_key()).unwrap();
            let leaf = authority.issue_certificate("leaf", spki).unwrap();
            Fixture { authority, leaf }
        })
    }

    fn request_der(nonce: Option<&[u8]>) -> Vec<u8> {
        let f = fixture();
        let id = cert_id(f.authority.certificate(), &f.leaf, CertIdHash::Sha1).unwrap();
        encode_request(vec![id], nonce).unwrap()
    }

    async fn body_of(response: Response<Body>) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn get_request_is_answered() {
        let responder = fixture().authority.ocsp_responder();
        let path = format!(
            "{}{}",
            responder.url().path(),
            encode_get_segment(&request_der(None), true)
        );
        let response = responder
            .respond(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], RESPONSE_CONTENT_TYPE);
        let basic = decode_basic_response(&body_of(response).await).unwrap();
        assert_eq!(basic.tbs_response_data.responses.len(), 1);
        assert!(matches!(
            basic.tbs_response_data.responses[0].cert_status,
            CertStatus::Good(_)
        ));
    }

    #[tokio::test]
    async fn post_request_echoes_nonce() {
        let responder = fixture().authority.ocsp_responder();
        let der_bytes = request_der(Some(b"abc"));
        let request = Request::post(responder.url().path())
            .header(header::CONTENT_TYPE, REQUEST_CONTENT_TYPE)
            .header(header::CONTENT_LENGTH, der_bytes.len())
            .body(Body::from(der_bytes))
            .unwrap();
        let response = responder.respond(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let basic = decode_basic_response(&body_of(response).await).unwrap();
        let extensions = basic.tbs_response_data.response_extensions.unwrap();
        assert_eq!(extensions.len(), 1);
        assert!(!extensions[0].critical);
        let nonce = OctetString::from_der(extensions[0].extn_value.as_bytes()).unwrap();
        assert_eq!(nonce.as_bytes(), b"abc");
    }

    #[tokio::test]
    async fn wrong_content_type_is_bad_request() {
        let responder = fixture().authority.ocsp_responder();
        let der_bytes = request_der(None);
        let request = Request::post(responder.url().path())
            .header(header::CONTENT_TYPE, "text/plain")
            .header(header::CONTENT_LENGTH, der_bytes.len())
            .body(Body::from(der_bytes))
            .unwrap();
        let response = responder.respond(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_of(response).await.is_empty());
    }

    #[tokio::test]
    async fn malformed_input_is_bad_request() {
        let responder = fixture().authority.ocsp_responder();
        let base = responder.url().path().to_string();

        for path in [base.clone(), format!("{base}not-base64!"), format!("{base}AAAA")] {
            let response = responder
                .respond(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        let response = responder
            .respond(Request::put(base).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn post_without_length_is_bad_request() {
        let responder = fixture().authority.ocsp_responder();
        assert_eq!(responder.authority().id(), fixture().authority.id());

        let request = Request::post(responder.url().path())
            .header(header::CONTENT_TYPE, REQUEST_CONTENT_TYPE)
            .body(Body::from(request_der(None)))
            .unwrap();
        assert!(request.headers().get(header::CONTENT_LENGTH).is_none());

        let response = responder.respond(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_of(response).await.is_empty());
    }
}

//! Basic OCSP response assembly, signing and inspection.
//!
//! # Responsibilities
//! - Turn per-certificate statuses into a signed `BasicOCSPResponse`
//! - Echo the request nonce, marked non-critical
//! - Wrap the result in a `successful` `OCSPResponse` envelope
//!
//! # Design Decisions
//! - Times are whole seconds; `nextUpdate` is exactly one second after `thisUpdate`
//! - The signature algorithm is fixed to sha256WithRSAEncryption

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use const_oid::db::rfc6960::ID_PKIX_OCSP_BASIC;
use der::asn1::{BitString, GeneralizedTime, OctetString};
use der::{Decode, Encode};
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use sha2::Sha256;
use spki::DynSignatureAlgorithmIdentifier;
use x509_cert::ext::Extension;
use x509_cert::Certificate;
use x509_ocsp::{
    BasicOcspResponse, CertId, CertStatus, OcspGeneralizedTime, OcspResponse, OcspResponseStatus,
    ResponderId, ResponseBytes, ResponseData, SingleResponse, Version,
};

use crate::responder::ResponderError;

/// Validity window of every single response.
pub const RESPONSE_LIFETIME: Duration = Duration::from_secs(1);

/// Convert a whole-second point in time to the OCSP time type.
pub fn ocsp_time(time: SystemTime) -> der::Result<OcspGeneralizedTime> {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map_err(|_| der::Error::from(der::ErrorKind::DateTime))?
        .as_secs();
    Ok(OcspGeneralizedTime(GeneralizedTime::from_unix_duration(
        Duration::from_secs(secs),
    )?))
}

/// Inputs of one signed response.
pub struct ResponseParts<'a> {
    /// Signing certificate; its subject becomes the responder id.
    pub signer_certificate: &'a Certificate,
    /// Key the response is signed with.
    pub signing_key: &'a SigningKey<Sha256>,
    /// Certificates attached for signature validation, signer first.
    pub chain: Vec<Certificate>,
    /// One status per query, in request order.
    pub statuses: Vec<(CertId, CertStatus)>,
    /// Request nonce to echo, if any.
    pub nonce: Option<&'a Extension>,
    /// Production time; `thisUpdate` for every status.
    pub now: SystemTime,
}

/// Build the unsigned response data.
pub fn response_data(parts: &ResponseParts<'_>) -> der::Result<ResponseData> {
    let this_update = ocsp_time(parts.now)?;
    let next_update = ocsp_time(parts.now + RESPONSE_LIFETIME)?;

    let responses = parts
        .statuses
        .iter()
        .map(|(cert_id, cert_status)| SingleResponse {
            cert_id: cert_id.clone(),
            cert_status: cert_status.clone(),
            this_update: this_update.clone(),
            next_update: Some(next_update.clone()),
            single_extensions: None,
        })
        .collect();

    let response_extensions = parts.nonce.map(|nonce| {
        vec![Extension {
            extn_id: nonce.extn_id,
            critical: false,
            extn_value: nonce.extn_value.clone(),
        }]
    });

    Ok(ResponseData {
        version: Version::V1,
        responder_id: ResponderId::ByName(parts.signer_certificate.tbs_certificate.subject.clone()),
        produced_at: this_update,
        responses,
        response_extensions,
    })
}

/// Sign the response data and wrap it in a successful envelope; returns DER.
pub fn sign_response(parts: ResponseParts<'_>) -> Result<Vec<u8>, ResponderError> {
    let tbs_response_data = response_data(&parts)?;
    let signature_algorithm = parts.signing_key.signature_algorithm_identifier()?;
    let signature = parts.signing_key.try_sign(&tbs_response_data.to_der()?)?;

    let basic = BasicOcspResponse {
        tbs_response_data,
        signature_algorithm,
        signature: BitString::from_bytes(&signature.to_vec())?,
        certs: Some(parts.chain),
    };

    let envelope = OcspResponse {
        response_status: OcspResponseStatus::Successful,
        response_bytes: Some(ResponseBytes {
            response_type: ID_PKIX_OCSP_BASIC,
            response: OctetString::new(basic.to_der()?)?,
        }),
    };
    Ok(envelope.to_der()?)
}

/// Failure to read a response produced by a responder.
#[derive(Debug, thiserror::Error)]
pub enum DecodeResponseError {
    #[error(transparent)]
    Der(#[from] der::Error),
    #[error("response status is {0:?}")]
    Unsuccessful(OcspResponseStatus),
    #[error("response carries no basic response bytes")]
    MissingBody,
}

/// Unwrap a DER `OCSPResponse` down to its basic response.
pub fn decode_basic_response(der_bytes: &[u8]) -> Result<BasicOcspResponse, DecodeResponseError> {
    let envelope = OcspResponse::from_der(der_bytes)?;
    if envelope.response_status != OcspResponseStatus::Successful {
        return Err(DecodeResponseError::Unsuccessful(envelope.response_status));
    }
    let bytes = envelope
        .response_bytes
        .filter(|bytes| bytes.response_type == ID_PKIX_OCSP_BASIC)
        .ok_or(DecodeResponseError::MissingBody)?;
    Ok(BasicOcspResponse::from_der(bytes.response.as_bytes())?)
}

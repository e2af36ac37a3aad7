//! OCSP request construction and inspection.

use const_oid::db::rfc5912::{ID_SHA_1, ID_SHA_256};
use const_oid::db::rfc6960::ID_PKIX_OCSP_NONCE;
use der::asn1::OctetString;
use der::{Decode, Encode};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::Extension;
use x509_cert::Certificate;
use x509_ocsp::{CertId, OcspRequest, Request, TbsRequest, Version};

/// Digest used for the issuer hashes of a [`CertId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertIdHash {
    Sha1,
    Sha256,
}

impl CertIdHash {
    /// The hash identified by `oid`, if supported.
    pub fn from_oid(oid: &const_oid::ObjectIdentifier) -> Option<Self> {
        if *oid == ID_SHA_1 {
            Some(CertIdHash::Sha1)
        } else if *oid == ID_SHA_256 {
            Some(CertIdHash::Sha256)
        } else {
            None
        }
    }

    fn oid(self) -> const_oid::ObjectIdentifier {
        match self {
            CertIdHash::Sha1 => ID_SHA_1,
            CertIdHash::Sha256 => ID_SHA_256,
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            CertIdHash::Sha1 => Sha1::digest(data).to_vec(),
            CertIdHash::Sha256 => Sha256::digest(data).to_vec(),
        }
    }
}

/// Issuer name and key hashes of an issuing certificate.
pub fn issuer_hashes(issuer: &Certificate, hash: CertIdHash) -> der::Result<(Vec<u8>, Vec<u8>)> {
    let name = issuer.tbs_certificate.subject.to_der()?;
    let key = issuer
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .raw_bytes();
    Ok((hash.digest(&name), hash.digest(key)))
}

/// Identify `certificate`, issued by `issuer`, for a status query.
pub fn cert_id(issuer: &Certificate, certificate: &Certificate, hash: CertIdHash) -> der::Result<CertId> {
    let (name_hash, key_hash) = issuer_hashes(issuer, hash)?;
    Ok(CertId {
        hash_algorithm: AlgorithmIdentifierOwned {
            oid: hash.oid(),
            parameters: None,
        },
        issuer_name_hash: OctetString::new(name_hash)?,
        issuer_key_hash: OctetString::new(key_hash)?,
        serial_number: certificate.tbs_certificate.serial_number.clone(),
    })
}

/// Nonce request extension; the value is the DER OCTET STRING of `nonce`.
pub fn nonce_extension(nonce: &[u8]) -> der::Result<Extension> {
    Ok(Extension {
        extn_id: ID_PKIX_OCSP_NONCE,
        critical: false,
        extn_value: OctetString::new(OctetString::new(nonce)?.to_der()?)?,
    })
}

/// Build an unsigned request for `cert_ids`, with an optional nonce.
pub fn build_request(cert_ids: Vec<CertId>, nonce: Option<&[u8]>) -> der::Result<OcspRequest> {
    let request_extensions = match nonce {
        Some(nonce) => Some(vec![nonce_extension(nonce)?]),
        None => None,
    };
    Ok(OcspRequest {
        tbs_request: TbsRequest {
            version: Version::V1,
            requestor_name: None,
            request_list: cert_ids
                .into_iter()
                .map(|req_cert| Request {
                    req_cert,
                    single_request_extensions: None,
                })
                .collect(),
            request_extensions,
        },
        optional_signature: None,
    })
}

/// DER encoding of [`build_request`].
pub fn encode_request(cert_ids: Vec<CertId>, nonce: Option<&[u8]>) -> der::Result<Vec<u8>> {
    build_request(cert_ids, nonce)?.to_der()
}

/// Parse a DER request.
pub fn decode_request(der_bytes: &[u8]) -> der::Result<OcspRequest> {
    OcspRequest::from_der(der_bytes)
}

/// The nonce extension of a request, exactly as sent.
pub fn find_nonce(extensions: Option<&[Extension]>) -> Option<&Extension> {
    extensions?
        .iter()
        .find(|extension| extension.extn_id == ID_PKIX_OCSP_NONCE)
}

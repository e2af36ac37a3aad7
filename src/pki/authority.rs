//! In-memory certificate authority.
//!
//! # Responsibilities
//! - Create root and intermediate authority certificates
//! - Issue leaf certificates and remember their serial numbers
//! - Track revocations and answer status queries by CertID
//! - Expose the chain toward the root and the signing key
//!
//! # Design Decisions
//! - Children hold a strong reference to their parent; parents never reference children
//! - Keys are supplied by the caller (see [`generate_key`])
//! - A CertID is only answered when its issuer hashes match this authority

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use der::asn1::Null;
use rand::Rng;
use rsa::pkcs1v15::SigningKey;
use rsa::RsaPrivateKey;
use sha2::Sha256;
use spki::SubjectPublicKeyInfoOwned;
use url::Url;
use uuid::Uuid;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::ext::pkix::CrlReason;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Validity;
use x509_cert::Certificate;
use x509_ocsp::{CertId, CertStatus, RevokedInfo};

use crate::config::AuthorityConfig;
use crate::ocsp::request::{issuer_hashes, CertIdHash};
use crate::ocsp::response::ocsp_time;
use crate::responder::{CertificateResponder, OcspResponder};

/// Errors raised while building authorities and certificates.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    #[error("key generation failed: {0}")]
    Key(#[from] rsa::Error),
    #[error("public key encoding failed: {0}")]
    Spki(#[from] spki::Error),
    #[error("certificate encoding failed: {0}")]
    Der(#[from] der::Error),
    #[error("certificate builder failed: {0}")]
    Builder(#[from] x509_cert::builder::Error),
    #[error("authority URL could not be derived: {0}")]
    Url(#[from] url::ParseError),
    #[error("serial number {0} was not issued by this authority")]
    UnknownSerial(String),
}

/// Generate an RSA key pair for an authority or a leaf.
pub fn generate_key(bits: usize) -> Result<RsaPrivateKey, AuthorityError> {
    Ok(RsaPrivateKey::new(&mut rand::thread_rng(), bits)?)
}

/// Settings of one authority certificate.
#[derive(Debug, Clone)]
pub struct AuthoritySettings {
    /// Subject common name.
    pub common_name: String,
    /// Lifetime of certificates this authority creates.
    pub validity: Duration,
}

impl AuthoritySettings {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            validity: Duration::from_secs(365 * 24 * 60 * 60),
        }
    }
}

impl From<&AuthorityConfig> for AuthoritySettings {
    fn from(config: &AuthorityConfig) -> Self {
        Self {
            common_name: config.common_name.clone(),
            validity: Duration::from_secs(config.validity_days * 24 * 60 * 60),
        }
    }
}

/// Revocation state of an issued serial number.
#[derive(Debug, Clone, PartialEq)]
enum IssuedState {
    Valid,
    Revoked {
        at: SystemTime,
        reason: Option<CrlReason>,
    },
}

/// Issuer hashes this authority answers CertIDs for.
#[derive(Debug, Clone)]
struct IssuerIdentity {
    sha1: (Vec<u8>, Vec<u8>),
    sha256: (Vec<u8>, Vec<u8>),
}

impl IssuerIdentity {
    fn of(certificate: &Certificate) -> der::Result<Self> {
        Ok(Self {
            sha1: issuer_hashes(certificate, CertIdHash::Sha1)?,
            sha256: issuer_hashes(certificate, CertIdHash::Sha256)?,
        })
    }

    fn matches(&self, cert_id: &CertId) -> bool {
        let expected = match CertIdHash::from_oid(&cert_id.hash_algorithm.oid) {
            Some(CertIdHash::Sha1) => &self.sha1,
            Some(CertIdHash::Sha256) => &self.sha256,
            None => return false,
        };
        cert_id.issuer_name_hash.as_bytes() == expected.0.as_slice()
            && cert_id.issuer_key_hash.as_bytes() == expected.1.as_slice()
    }
}

/// A certificate authority that can issue, revoke and report status.
pub struct CertificateAuthority {
    id: Uuid,
    certificate: Certificate,
    key_pair: RsaPrivateKey,
    signing_key: SigningKey<Sha256>,
    parent: Option<Arc<CertificateAuthority>>,
    settings: AuthoritySettings,
    base_url: Url,
    certificate_url: Url,
    ocsp_url: Url,
    identity: IssuerIdentity,
    issued: DashMap<Vec<u8>, IssuedState>,
}

impl CertificateAuthority {
    /// Create a self-signed root authority whose URLs live under `base_url`.
    pub fn create_root(
        base_url: &Url,
        settings: AuthoritySettings,
        key_pair: RsaPrivateKey,
    ) -> Result<Arc<Self>, AuthorityError> {
        let signing_key = SigningKey::<Sha256>::new(key_pair.clone());
        let subject = subject_name(&settings.common_name)?;
        let certificate = build_certificate(
            Profile::Root,
            subject,
            &key_pair,
            settings.validity,
            &signing_key,
        )?;
        let authority = Self::assemble(base_url, certificate, key_pair, signing_key, None, settings)?;
        tracing::info!(
            authority = %authority.id,
            subject = %authority.certificate.tbs_certificate.subject,
            "Root authority created"
        );
        Ok(Arc::new(authority))
    }

    /// Create an intermediate authority certified by `self`.
    pub fn create_intermediate(
        self: &Arc<Self>,
        settings: AuthoritySettings,
        key_pair: RsaPrivateKey,
    ) -> Result<Arc<Self>, AuthorityError> {
        let subject = subject_name(&settings.common_name)?;
        let certificate = build_certificate(
            Profile::SubCA {
                issuer: self.subject().clone(),
                path_len_constraint: None,
            },
            subject,
            &key_pair,
            self.settings.validity,
            &self.signing_key,
        )?;
        self.record_issued(&certificate);

        let signing_key = SigningKey::<Sha256>::new(key_pair.clone());
        let authority = Self::assemble(
            &self.base_url,
            certificate,
            key_pair,
            signing_key,
            Some(Arc::clone(self)),
            settings,
        )?;
        tracing::info!(
            authority = %authority.id,
            parent = %self.id,
            subject = %authority.certificate.tbs_certificate.subject,
            "Intermediate authority created"
        );
        Ok(Arc::new(authority))
    }

    fn assemble(
        base_url: &Url,
        certificate: Certificate,
        key_pair: RsaPrivateKey,
        signing_key: SigningKey<Sha256>,
        parent: Option<Arc<CertificateAuthority>>,
        settings: AuthoritySettings,
    ) -> Result<Self, AuthorityError> {
        let id = Uuid::new_v4();
        let identity = IssuerIdentity::of(&certificate)?;
        Ok(Self {
            id,
            certificate_url: base_url.join(&format!("{id}/"))?,
            ocsp_url: base_url.join(&format!("ocsp-{id}/"))?,
            base_url: base_url.clone(),
            certificate,
            key_pair,
            signing_key,
            parent,
            settings,
            identity,
            issued: DashMap::new(),
        })
    }

    /// Issue a leaf certificate for `common_name` over the given public key.
    pub fn issue_certificate(
        &self,
        common_name: &str,
        subject_public_key: SubjectPublicKeyInfoOwned,
    ) -> Result<Certificate, AuthorityError> {
        let profile = Profile::Leaf {
            issuer: self.subject().clone(),
            enable_key_agreement: false,
            enable_key_encipherment: false,
        };
        let builder = CertificateBuilder::new(
            profile,
            random_serial()?,
            Validity::from_now(self.settings.validity)?,
            subject_name(common_name)?,
            subject_public_key,
            &self.signing_key,
        )?;
        let certificate = builder.build::<rsa::pkcs1v15::Signature>()?;
        self.record_issued(&certificate);
        tracing::debug!(
            authority = %self.id,
            serial = %serial_hex(&certificate.tbs_certificate.serial_number),
            "Certificate issued"
        );
        Ok(certificate)
    }

    fn record_issued(&self, certificate: &Certificate) {
        self.issued.insert(
            certificate.tbs_certificate.serial_number.as_bytes().to_vec(),
            IssuedState::Valid,
        );
    }

    /// Mark an issued certificate revoked as of now.
    pub fn revoke(
        &self,
        serial: &SerialNumber,
        reason: Option<CrlReason>,
    ) -> Result<(), AuthorityError> {
        let mut state = self
            .issued
            .get_mut(serial.as_bytes())
            .ok_or_else(|| AuthorityError::UnknownSerial(serial_hex(serial)))?;
        *state = IssuedState::Revoked {
            at: SystemTime::now(),
            reason,
        };
        tracing::info!(authority = %self.id, serial = %serial_hex(serial), ?reason, "Certificate revoked");
        Ok(())
    }

    /// Revocation status of the certificate identified by `cert_id`.
    pub fn status(&self, cert_id: &CertId) -> CertStatus {
        if !self.identity.matches(cert_id) {
            return CertStatus::Unknown(Null);
        }
        let Some(state) = self.issued.get(cert_id.serial_number.as_bytes()) else {
            return CertStatus::Unknown(Null);
        };
        match state.value() {
            IssuedState::Valid => CertStatus::Good(Null),
            IssuedState::Revoked { at, reason } => match ocsp_time(*at) {
                Ok(revocation_time) => CertStatus::Revoked(RevokedInfo {
                    revocation_time,
                    revocation_reason: *reason,
                }),
                Err(error) => {
                    tracing::warn!(%error, "Revocation time not representable");
                    CertStatus::Unknown(Null)
                }
            },
        }
    }

    /// Unique id; also the first path segment of this authority's URLs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// This authority's own certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn subject(&self) -> &Name {
        &self.certificate.tbs_certificate.subject
    }

    /// Issuing authority, or `None` for a root.
    pub fn parent(&self) -> Option<&Arc<CertificateAuthority>> {
        self.parent.as_ref()
    }

    /// Certificates from this authority up to the root, in that order.
    pub fn chain(&self) -> Vec<Certificate> {
        let mut chain = vec![self.certificate.clone()];
        let mut current = self.parent.as_ref();
        while let Some(authority) = current {
            chain.push(authority.certificate.clone());
            current = authority.parent.as_ref();
        }
        chain
    }

    pub fn key_pair(&self) -> &RsaPrivateKey {
        &self.key_pair
    }

    /// Key used to sign certificates and OCSP responses (sha256WithRSAEncryption).
    pub fn signing_key(&self) -> &SigningKey<Sha256> {
        &self.signing_key
    }

    /// Where the DER certificate of this authority is served.
    pub fn certificate_url(&self) -> &Url {
        &self.certificate_url
    }

    /// Where this authority's OCSP responder answers.
    pub fn ocsp_url(&self) -> &Url {
        &self.ocsp_url
    }

    /// OCSP responder answering for this authority at [`Self::ocsp_url`].
    pub fn ocsp_responder(self: &Arc<Self>) -> OcspResponder {
        OcspResponder::new(Arc::clone(self), self.ocsp_url.clone())
    }

    /// Responder serving this authority's certificate at [`Self::certificate_url`].
    pub fn certificate_responder(self: &Arc<Self>) -> CertificateResponder {
        CertificateResponder::new(self.certificate.clone(), self.certificate_url.clone())
    }
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("id", &self.id)
            .field("subject", &self.subject().to_string())
            .field("parent", &self.parent.as_ref().map(|p| p.id))
            .finish_non_exhaustive()
    }
}

fn subject_name(common_name: &str) -> Result<Name, AuthorityError> {
    Ok(Name::from_str(&format!("CN={common_name}"))?)
}

fn serial_hex(serial: &SerialNumber) -> String {
    serial.as_bytes().iter().map(|b| format!("{b:02x}")).collect()
}

/// Positive, minimally encoded 128-bit serial number.
fn random_serial() -> Result<SerialNumber, AuthorityError> {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes[..]);
    bytes[0] = (bytes[0] & 0x7f) | 0x01;
    Ok(SerialNumber::new(&bytes)?)
}

fn build_certificate(
    profile: Profile,
    subject: Name,
    subject_key: &RsaPrivateKey,
    validity: Duration,
    signer: &SigningKey<Sha256>,
) -> Result<Certificate, AuthorityError> {
    let spki = SubjectPublicKeyInfoOwned::from_key(subject_key.to_public_key())?;
    let builder = CertificateBuilder::new(
        profile,
        random_serial()?,
        Validity::from_now(validity)?,
        subject,
        spki,
        signer,
    )?;
    Ok(builder.build::<rsa::pkcs1v15::Signature>()?)
}

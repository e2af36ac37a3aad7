//! OCSP (RFC 6960) codec helpers shared by the responder and its clients.
//!
//! # Data Flow
//! ```text
//! Client side:   request.rs (CertId, nonce, DER request) → codec.rs (GET URL)
//! Server side:   codec.rs (GET segment / POST body) → request.rs (decode)
//!                → response.rs (statuses → signed DER response)
//! ```

pub mod codec;
pub mod request;
pub mod response;

pub use codec::{decode_get_segment, get_url, REQUEST_CONTENT_TYPE, RESPONSE_CONTENT_TYPE};
pub use request::{build_request, cert_id, encode_request, find_nonce, CertIdHash};
pub use response::{decode_basic_response, sign_response, DecodeResponseError, ResponseParts};

//! Transport encodings of OCSP requests (RFC 6960 appendix A).
//!
//! GET carries the DER request base64-encoded as the path segment after the
//! responder's base path. Clients are inconsistent about escaping `/` in that
//! segment: some send `%2F`, some send it literally, and URL normalisation
//! between them and us may undo either. Both forms decode to the same bytes.
//! No other percent-escape is decoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use url::Url;

/// Content type of a DER request body.
pub const REQUEST_CONTENT_TYPE: &str = "application/ocsp-request";
/// Content type of a DER response body.
pub const RESPONSE_CONTENT_TYPE: &str = "application/ocsp-response";

/// Normalise escaped slashes (`%2F`, `%2f`) to `/`.
pub fn normalize_slashes(segment: &str) -> String {
    segment.replace("%2F", "/").replace("%2f", "/")
}

/// Decode the base64 payload of a GET request path segment.
///
/// Returns `None` for an empty segment or invalid base64.
pub fn decode_get_segment(segment: &str) -> Option<Vec<u8>> {
    if segment.is_empty() {
        return None;
    }
    STANDARD.decode(normalize_slashes(segment)).ok()
}

/// Base64 path segment for a DER request, optionally escaping `/` as `%2F`.
pub fn encode_get_segment(request_der: &[u8], escape_slashes: bool) -> String {
    let encoded = STANDARD.encode(request_der);
    if escape_slashes {
        encoded.replace('/', "%2F")
    } else {
        encoded
    }
}

/// Full GET URL for `request_der` sent to the responder at `responder_url`.
pub fn get_url(
    responder_url: &Url,
    request_der: &[u8],
    escape_slashes: bool,
) -> Result<Url, url::ParseError> {
    let base = responder_url.as_str();
    let separator = if base.ends_with('/') { "" } else { "/" };
    Url::parse(&format!(
        "{base}{separator}{}",
        encode_get_segment(request_der, escape_slashes)
    ))
}

/// Whether a `Content-Type` value names a DER OCSP request (ASCII case-insensitive).
pub fn is_request_content_type(value: &str) -> bool {
    value.eq_ignore_ascii_case(REQUEST_CONTENT_TYPE)
}

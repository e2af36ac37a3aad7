//! Route key extraction.
//!
//! # Responsibilities
//! - Reduce a request path to its routing key (first segment, both slashes kept)
//! - Decide whether a registered path can ever be dispatched
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Only the first segment is a key; `/seg/anything/else` routes to `/seg/`
//! - A path without a closing slash after its first segment has no key
//! - No regex: one byte scan per request

/// Routing key of a request path: everything up to and including the first
/// `/` after the leading one.
///
/// Returns `None` when the path does not start with `/` or has no second `/`,
/// which means no responder can be addressed by it.
pub fn route_key(path: &str) -> Option<&str> {
    let rest = path.strip_prefix('/')?;
    let end = rest.find('/')?;
    Some(&path[..end + 2])
}

/// The part of a request path after its routing key.
pub fn remainder<'a>(path: &'a str, key: &str) -> &'a str {
    path.strip_prefix(key).unwrap_or("")
}

/// Whether `path` is itself a routing key, i.e. `/segment/` with a non-empty segment.
pub fn is_route_key(path: &str) -> bool {
    path.len() > 2 && route_key(path) == Some(path)
}

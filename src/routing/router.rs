//! Route table and registration handles.
//!
//! # Responsibilities
//! - Store the responder currently registered at each routing key
//! - Look up the responder for a request path
//! - Hand out revocable registrations that only ever remove their own entry
//!
//! # Design Decisions
//! - Sharded concurrent map (DashMap): readers and writers never block each other for long
//! - Lookups clone the `Arc`, so a dispatch keeps its responder alive after release
//! - Each insert gets a fresh entry id; release is remove-if-still-mine

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::responder::Responder;
use crate::routing::matcher::route_key;

/// A responder occupying one routing key.
#[derive(Clone)]
struct RouteEntry {
    id: u64,
    responder: Arc<dyn Responder>,
}

/// Mapping from routing key to the responder currently registered there.
#[derive(Default)]
pub struct RouteTable {
    routes: DashMap<String, RouteEntry>,
    next_id: AtomicU64,
}

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `responder` at `key`, replacing any previous entry (last writer wins).
    ///
    /// Returns the id of the new entry.
    pub fn insert(&self, key: &str, responder: Arc<dyn Responder>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .routes
            .insert(key.to_string(), RouteEntry { id, responder });
        if let Some(previous) = previous {
            tracing::debug!(path = %key, replaced = previous.id, entry = id, "Route overwritten");
        }
        id
    }

    /// Remove the entry at `key` only if it is still entry `id`.
    pub fn remove_if_current(&self, key: &str, id: u64) -> bool {
        self.routes
            .remove_if(key, |_, entry| entry.id == id)
            .is_some()
    }

    /// Whether entry `id` still occupies `key`.
    pub fn is_current(&self, key: &str, id: u64) -> bool {
        self.routes
            .get(key)
            .map(|entry| entry.id == id)
            .unwrap_or(false)
    }

    /// Find the responder for a request path.
    ///
    /// Returns the matched key together with a snapshot of the responder.
    pub fn lookup<'p>(&self, path: &'p str) -> Option<(&'p str, Arc<dyn Responder>)> {
        let key = route_key(path)?;
        let entry = self.routes.get(key)?;
        Some((key, Arc::clone(&entry.responder)))
    }

    /// Currently registered keys, in no particular order.
    pub fn paths(&self) -> Vec<String> {
        self.routes.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no route is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// A responder address that can never be dispatched to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("responder path {0:?} is not a single-segment routing key of the form /segment/")]
    UnroutablePath(String),
}

/// A scoped claim on one route table entry.
///
/// Releasing it (explicitly or by dropping it) removes the entry it created,
/// and nothing else: if another responder has since been registered at the
/// same path, that newer registration is left in place.
#[must_use = "dropping a Registration unregisters the responder"]
pub struct Registration {
    table: Weak<RouteTable>,
    path: String,
    id: u64,
}

impl Registration {
    pub(crate) fn new(table: &Arc<RouteTable>, path: String, id: u64) -> Self {
        Self {
            table: Arc::downgrade(table),
            path,
            id,
        }
    }

    /// The routing key this registration claimed.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this registration still owns its route.
    pub fn is_active(&self) -> bool {
        self.table
            .upgrade()
            .map(|table| table.is_current(&self.path, self.id))
            .unwrap_or(false)
    }

    /// Unregister the responder.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        if table.remove_if_current(&self.path, self.id) {
            tracing::debug!(path = %self.path, entry = self.id, "Responder unregistered");
        } else {
            tracing::debug!(path = %self.path, entry = self.id, "Registration already superseded");
        }
        crate::observability::metrics::set_registered(table.len());
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("path", &self.path)
            .field("id", &self.id)
            .finish()
    }
}

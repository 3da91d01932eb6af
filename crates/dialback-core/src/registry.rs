//! Pending-verification registry.
//!
//! When an inbound stream asserts a key for a domain, the receiving server
//! asks that domain's authoritative server to check it and parks the inbound
//! stream here under `domain/stream-id` until the answer comes back on a
//! different connection.

use crate::connection::ConnHandle;
use std::collections::HashMap;

/// Correlation key: the asserted domain and the inbound stream id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub domain: String,
    pub stream_id: String,
}

impl PendingKey {
    pub fn new(domain: &str, stream_id: &str) -> Self {
        Self {
            domain: domain.to_string(),
            stream_id: stream_id.to_string(),
        }
    }
}

impl std::fmt::Display for PendingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.domain, self.stream_id)
    }
}

/// Verifications awaiting an authoritative answer.
///
/// Holds handles only. Whether the connection behind a handle still exists
/// is for the caller to check against the connection table.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: HashMap<PendingKey, ConnHandle>,
}

impl PendingRegistry {
    /// Parks `conn` under `domain/stream_id`, replacing any previous entry.
    ///
    /// Returns the replaced handle, if any.
    pub fn register(
        &mut self,
        domain: &str,
        stream_id: &str,
        conn: ConnHandle,
    ) -> Option<ConnHandle> {
        let key = PendingKey::new(domain, stream_id);
        let replaced = self.entries.insert(key.clone(), conn);
        if let Some(previous) = replaced {
            tracing::debug!(%key, %previous, %conn, "replaced pending verification");
        }
        replaced
    }

    /// Removes and returns the entry. A second call for the same key
    /// returns `None`.
    pub fn take(&mut self, domain: &str, stream_id: &str) -> Option<ConnHandle> {
        self.entries.remove(&PendingKey::new(domain, stream_id))
    }

    pub fn get(&self, domain: &str, stream_id: &str) -> Option<ConnHandle> {
        self.entries.get(&PendingKey::new(domain, stream_id)).copied()
    }

    /// Drops every entry pointing at `conn`. Returns how many were dropped.
    pub fn purge(&mut self, conn: ConnHandle) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, handle| *handle != conn);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

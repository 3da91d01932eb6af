//! The collaborator interface the hosting server provides.

use crate::connection::ConnHandle;
use dialback_types::{DialbackMessage, StreamClose};
use std::collections::HashMap;

/// Per-domain shared secret lookup.
pub trait SecretStore {
    /// Returns the dialback secret for a locally hosted domain.
    fn secret_for(&self, domain: &str) -> Option<String>;
}

impl SecretStore for HashMap<String, String> {
    fn secret_for(&self, domain: &str) -> Option<String> {
        self.get(domain).cloned()
    }
}

/// Everything the dialback layer needs from the server hosting it.
///
/// Implementations must not call back into [`crate::Dialback`] from these
/// methods; effects are expected to be queued and applied after the
/// current handler returns.
pub trait Host: SecretStore {
    /// Whether `domain` is hosted locally.
    fn serves(&self, domain: &str) -> bool;

    /// Delivers a message to the server responsible for `to`, opening an
    /// outgoing stream from `from` if necessary.
    fn route_to_remote(&mut self, from: &str, to: &str, message: DialbackMessage);

    /// Writes a message on an existing stream.
    fn send(&mut self, conn: ConnHandle, message: DialbackMessage);

    /// Closes a stream with a stream error.
    fn close(&mut self, conn: ConnHandle, close: StreamClose);

    /// Fails queued outgoing stanzas on `conn` back to their senders.
    ///
    /// Returns `false` if the stream has no send queue.
    fn bounce_queued(&mut self, conn: ConnHandle, reason: &str) -> bool;

    /// Session-manager hook invoked after `domain` was authenticated on `conn`.
    fn on_authenticated(&mut self, _conn: ConnHandle, _domain: &str) {}
}

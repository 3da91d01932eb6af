//! Server-to-server dialback for federated messaging servers.
//!
//! Implements the dialback trust-verification exchange: a server asserts a
//! secret-derived key for the domain it claims to be, and the receiving
//! server checks that claim by asking the claimed domain's authoritative
//! server over a second connection. The two halves of the exchange meet in
//! the [`PendingRegistry`], which correlates asynchronous verify responses
//! with the inbound stream waiting for a verdict.
//!
//! # Structure
//!
//! - [`key`]: key generation and verification (HMAC-SHA256 over the stream
//!   id and domain pair, keyed by the per-domain secret)
//! - [`ConnectionTable`]: generation-checked arena of live connections
//! - [`PendingRegistry`]: `domain/stream-id` correlation table
//! - [`Dialback`]: the state machine, with handlers split across the
//!   `initiate`, `inbound`, `responder`, `correlator`, `verdict`, `finalize`,
//!   `errors` and `fallback` modules
//! - [`pipeline`]: the ordered dispatch table routing events to handlers
//!
//! # Concurrency
//!
//! Every handler takes `&mut Dialback` and runs to completion. Hosts drive
//! the state machine from a single task (or behind one lock), which is what
//! makes the finalizer's cross-connection update of a multiplexing parent
//! safe. Registry entries hold [`ConnHandle`]s, never references: a handle
//! whose connection was destroyed resolves to nothing.
//!
//! # Usage
//!
//! ```rust,ignore
//! use dialback_core::{Connection, Dialback, DialbackConfig, Event};
//!
//! let mut dialback = Dialback::new(DialbackConfig::default());
//! let handle = dialback.open(Connection::inbound(stream_id, true));
//! dialback.dispatch(&mut host, handle, Event::Message(message));
//! ```

pub mod config;
pub mod connection;
pub mod domain;
pub mod host;
pub mod key;
pub mod pipeline;
pub mod registry;

mod correlator;
mod errors;
mod fallback;
mod finalize;
mod inbound;
mod initiate;
mod responder;
mod verdict;

pub use config::DialbackConfig;
pub use connection::{ConnHandle, Connection, ConnectionTable, DomainRecord};
pub use domain::{normalize_domain, DomainError};
pub use errors::{classify, ErrorOutcome};
pub use host::{Host, SecretStore};
pub use pipeline::Event;
pub use registry::{PendingKey, PendingRegistry};

use dialback_types::StreamClose;

/// The dialback state machine.
///
/// Owns every connection the dialback layer knows about and the table of
/// verifications awaiting an answer from an authoritative server. External
/// effects (sending, closing, routing, secret lookup) go through the
/// [`Host`] passed to each call.
#[derive(Debug, Default)]
pub struct Dialback {
    config: DialbackConfig,
    connections: ConnectionTable,
    pending: PendingRegistry,
}

impl Dialback {
    pub fn new(config: DialbackConfig) -> Self {
        Self {
            config,
            connections: ConnectionTable::default(),
            pending: PendingRegistry::default(),
        }
    }

    pub fn config(&self) -> &DialbackConfig {
        &self.config
    }

    /// Registers a newly accepted or connected stream.
    pub fn open(&mut self, connection: Connection) -> ConnHandle {
        let direction = connection.direction;
        let stream_id = connection.stream_id.clone();
        let handle = self.connections.insert(connection);
        tracing::debug!(conn = %handle, %direction, %stream_id, "dialback connection opened");
        handle
    }

    /// Forgets a stream after the transport closed it.
    ///
    /// Pending verifications that pointed at it are purged. Handles held
    /// elsewhere (multiplexing parents) go stale and resolve to nothing.
    pub fn destroy(&mut self, handle: ConnHandle) -> Option<Connection> {
        let connection = self.connections.remove(handle)?;
        let purged = self.pending.purge(handle);
        tracing::debug!(conn = %handle, purged, "dialback connection destroyed");
        Some(connection)
    }

    pub fn connection(&self, handle: ConnHandle) -> Option<&Connection> {
        self.connections.get(handle)
    }

    pub fn connection_mut(&mut self, handle: ConnHandle) -> Option<&mut Connection> {
        self.connections.get_mut(handle)
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    pub fn pending(&self) -> &PendingRegistry {
        &self.pending
    }

    /// Called when the host stops using dialback.
    pub fn unload(&self) {
        if self.config.strict_interop {
            tracing::warn!(
                "dialback unloaded while strict interoperability mode is enabled; \
                 peers without valid certificates can no longer federate with this server"
            );
        }
    }

    fn close(&self, host: &mut dyn Host, handle: ConnHandle, close: StreamClose) {
        tracing::info!(
            conn = %handle,
            condition = %close.condition,
            reason = close.text.as_deref().unwrap_or(""),
            "closing stream"
        );
        host.close(handle, close);
    }
}

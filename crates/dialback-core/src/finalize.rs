//! Authentication finalizer.

use crate::{ConnHandle, Dialback, Host};
use dialback_types::{AuthState, CloseReason, Direction, StreamClose};

impl Dialback {
    /// Marks `domain` authenticated on `handle`, subject to the
    /// mandatory-encryption policy.
    ///
    /// An unauthenticated outbound stream with a live multiplexing parent
    /// also authenticates `domain` on the parent; a dead parent is detached.
    /// Returns whether authentication succeeded.
    pub fn authenticate(&mut self, host: &mut dyn Host, handle: ConnHandle, domain: &str) -> bool {
        let Some(conn) = self.connections.get(handle) else {
            tracing::debug!(conn = %handle, domain, "authenticate on unknown connection");
            return false;
        };

        if self.config.require_encryption && !conn.secure {
            let side = match conn.direction {
                Direction::Outbound => "offered",
                Direction::Inbound => "used",
            };
            self.close(
                host,
                handle,
                StreamClose::with_text(
                    CloseReason::PolicyViolation,
                    format!("TLS encryption is mandatory but the stream was not {side}"),
                ),
            );
            return false;
        }

        let parent = match (conn.direction, conn.state, conn.multiplex_parent) {
            (Direction::Outbound, AuthState::Unauthenticated, Some(parent)) => Some(parent),
            _ => None,
        };
        if let Some(parent) = parent {
            match self.connections.get_mut(parent) {
                Some(p) => {
                    p.domains.entry(domain.to_string()).or_default().authenticated = true;
                    tracing::debug!(conn = %handle, %parent, domain, "propagated authentication to multiplexing parent");
                }
                None => {
                    if let Some(conn) = self.connections.get_mut(handle) {
                        conn.multiplex_parent = None;
                    }
                    tracing::debug!(conn = %handle, %parent, "multiplexing parent is gone; detached");
                }
            }
        }

        let Some(conn) = self.connections.get_mut(handle) else {
            return false;
        };
        let record = conn.domains.entry(domain.to_string()).or_default();
        record.authenticated = true;
        record.pending_key = None;
        conn.state = AuthState::Authenticated;
        let direction = conn.direction;

        host.on_authenticated(handle, domain);
        tracing::info!(conn = %handle, %direction, domain, "dialback authentication succeeded");
        true
    }
}

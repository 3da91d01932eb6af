//! Outbound initiator: asserting our key on an outgoing stream.

use crate::{key, ConnHandle, Dialback, Host};
use dialback_types::{AuthMethod, CloseReason, DialbackMessage, Direction, StreamClose};

impl Dialback {
    /// Sends `result{from: local, to: remote}` with our key on an
    /// unauthenticated outbound stream.
    ///
    /// The stream stays unauthenticated until the peer's verdict arrives.
    /// Returns whether an assertion was sent.
    pub fn initiate(&mut self, host: &mut dyn Host, handle: ConnHandle) -> bool {
        let Some(conn) = self.connections.get(handle) else {
            tracing::debug!(conn = %handle, "initiate on unknown connection");
            return false;
        };
        if conn.direction != Direction::Outbound || conn.is_authenticated() {
            tracing::debug!(
                conn = %handle,
                direction = %conn.direction,
                "not initiating dialback on this stream"
            );
            return false;
        }
        let (Some(local), Some(remote)) = (conn.local_domain.clone(), conn.remote_domain.clone())
        else {
            self.close(
                host,
                handle,
                StreamClose::with_text(
                    CloseReason::ImproperAddressing,
                    "outgoing stream has no domain pair",
                ),
            );
            return false;
        };

        let Some(asserted) = key::generate(&*host, conn.stream_id.as_str(), &remote, &local)
        else {
            tracing::error!(%local, "no dialback secret configured for hosted domain");
            self.close(
                host,
                handle,
                StreamClose::with_text(
                    CloseReason::InternalServerError,
                    format!("no dialback secret for {local}"),
                ),
            );
            return false;
        };

        if let Some(conn) = self.connections.get_mut(handle) {
            conn.asserted_key = Some(asserted.clone());
            if conn.auth_method != AuthMethod::LegacyDialback {
                conn.auth_method = AuthMethod::DialbackInProgress;
            }
        }
        tracing::debug!(conn = %handle, %local, %remote, "asserting dialback key");
        host.send(handle, DialbackMessage::result(&local, &remote, &asserted));
        true
    }
}

//! Outbound verdict handler: the peer's answer to our own assertion.

use crate::{normalize_domain, ConnHandle, Dialback, Host};
use dialback_types::{CloseReason, DialbackMessage, StreamClose, Verdict};

impl Dialback {
    /// Handles `result{from, to, id, type}` on our outbound stream.
    pub fn handle_result_verdict(
        &mut self,
        host: &mut dyn Host,
        handle: ConnHandle,
        msg: &DialbackMessage,
    ) {
        let Some(conn) = self.connections.get(handle) else {
            return;
        };
        if msg.ty.is_none() {
            tracing::debug!(conn = %handle, "ignoring untyped result on outbound stream");
            return;
        }
        let (Some(local), Some(remote)) = (conn.local_domain.clone(), conn.remote_domain.clone())
        else {
            return;
        };

        let from = msg.from.as_deref().and_then(|d| normalize_domain(d).ok());
        let to = msg.to.as_deref().and_then(|d| normalize_domain(d).ok());
        if to.as_deref() != Some(local.as_str()) || from.as_deref() != Some(remote.as_str()) {
            self.close(
                host,
                handle,
                StreamClose::with_text(
                    CloseReason::ImproperAddressing,
                    "dialback verdict does not match the stream's domains",
                ),
            );
            return;
        }
        // Graceful errors carry no id; every other verdict must name this stream.
        let id_matches = msg.id.as_deref() == Some(conn.stream_id.as_str());
        if !id_matches && msg.verdict() != Some(Verdict::Error) {
            self.close(
                host,
                handle,
                StreamClose::with_text(
                    CloseReason::InvalidId,
                    "dialback verdict for a different stream",
                ),
            );
            return;
        }

        match msg.verdict() {
            Some(Verdict::Valid) => {
                if self.authenticate(host, handle, &remote) {
                    tracing::info!(conn = %handle, %local, %remote, "outgoing stream authenticated via dialback");
                }
            }
            Some(Verdict::Error) => {
                self.handle_dialback_error(host, handle, msg.error.as_ref());
            }
            _ => {
                self.close(
                    host,
                    handle,
                    StreamClose::with_text(
                        CloseReason::NotAuthorized,
                        format!("{remote} rejected our dialback key"),
                    ),
                );
            }
        }
    }
}

//! Inbound result handler: a peer asserts a key for a domain.

use crate::{normalize_domain, ConnHandle, Dialback, Host};
use dialback_types::{CloseReason, DialbackMessage, ErrorCondition, StreamClose};

impl Dialback {
    /// Handles `result{from, to}` + key on an inbound stream.
    ///
    /// Parks the stream in the pending registry and asks the authoritative
    /// server of `from` whether the key is genuine.
    pub fn handle_result(&mut self, host: &mut dyn Host, handle: ConnHandle, msg: &DialbackMessage) {
        if msg.ty.is_some() {
            tracing::debug!(conn = %handle, ty = ?msg.ty, "ignoring typed result on inbound stream");
            return;
        }

        let Some(from) = msg.from.as_deref().and_then(|d| normalize_domain(d).ok()) else {
            self.close(
                host,
                handle,
                StreamClose::with_text(
                    CloseReason::ImproperAddressing,
                    "missing or invalid 'from' domain on dialback result",
                ),
            );
            return;
        };
        let Some(to) = msg.to.as_deref().and_then(|d| normalize_domain(d).ok()) else {
            self.close(
                host,
                handle,
                StreamClose::with_text(
                    CloseReason::HostUnknown,
                    "missing or invalid 'to' domain on dialback result",
                ),
            );
            return;
        };
        let Some(asserted) = msg.key.clone().filter(|k| !k.is_empty()) else {
            self.close(
                host,
                handle,
                StreamClose::with_text(CloseReason::NotAcceptable, "dialback result without a key"),
            );
            return;
        };

        let Some(conn) = self.connections.get_mut(handle) else {
            return;
        };
        if conn.local_domain.is_none() {
            conn.local_domain = Some(to.clone());
        }
        let multiplexed = match &conn.remote_domain {
            Some(declared) => declared != &from,
            None => {
                conn.remote_domain = Some(from.clone());
                false
            }
        };

        if !host.serves(&to) {
            if multiplexed {
                tracing::info!(
                    conn = %handle,
                    %from,
                    %to,
                    "multiplexed dialback for a host we do not serve"
                );
                host.route_to_remote(
                    &to,
                    &from,
                    DialbackMessage::result_error(&to, &from, ErrorCondition::ItemNotFound),
                );
            } else {
                self.close(
                    host,
                    handle,
                    StreamClose::with_text(CloseReason::HostUnknown, format!("{to} is not served here")),
                );
            }
            return;
        }

        let record = conn.domains.entry(from.clone()).or_default();
        record.pending_key = Some(asserted.clone());
        record.multiplexed = multiplexed;
        let stream_id = conn.stream_id.as_str().to_string();

        self.pending.register(&from, &stream_id, handle);
        tracing::debug!(conn = %handle, %from, %to, multiplexed, "verifying dialback key");
        host.route_to_remote(
            &to,
            &from,
            DialbackMessage::verify_request(&to, &from, &stream_id, &asserted),
        );
    }
}

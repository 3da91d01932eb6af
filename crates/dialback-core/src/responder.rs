//! Authoritative verify responder.

use crate::{key, normalize_domain, ConnHandle, Dialback, Host};
use dialback_types::{CloseReason, DialbackMessage, StreamClose, Verdict};

impl Dialback {
    /// Answers `verify{from, to, id}` + key for a domain we host.
    ///
    /// `to` is our domain, `from` the server that received our assertion.
    /// The reply always echoes the key, whatever the verdict.
    pub fn respond_verify(&mut self, host: &mut dyn Host, handle: ConnHandle, msg: &DialbackMessage) {
        if msg.ty.is_some() {
            tracing::debug!(conn = %handle, ty = ?msg.ty, "ignoring typed verify on inbound stream");
            return;
        }
        let Some(id) = msg.id.as_deref().filter(|id| !id.is_empty()) else {
            self.close(
                host,
                handle,
                StreamClose::with_text(CloseReason::InvalidId, "dialback verify without a stream id"),
            );
            return;
        };
        let (Some(from), Some(to)) = (
            msg.from.as_deref().and_then(|d| normalize_domain(d).ok()),
            msg.to.as_deref().and_then(|d| normalize_domain(d).ok()),
        ) else {
            self.close(
                host,
                handle,
                StreamClose::with_text(
                    CloseReason::ImproperAddressing,
                    "missing or invalid domain on dialback verify",
                ),
            );
            return;
        };
        if !host.serves(&to) {
            self.close(
                host,
                handle,
                StreamClose::with_text(CloseReason::HostUnknown, format!("{to} is not served here")),
            );
            return;
        }

        let candidate = msg.key.as_deref().unwrap_or_default();
        // The key was generated by `to` for the receiving server `from`.
        let verdict = if key::verify(&*host, id, &from, &to, candidate) {
            self.link_sibling(handle, &to, &from);
            Verdict::Valid
        } else {
            tracing::warn!(
                conn = %handle,
                %from,
                %to,
                id,
                "dialback key mismatch; possible impersonation attempt"
            );
            Verdict::Invalid
        };

        tracing::debug!(conn = %handle, %from, %to, verdict = verdict.as_str(), "answering dialback verify");
        host.send(
            handle,
            DialbackMessage::verify_response(&to, &from, id, verdict, candidate),
        );
    }

    /// Cross-references our outgoing stream for the same domain pair with an
    /// authenticated stream that just served a valid verification.
    fn link_sibling(&mut self, handle: ConnHandle, local: &str, remote: &str) {
        if !self.connections.get(handle).is_some_and(|c| c.is_authenticated()) {
            return;
        }
        let Some(outbound) = self.connections.find_outbound(local, remote) else {
            return;
        };
        if outbound == handle {
            return;
        }
        if let Some(out) = self.connections.get_mut(outbound) {
            if out.multiplex_parent.is_none() {
                out.multiplex_parent = Some(handle);
                tracing::debug!(conn = %outbound, parent = %handle, %local, %remote, "linked multiplexed outbound stream");
            }
        }
    }
}

//! Verify-response correlator.

use crate::{normalize_domain, ConnHandle, Dialback, Host};
use dialback_types::{CloseReason, DialbackMessage, StreamClose, Verdict};

impl Dialback {
    /// Handles the authoritative server's answer on our outbound stream and
    /// settles the inbound stream that was waiting for it.
    pub fn handle_verify_response(
        &mut self,
        host: &mut dyn Host,
        handle: ConnHandle,
        msg: &DialbackMessage,
    ) {
        let (Some(from), Some(id)) = (
            msg.from.as_deref().and_then(|d| normalize_domain(d).ok()),
            msg.id.as_deref(),
        ) else {
            tracing::debug!(conn = %handle, "verify response without from/id");
            return;
        };
        let Some(conn) = self.connections.get(handle) else {
            return;
        };
        if conn.remote_domain.as_deref() != Some(from.as_str()) {
            tracing::debug!(
                conn = %handle,
                %from,
                expected = conn.remote_domain.as_deref().unwrap_or(""),
                "verify response from unexpected domain"
            );
            return;
        }
        let local = msg
            .to
            .as_deref()
            .and_then(|d| normalize_domain(d).ok())
            .or_else(|| conn.local_domain.clone())
            .unwrap_or_default();

        let Some(waiting) = self.pending.take(&from, id) else {
            tracing::debug!(conn = %handle, %from, id, "no pending verification for response");
            return;
        };

        match msg.verdict() {
            Some(Verdict::Valid) => {
                let Some(inbound) = self.connections.get(waiting) else {
                    tracing::info!(
                        %from,
                        id,
                        "stream awaiting dialback verdict is gone; dropping valid verdict"
                    );
                    return;
                };
                let pending_key = inbound
                    .domains
                    .get(&from)
                    .and_then(|r| r.pending_key.clone())
                    .unwrap_or_default();
                if self.authenticate(host, waiting, &from) {
                    host.send(
                        waiting,
                        DialbackMessage::result_verdict(
                            &local,
                            &from,
                            id,
                            Verdict::Valid,
                            &pending_key,
                        ),
                    );
                }
            }
            Some(Verdict::Error) => {
                self.handle_dialback_error(host, handle, msg.error.as_ref());
            }
            other => {
                tracing::info!(
                    conn = %handle,
                    %from,
                    id,
                    ty = other.map(Verdict::as_str).or(msg.ty.as_deref()).unwrap_or(""),
                    "authoritative server did not confirm dialback key"
                );
                self.close(
                    host,
                    handle,
                    StreamClose::with_text(
                        CloseReason::NotAuthorized,
                        format!("dialback key for {from} was not confirmed"),
                    ),
                );
            }
        }
    }
}

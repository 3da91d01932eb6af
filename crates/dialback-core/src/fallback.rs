//! Fallback orchestrator: deciding when dialback is attempted.

use crate::{ConnHandle, Dialback, Host};
use dialback_types::{
    AuthMethod, CloseReason, DialbackFeature, Direction, StreamClose, StreamFeatures,
};

impl Dialback {
    /// SASL EXTERNAL failed on an outgoing stream.
    ///
    /// Falls back to dialback if the peer declared the dialback namespace;
    /// otherwise no authentication path remains and the stream is closed.
    pub fn on_sasl_failure(&mut self, host: &mut dyn Host, handle: ConnHandle) {
        let Some(conn) = self.connections.get_mut(handle) else {
            return;
        };
        conn.auth_method = AuthMethod::ExternalFailed;
        if conn.peer_declares_dialback {
            conn.dialback_capable = true;
            tracing::info!(
                conn = %handle,
                remote = conn.remote_domain.as_deref().unwrap_or(""),
                "SASL EXTERNAL failed; falling back to dialback"
            );
            self.initiate(host, handle);
        } else {
            self.close(
                host,
                handle,
                StreamClose::with_text(
                    CloseReason::NotAuthorized,
                    "SASL EXTERNAL failed and the peer does not support dialback",
                ),
            );
        }
    }

    /// The peer's stream features arrived on an outgoing stream.
    pub fn on_stream_features(
        &mut self,
        host: &mut dyn Host,
        handle: ConnHandle,
        features: &StreamFeatures,
    ) {
        let Some(conn) = self.connections.get_mut(handle) else {
            return;
        };
        if conn.direction != Direction::Outbound || conn.is_authenticated() {
            return;
        }
        if conn.auth_method == AuthMethod::External {
            tracing::debug!(conn = %handle, "external authentication in progress; not offering dialback");
            return;
        }
        conn.peer_dialback_errors = features.dialback.is_some_and(|f| f.errors);

        if features.starttls_required && !conn.secure {
            let local = conn.local_domain.clone().unwrap_or_default();
            let remote = conn.remote_domain.clone().unwrap_or_default();
            if let Some(inbound) = self.connections.find_inbound(&local, &remote) {
                self.close(
                    host,
                    inbound,
                    StreamClose::with_text(
                        CloseReason::PolicyViolation,
                        format!("the outgoing stream to {remote} could not be secured"),
                    ),
                );
            }
            tracing::error!(
                conn = %handle,
                %local,
                %remote,
                "{remote} requires TLS but this side cannot encrypt the stream; \
                 configure a certificate for {local} to federate with it"
            );
            return;
        }

        if features.advertises_dialback() {
            conn.dialback_capable = true;
            self.initiate(host, handle);
        }
    }

    /// The peer explicitly asked for the legacy dialback path.
    pub fn on_legacy_request(&mut self, host: &mut dyn Host, handle: ConnHandle) {
        let Some(conn) = self.connections.get_mut(handle) else {
            return;
        };
        conn.auth_method = AuthMethod::LegacyDialback;
        conn.dialback_capable = true;
        self.initiate(host, handle);
    }

    /// The dialback feature to advertise on an inbound stream, if any.
    pub fn advertised_features(&self, handle: ConnHandle) -> Option<DialbackFeature> {
        let conn = self.connections.get(handle)?;
        if conn.direction != Direction::Inbound || conn.auth_method == AuthMethod::External {
            return None;
        }
        Some(DialbackFeature { errors: true })
    }
}

//! Error classifier for graceful dialback errors.

use crate::{ConnHandle, Dialback, Host};
use dialback_types::{CloseReason, ErrorCondition, ErrorPayload, StreamClose};

/// What happened to a stream after a dialback error was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOutcome {
    /// A known condition: logged, queued stanzas bounced, stream kept.
    Recoverable(ErrorCondition),
    /// An unknown or missing condition: the stream was closed.
    Fatal,
}

/// Maps an error payload onto the fixed condition set.
///
/// `Err` carries the offending condition name (empty when absent).
pub fn classify(payload: Option<&ErrorPayload>) -> Result<ErrorCondition, String> {
    let name = payload.map(|p| p.condition.as_str()).unwrap_or_default();
    ErrorCondition::from_name(name).ok_or_else(|| name.to_string())
}

impl Dialback {
    /// Handles a `result` or `verify` of type `error` received on `handle`.
    pub fn handle_dialback_error(
        &mut self,
        host: &mut dyn Host,
        handle: ConnHandle,
        payload: Option<&ErrorPayload>,
    ) -> ErrorOutcome {
        match classify(payload) {
            Ok(condition) => {
                let remote = self
                    .connections
                    .get(handle)
                    .and_then(|c| c.remote_domain.as_deref())
                    .unwrap_or("")
                    .to_string();
                tracing::warn!(
                    conn = %handle,
                    %remote,
                    %condition,
                    "dialback failed: {}",
                    condition.description()
                );
                if host.bounce_queued(handle, condition.description()) {
                    tracing::debug!(conn = %handle, "bounced queued stanzas");
                }
                ErrorOutcome::Recoverable(condition)
            }
            Err(name) => {
                let text = if name.is_empty() {
                    "dialback error without a condition".to_string()
                } else {
                    format!("unrecognized dialback error condition '{name}'")
                };
                self.close(
                    host,
                    handle,
                    StreamClose::with_text(CloseReason::NotAcceptable, text),
                );
                ErrorOutcome::Fatal
            }
        }
    }
}

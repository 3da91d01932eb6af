#![allow(dead_code)]

use dialback_core::{ConnHandle, Host, SecretStore};
use dialback_types::{CloseReason, DialbackMessage, StreamClose};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// Host double that records every effect the dialback layer requests.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub secrets: HashMap<String, String>,
    pub sent: Vec<(ConnHandle, DialbackMessage)>,
    pub routed: Vec<(String, String, DialbackMessage)>,
    pub closed: Vec<(ConnHandle, StreamClose)>,
    pub bounced: Vec<(ConnHandle, String)>,
    pub queued: HashSet<ConnHandle>,
    pub authenticated: Vec<(ConnHandle, String)>,
}

impl RecordingHost {
    /// A host serving `domains`, each with the given secret.
    pub fn serving(domains: &[(&str, &str)]) -> Self {
        Self {
            secrets: domains
                .iter()
                .map(|(d, s)| (d.to_string(), s.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn close_reason(&self, conn: ConnHandle) -> Option<CloseReason> {
        self.closed
            .iter()
            .find(|(h, _)| *h == conn)
            .map(|(_, c)| c.condition)
    }

    pub fn sent_to(&self, conn: ConnHandle) -> Vec<&DialbackMessage> {
        self.sent
            .iter()
            .filter(|(h, _)| *h == conn)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn take_routed(&mut self) -> DialbackMessage {
        assert_eq!(self.routed.len(), 1, "expected exactly one routed message");
        self.routed.remove(0).2
    }

    pub fn take_sent(&mut self, conn: ConnHandle) -> DialbackMessage {
        let pos = self
            .sent
            .iter()
            .position(|(h, _)| *h == conn)
            .expect("a message should have been sent on the connection");
        self.sent.remove(pos).1
    }
}

impl SecretStore for RecordingHost {
    fn secret_for(&self, domain: &str) -> Option<String> {
        self.secrets.get(domain).cloned()
    }
}

impl Host for RecordingHost {
    fn serves(&self, domain: &str) -> bool {
        self.secrets.contains_key(domain)
    }

    fn route_to_remote(&mut self, from: &str, to: &str, message: DialbackMessage) {
        self.routed.push((from.to_string(), to.to_string(), message));
    }

    fn send(&mut self, conn: ConnHandle, message: DialbackMessage) {
        self.sent.push((conn, message));
    }

    fn close(&mut self, conn: ConnHandle, close: StreamClose) {
        self.closed.push((conn, close));
    }

    fn bounce_queued(&mut self, conn: ConnHandle, reason: &str) -> bool {
        if self.queued.remove(&conn) {
            self.bounced.push((conn, reason.to_string()));
            true
        } else {
            false
        }
    }

    fn on_authenticated(&mut self, conn: ConnHandle, domain: &str) {
        self.authenticated.push((conn, domain.to_string()));
    }
}

#[derive(Clone, Default)]
struct WarnCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Runs `f` and returns its result with the number of WARN events it emitted.
pub fn count_warnings<R>(f: impl FnOnce() -> R) -> (R, usize) {
    let counter = WarnCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, counter.0.load(Ordering::SeqCst))
}

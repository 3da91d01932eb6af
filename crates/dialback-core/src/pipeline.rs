//! Event dispatch.
//!
//! Dialback elements are routed by an ordered table keyed on
//! `(namespace, element kind, stream direction)`. The first matching route
//! wins, so ordering in [`ROUTES`] is the handler priority.

use crate::{ConnHandle, Dialback, Host};
use dialback_types::{DialbackMessage, Direction, MessageKind, StreamFeatures, DIALBACK_NS};

/// Something that happened on a stream.
#[derive(Debug, Clone)]
pub enum Event {
    /// A dialback element arrived.
    Message(DialbackMessage),
    /// The peer's stream features arrived on an outgoing stream.
    Features(StreamFeatures),
    /// SASL EXTERNAL failed on an outgoing stream.
    SaslFailed,
    /// The peer requested the legacy dialback path.
    LegacyRequested,
}

type MessageHandler = fn(&mut Dialback, &mut dyn Host, ConnHandle, &DialbackMessage);

/// One entry in the dispatch table.
pub struct Route {
    pub namespace: &'static str,
    pub kind: MessageKind,
    pub direction: Direction,
    pub name: &'static str,
    handler: MessageHandler,
}

/// Dispatch table, highest priority first.
pub static ROUTES: &[Route] = &[
    Route {
        namespace: DIALBACK_NS,
        kind: MessageKind::Verify,
        direction: Direction::Inbound,
        name: "authoritative-verify",
        handler: Dialback::respond_verify,
    },
    Route {
        namespace: DIALBACK_NS,
        kind: MessageKind::Verify,
        direction: Direction::Outbound,
        name: "verify-response",
        handler: Dialback::handle_verify_response,
    },
    Route {
        namespace: DIALBACK_NS,
        kind: MessageKind::Result,
        direction: Direction::Inbound,
        name: "inbound-result",
        handler: Dialback::handle_result,
    },
    Route {
        namespace: DIALBACK_NS,
        kind: MessageKind::Result,
        direction: Direction::Outbound,
        name: "result-verdict",
        handler: Dialback::handle_result_verdict,
    },
];

/// Finds the route for a dialback element on a stream of `direction`.
pub fn route_for(kind: MessageKind, direction: Direction) -> Option<&'static Route> {
    ROUTES
        .iter()
        .find(|r| r.namespace == DIALBACK_NS && r.kind == kind && r.direction == direction)
}

impl Dialback {
    /// Delivers one event for one stream. Events for a stream must be
    /// dispatched in arrival order.
    pub fn dispatch(&mut self, host: &mut dyn Host, handle: ConnHandle, event: Event) {
        let Some(direction) = self.connections.get(handle).map(|c| c.direction) else {
            tracing::debug!(conn = %handle, "event for unknown connection dropped");
            return;
        };
        match event {
            Event::Message(msg) => match route_for(msg.kind, direction) {
                Some(route) => {
                    tracing::trace!(conn = %handle, route = route.name, "dispatching dialback element");
                    (route.handler)(self, host, handle, &msg);
                }
                None => {
                    tracing::debug!(conn = %handle, kind = msg.kind.as_str(), "no dialback route");
                }
            },
            Event::Features(features) => self.on_stream_features(host, handle, &features),
            Event::SaslFailed => self.on_sasl_failure(host, handle),
            Event::LegacyRequested => self.on_legacy_request(host, handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_and_direction_has_a_route() {
        for kind in [MessageKind::Result, MessageKind::Verify] {
            for direction in [Direction::Inbound, Direction::Outbound] {
                assert!(route_for(kind, direction).is_some());
            }
        }
    }

    #[test]
    fn routes_are_unique() {
        for (i, a) in ROUTES.iter().enumerate() {
            for b in &ROUTES[i + 1..] {
                assert!(
                    !(a.kind == b.kind && a.direction == b.direction),
                    "duplicate route {} / {}",
                    a.name,
                    b.name
                );
            }
        }
    }

    #[test]
    fn verify_routes_by_direction() {
        assert_eq!(
            route_for(MessageKind::Verify, Direction::Inbound).unwrap().name,
            "authoritative-verify"
        );
        assert_eq!(
            route_for(MessageKind::Verify, Direction::Outbound).unwrap().name,
            "verify-response"
        );
    }
}

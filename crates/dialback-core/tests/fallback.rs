//! When dialback is (and is not) attempted.

mod common;

use common::RecordingHost;
use dialback_core::{ConnHandle, Connection, Dialback, DialbackConfig, Event};
use dialback_types::{
    AuthMethod, CloseReason, DialbackFeature, MessageKind, StreamFeatures, StreamId,
};

fn host() -> RecordingHost {
    RecordingHost::serving(&[("a.example", "secret-of-a")])
}

fn outbound(dialback: &mut Dialback, secure: bool, namespace: bool) -> ConnHandle {
    let mut conn = Connection::outbound(StreamId::from("out"), "a.example", "b.example", secure);
    conn.peer_declares_dialback = namespace;
    dialback.open(conn)
}

fn dialback_features() -> StreamFeatures {
    StreamFeatures {
        dialback: Some(DialbackFeature { errors: true }),
        ..StreamFeatures::default()
    }
}

#[test]
fn sasl_failure_falls_back_when_peer_speaks_dialback() {
    let mut dialback = Dialback::new(DialbackConfig::default());
    let mut host = host();
    let conn = outbound(&mut dialback, true, true);

    dialback.dispatch(&mut host, conn, Event::SaslFailed);

    let c = dialback.connection(conn).unwrap();
    assert!(c.dialback_capable);
    assert_eq!(c.auth_method, AuthMethod::DialbackInProgress);
    assert!(c.asserted_key.is_some());
    let assertion = host.take_sent(conn);
    assert_eq!(assertion.kind, MessageKind::Result);
    assert_eq!(assertion.key, c.asserted_key);
}

#[test]
fn sasl_failure_without_dialback_closes() {
    let mut dialback = Dialback::new(DialbackConfig::default());
    let mut host = host();
    let conn = outbound(&mut dialback, true, false);

    dialback.dispatch(&mut host, conn, Event::SaslFailed);

    assert_eq!(host.close_reason(conn), Some(CloseReason::NotAuthorized));
    assert!(host.sent.is_empty());
}

#[test]
fn features_with_dialback_initiate() {
    let mut dialback = Dialback::new(DialbackConfig::default());
    let mut host = host();
    let conn = outbound(&mut dialback, true, true);

    dialback.dispatch(&mut host, conn, Event::Features(dialback_features()));

    assert_eq!(host.sent_to(conn).len(), 1);
    assert!(dialback.connection(conn).unwrap().peer_dialback_errors);
}

#[test]
fn features_without_dialback_do_nothing() {
    let mut dialback = Dialback::new(DialbackConfig::default());
    let mut host = host();
    let conn = outbound(&mut dialback, true, true);

    dialback.dispatch(&mut host, conn, Event::Features(StreamFeatures::default()));

    assert!(host.sent.is_empty());
    assert!(host.closed.is_empty());
}

#[test]
fn features_ignored_while_external_auth_runs() {
    let mut dialback = Dialback::new(DialbackConfig::default());
    let mut host = host();
    let conn = outbound(&mut dialback, true, true);
    dialback.connection_mut(conn).unwrap().auth_method = AuthMethod::External;

    dialback.dispatch(&mut host, conn, Event::Features(dialback_features()));

    assert!(host.sent.is_empty());
}

#[test]
fn required_tls_without_encryption_closes_paired_inbound() {
    let mut dialback = Dialback::new(DialbackConfig::default());
    let mut host = host();
    let conn = outbound(&mut dialback, false, true);
    let mut paired = Connection::inbound(StreamId::from("in"), false);
    paired.local_domain = Some("a.example".to_string());
    paired.remote_domain = Some("b.example".to_string());
    let paired = dialback.open(paired);
    let mut unrelated = Connection::inbound(StreamId::from("in2"), false);
    unrelated.local_domain = Some("a.example".to_string());
    unrelated.remote_domain = Some("c.example".to_string());
    let unrelated = dialback.open(unrelated);

    dialback.dispatch(
        &mut host,
        conn,
        Event::Features(StreamFeatures {
            starttls_required: true,
            dialback: Some(DialbackFeature { errors: true }),
        }),
    );

    assert!(host.sent.is_empty(), "dialback must not be attempted");
    assert_eq!(host.close_reason(paired), Some(CloseReason::PolicyViolation));
    assert_eq!(host.close_reason(unrelated), None);
    assert_eq!(host.close_reason(conn), None);
}

#[test]
fn required_tls_with_encryption_proceeds() {
    let mut dialback = Dialback::new(DialbackConfig::default());
    let mut host = host();
    let conn = outbound(&mut dialback, true, true);

    dialback.dispatch(
        &mut host,
        conn,
        Event::Features(StreamFeatures {
            starttls_required: true,
            dialback: Some(DialbackFeature { errors: false }),
        }),
    );

    assert_eq!(host.sent_to(conn).len(), 1);
    assert!(!dialback.connection(conn).unwrap().peer_dialback_errors);
}

#[test]
fn legacy_request_always_initiates() {
    let mut dialback = Dialback::new(DialbackConfig::default());
    let mut host = host();
    let conn = outbound(&mut dialback, true, false);

    dialback.dispatch(&mut host, conn, Event::LegacyRequested);

    let c = dialback.connection(conn).unwrap();
    assert_eq!(c.auth_method, AuthMethod::LegacyDialback);
    assert_eq!(host.sent_to(conn).len(), 1);
}

#[test]
fn missing_secret_is_internal_error() {
    let mut dialback = Dialback::new(DialbackConfig::default());
    let mut host = RecordingHost::default();
    let conn = outbound(&mut dialback, true, true);

    dialback.dispatch(&mut host, conn, Event::LegacyRequested);

    assert_eq!(host.close_reason(conn), Some(CloseReason::InternalServerError));
    assert!(host.sent.is_empty());
}

#[test]
fn inbound_streams_advertise_dialback_with_errors() {
    let mut dialback = Dialback::new(DialbackConfig::default());
    let inbound = dialback.open(Connection::inbound(StreamId::from("in"), true));
    let out = outbound(&mut dialback, true, true);

    assert_eq!(
        dialback.advertised_features(inbound),
        Some(DialbackFeature { errors: true })
    );
    assert_eq!(dialback.advertised_features(out), None);

    dialback.connection_mut(inbound).unwrap().auth_method = AuthMethod::External;
    assert_eq!(dialback.advertised_features(inbound), None);
}

#[test]
fn initiate_is_a_no_op_on_authenticated_streams() {
    let mut dialback = Dialback::new(DialbackConfig::default());
    let mut host = host();
    let conn = outbound(&mut dialback, true, true);
    assert!(dialback.authenticate(&mut host, conn, "b.example"));

    assert!(!dialback.initiate(&mut host, conn));
    assert!(host.sent.is_empty());
}

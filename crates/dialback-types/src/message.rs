//! Dialback message shapes.

use serde::{Deserialize, Serialize};

/// Namespace a peer declares on its stream header to signal dialback support.
pub const DIALBACK_NS: &str = "jabber:server:dialback";

/// Namespace of the dialback stream feature.
pub const DIALBACK_FEATURE_NS: &str = "urn:xmpp:features:dialback";

/// The two dialback elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// `db:result`: a key assertion, or the verdict on one.
    Result,
    /// `db:verify`: a request to the authoritative server, or its answer.
    Verify,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Result => "result",
            Self::Verify => "verify",
        }
    }
}

/// Outcome of a verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Valid,
    Invalid,
    Error,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Error => "error",
        }
    }

    /// Parses a `type` attribute. Unrecognised values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "valid" => Some(Self::Valid),
            "invalid" => Some(Self::Invalid),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// The closed set of graceful dialback error conditions.
///
/// A peer may report any of these inside a `result` or `verify` of type
/// `error`. Anything outside this set is a protocol violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCondition {
    ItemNotFound,
    RemoteConnectionFailed,
    RemoteServerNotFound,
    RemoteServerTimeout,
    PolicyViolation,
    NotAuthorized,
    Forbidden,
    NotAcceptable,
}

impl ErrorCondition {
    /// Every recognised condition, in classification order.
    pub const ALL: [ErrorCondition; 8] = [
        Self::ItemNotFound,
        Self::RemoteConnectionFailed,
        Self::RemoteServerNotFound,
        Self::RemoteServerTimeout,
        Self::PolicyViolation,
        Self::NotAuthorized,
        Self::Forbidden,
        Self::NotAcceptable,
    ];

    /// Returns the condition element name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ItemNotFound => "item-not-found",
            Self::RemoteConnectionFailed => "remote-connection-failed",
            Self::RemoteServerNotFound => "remote-server-not-found",
            Self::RemoteServerTimeout => "remote-server-timeout",
            Self::PolicyViolation => "policy-violation",
            Self::NotAuthorized => "not-authorized",
            Self::Forbidden => "forbidden",
            Self::NotAcceptable => "not-acceptable",
        }
    }

    /// Human-readable explanation used in logs and bounced messages.
    pub fn description(self) -> &'static str {
        match self {
            Self::ItemNotFound => "the remote server could not find the requested host",
            Self::RemoteConnectionFailed => {
                "the remote server failed to open a callback connection to the authoritative server"
            }
            Self::RemoteServerNotFound => {
                "the remote server could not resolve the authoritative server"
            }
            Self::RemoteServerTimeout => "the remote server timed out verifying the key",
            Self::PolicyViolation => {
                "the remote server requires encryption we do not offer or use"
            }
            Self::NotAuthorized => {
                "the remote server refused us, likely for lack of a valid certificate"
            }
            Self::Forbidden => "the remote server found our verification response invalid",
            Self::NotAcceptable => "the remote server could not assert our identity",
        }
    }

    /// Looks up a condition by element name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl std::fmt::Display for ErrorCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload nested in a `result` or `verify` of type `error`.
///
/// `condition` is kept as the raw element name so unrecognised conditions
/// survive parsing and can be rejected by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(rename = "type")]
    pub error_type: String,
    pub condition: String,
}

impl ErrorPayload {
    /// A `cancel` error with a recognised condition.
    pub fn cancel(condition: ErrorCondition) -> Self {
        Self {
            error_type: "cancel".to_string(),
            condition: condition.as_str().to_string(),
        }
    }
}

/// A parsed dialback element.
///
/// Attributes are optional because a peer may omit any of them; handlers
/// decide what a missing attribute means.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialbackMessage {
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The raw `type` attribute.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    /// The key carried as character data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl DialbackMessage {
    fn new(kind: MessageKind, from: &str, to: &str) -> Self {
        Self {
            kind,
            from: Some(from.to_string()),
            to: Some(to.to_string()),
            id: None,
            ty: None,
            key: None,
            error: None,
        }
    }

    /// A key assertion: `result{from, to}` carrying `key`.
    pub fn result(from: &str, to: &str, key: &str) -> Self {
        Self {
            key: Some(key.to_string()),
            ..Self::new(MessageKind::Result, from, to)
        }
    }

    /// The verdict on a key assertion, sent back on the asserting stream.
    pub fn result_verdict(from: &str, to: &str, id: &str, verdict: Verdict, key: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ty: Some(verdict.as_str().to_string()),
            key: Some(key.to_string()),
            ..Self::new(MessageKind::Result, from, to)
        }
    }

    /// A graceful `result` error.
    pub fn result_error(from: &str, to: &str, condition: ErrorCondition) -> Self {
        Self {
            ty: Some(Verdict::Error.as_str().to_string()),
            error: Some(ErrorPayload::cancel(condition)),
            ..Self::new(MessageKind::Result, from, to)
        }
    }

    /// A verification request for the authoritative server.
    pub fn verify_request(from: &str, to: &str, id: &str, key: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            key: Some(key.to_string()),
            ..Self::new(MessageKind::Verify, from, to)
        }
    }

    /// The authoritative server's answer to a verification request.
    pub fn verify_response(from: &str, to: &str, id: &str, verdict: Verdict, key: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ty: Some(verdict.as_str().to_string()),
            key: Some(key.to_string()),
            ..Self::new(MessageKind::Verify, from, to)
        }
    }

    /// The parsed `type` attribute, if it is one of the known verdicts.
    pub fn verdict(&self) -> Option<Verdict> {
        self.ty.as_deref().and_then(Verdict::parse)
    }
}

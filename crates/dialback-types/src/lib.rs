//! Shared protocol types for the server-to-server dialback implementation.
//!
//! This crate provides the vocabulary used by every other crate in the
//! workspace: connection directions and authentication states, stream close
//! reasons, dialback message shapes, the fixed set of graceful error
//! conditions, and stream feature advertisements.
//!
//! Nothing here performs I/O or holds state. Wire syntax (XML) is owned by
//! the transport layer; the types below are the parsed, syntax-independent
//! form of the protocol.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod features;
mod message;

pub use features::{DialbackFeature, StreamFeatures};
pub use message::{
    DialbackMessage, ErrorCondition, ErrorPayload, MessageKind, Verdict, DIALBACK_FEATURE_NS,
    DIALBACK_NS,
};

/// Which side opened the underlying stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The peer connected to us.
    Inbound,
    /// We connected to the peer.
    Outbound,
}

impl Direction {
    /// Returns the lowercase label for this direction.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication state of a whole connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthState {
    /// No domain has been authenticated on this stream yet.
    #[default]
    Unauthenticated,
    /// At least one domain has been authenticated on this stream.
    Authenticated,
}

/// How a connection is being (or was) authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Nothing attempted yet.
    #[default]
    None,
    /// SASL EXTERNAL (certificate) authentication is in progress or succeeded.
    External,
    /// SASL EXTERNAL was attempted and failed.
    ExternalFailed,
    /// A dialback key assertion is outstanding.
    DialbackInProgress,
    /// The peer explicitly requested the legacy dialback path.
    LegacyDialback,
}

/// Per-connection random token scoping a verification exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Generates a fresh random stream identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StreamId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StreamId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stream-level error conditions used to tear down a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloseReason {
    /// The addressed domain is not served here.
    HostUnknown,
    /// A domain name was missing or failed to normalize.
    ImproperAddressing,
    /// Verification failed or no authentication path remains.
    NotAuthorized,
    /// The stream id in a message does not belong to this stream.
    InvalidId,
    /// The peer violated the dialback protocol.
    NotAcceptable,
    /// Local policy (mandatory encryption) forbids the stream.
    PolicyViolation,
    /// Local misconfiguration, e.g. no secret for a hosted domain.
    InternalServerError,
}

impl CloseReason {
    /// Returns the stream error condition name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostUnknown => "host-unknown",
            Self::ImproperAddressing => "improper-addressing",
            Self::NotAuthorized => "not-authorized",
            Self::InvalidId => "invalid-id",
            Self::NotAcceptable => "not-acceptable",
            Self::PolicyViolation => "policy-violation",
            Self::InternalServerError => "internal-server-error",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CloseReason {
    type Err = ParseCloseReasonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host-unknown" => Ok(Self::HostUnknown),
            "improper-addressing" => Ok(Self::ImproperAddressing),
            "not-authorized" => Ok(Self::NotAuthorized),
            "invalid-id" => Ok(Self::InvalidId),
            "not-acceptable" => Ok(Self::NotAcceptable),
            "policy-violation" => Ok(Self::PolicyViolation),
            "internal-server-error" => Ok(Self::InternalServerError),
            _ => Err(ParseCloseReasonError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown stream close condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown stream close condition: {0}")]
pub struct ParseCloseReasonError(pub String);

/// A request to close a stream, with an optional human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamClose {
    pub condition: CloseReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl StreamClose {
    pub fn new(condition: CloseReason) -> Self {
        Self {
            condition,
            text: None,
        }
    }

    pub fn with_text(condition: CloseReason, text: impl Into<String>) -> Self {
        Self {
            condition,
            text: Some(text.into()),
        }
    }
}

impl std::fmt::Display for StreamClose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.text {
            Some(text) => write!(f, "{} ({})", self.condition, text),
            None => write!(f, "{}", self.condition),
        }
    }
}

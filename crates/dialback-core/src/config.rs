//! Dialback policy settings.

use serde::Deserialize;

/// Policy switches consumed from the host configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DialbackConfig {
    /// Refuse to authenticate any server-to-server stream that is not
    /// transport-encrypted.
    #[serde(default)]
    pub require_encryption: bool,

    /// Strict interoperability mode. Only affects the warning emitted when
    /// dialback is unloaded.
    #[serde(default)]
    pub strict_interop: bool,
}

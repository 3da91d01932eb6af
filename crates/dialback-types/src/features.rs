//! Stream feature advertisements relevant to dialback.

use serde::{Deserialize, Serialize};

/// The `<dialback/>` stream feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DialbackFeature {
    /// The advertiser understands graceful dialback errors.
    pub errors: bool,
}

/// The subset of a peer's stream features the dialback layer inspects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFeatures {
    /// STARTTLS is offered and marked `<required/>`.
    #[serde(default)]
    pub starttls_required: bool,
    /// Dialback is advertised.
    #[serde(default)]
    pub dialback: Option<DialbackFeature>,
}

impl StreamFeatures {
    pub fn advertises_dialback(&self) -> bool {
        self.dialback.is_some()
    }
}

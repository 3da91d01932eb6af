//! Dialback key generation and verification.
//!
//! A key is `HMAC-SHA256(SHA256(secret), stream_id ' ' to ' ' from)`,
//! hex-encoded, where `secret` is the local shared secret of `from`. Both the
//! asserting server and the authoritative server for `from` can recompute it;
//! nobody else can, and observing a key reveals nothing about the secret.

use crate::host::SecretStore;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

fn keyed_mac(secret: &str, stream_id: &str, to: &str, from: &str) -> HmacSha256 {
    let secret_digest = Sha256::digest(secret.as_bytes());
    let mut mac =
        HmacSha256::new_from_slice(&secret_digest).expect("HMAC key length is valid");
    mac.update(stream_id.as_bytes());
    mac.update(b" ");
    mac.update(to.as_bytes());
    mac.update(b" ");
    mac.update(from.as_bytes());
    mac
}

/// Computes the dialback key for a known secret.
pub fn dialback_key(secret: &str, stream_id: &str, to: &str, from: &str) -> String {
    hex::encode(keyed_mac(secret, stream_id, to, from).finalize().into_bytes())
}

/// Generates the key `from` asserts towards `to` on stream `stream_id`.
///
/// Returns `None` when no secret is configured for `from`.
pub fn generate<S: SecretStore + ?Sized>(
    secrets: &S,
    stream_id: &str,
    to: &str,
    from: &str,
) -> Option<String> {
    let secret = secrets.secret_for(from)?;
    Some(dialback_key(&secret, stream_id, to, from))
}

/// Checks a candidate key against the one this server would generate.
///
/// Only the lowercase hex form we emit is accepted. Unknown `from` domains
/// never verify.
pub fn verify<S: SecretStore + ?Sized>(
    secrets: &S,
    stream_id: &str,
    to: &str,
    from: &str,
    candidate: &str,
) -> bool {
    let Some(secret) = secrets.secret_for(from) else {
        return false;
    };
    if candidate.bytes().any(|b| b.is_ascii_uppercase()) {
        return false;
    }
    let Ok(tag) = hex::decode(candidate) else {
        return false;
    };
    keyed_mac(&secret, stream_id, to, from)
        .verify_slice(&tag)
        .is_ok()
}

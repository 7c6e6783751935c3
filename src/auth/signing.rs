//! Canonical signing input and encoding helpers for the handshake.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

/// Build the canonical string both sides sign.
///
/// Must stay deterministic: LF separators only, trailing LF included.
pub fn string_to_sign_v1(
    agent_id: &str,
    challenge_id: &str,
    nonce: &str,
    issued_at_ms: i64,
) -> String {
    format!(
        "switchboard-auth-v1\n\
         agent_id={agent_id}\n\
         challenge_id={challenge_id}\n\
         nonce={nonce}\n\
         issued_at_ms={issued_at_ms}\n"
    )
}

/// Encode bytes as base64url without padding.
pub(crate) fn b64_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url without padding.
pub(crate) fn b64_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(s)
}

/// Fill `n` bytes from the OS random source.
pub(crate) fn random_bytes(n: usize) -> Result<Vec<u8>, rand::Error> {
    let mut buf = vec![0u8; n];
    OsRng.try_fill_bytes(&mut buf)?;
    Ok(buf)
}

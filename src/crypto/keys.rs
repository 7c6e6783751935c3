//! Ed25519 keys and the agent identity derived from them.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::ZeroizeOnDrop;

/// Derive the agent identity from a public key.
///
/// The identity is the lowercase hex SHA-256 of the raw 32-byte public
/// key, a pure function of the key: stable across runs and processes.
pub fn agent_id_from_public_key(public: &VerifyingKey) -> String {
    hex::encode(Sha256::digest(public.as_bytes()))
}

/// Verify a detached Ed25519 signature using only the public key.
pub fn verify_detached(public: &VerifyingKey, message: &[u8], signature: &[u8; 64]) -> bool {
    public
        .verify(message, &Signature::from_bytes(signature))
        .is_ok()
}

/// Key pair for handshake signatures (Ed25519).
///
/// The signing half is wiped from memory on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SigningKeyPair {
    signing: SigningKey,
    #[zeroize(skip)]
    verifying: VerifyingKey,
}

impl SigningKeyPair {
    /// Generate a new random signing key pair.
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let verifying = signing.verifying_key();
        Self { signing, verifying }
    }

    /// Create from an existing signing key.
    pub fn from_signing_key(signing: SigningKey) -> Self {
        let verifying = signing.verifying_key();
        Self { signing, verifying }
    }

    /// Create from raw secret bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(bytes))
    }

    /// Get the signing (private) key.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    /// Get the verifying (public) key.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying
    }

    /// Get the raw public key bytes.
    pub fn public_bytes(&self) -> [u8; 32] {
        self.verifying.to_bytes()
    }

    /// The identity this key pair authenticates as.
    pub fn agent_id(&self) -> String {
        agent_id_from_public_key(&self.verifying)
    }

    /// Produce a detached signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        let sig: Signature = self.signing.sign(message);
        sig.to_bytes()
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("public", &hex::encode(&self.public_bytes()[..8]))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_is_lowercase_hex_sha256() {
        let kp = SigningKeyPair::generate();
        let id = kp.agent_id();

        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        let expected = hex::encode(Sha256::digest(kp.public_bytes()));
        assert_eq!(id, expected);
    }

    #[test]
    fn agent_id_is_stable_for_a_key() {
        let kp = SigningKeyPair::generate();
        let reloaded = SigningKeyPair::from_bytes(&kp.signing_key().to_bytes());

        assert_eq!(kp.agent_id(), reloaded.agent_id());
        assert_ne!(kp.agent_id(), SigningKeyPair::generate().agent_id());
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let kp = SigningKeyPair::generate();
        let message = b"hello world";
        let signature = kp.sign(message);

        assert!(verify_detached(kp.verifying_key(), message, &signature));
        assert!(!verify_detached(kp.verifying_key(), b"other message", &signature));

        let other = SigningKeyPair::generate();
        assert!(!verify_detached(other.verifying_key(), message, &signature));
    }

    #[test]
    fn debug_redacts_secret_material() {
        let kp = SigningKeyPair::generate();
        let debug = format!("{kp:?}");
        let secret_hex = hex::encode(kp.signing_key().to_bytes());
        assert!(!debug.contains(&secret_hex));
    }
}

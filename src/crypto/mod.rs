//! Cryptographic identity for the tunnel.
//!
//! This module provides:
//! - Ed25519 signing keys and detached signature verification
//! - The agent identity (lowercase hex SHA-256 of the raw public key)
//! - The persisted key store used by the handshake client

mod keys;
mod keystore;

pub use keys::{agent_id_from_public_key, verify_detached, SigningKeyPair};
pub use keystore::{
    agent_key_paths, key_paths_from_override, load_or_create_agent_key,
    load_or_create_agent_key_at, AgentKey, AGENT_KEY_ENV_PATH, DEFAULT_PRIVATE_KEY_NAME,
    DEFAULT_PUBLIC_KEY_NAME,
};

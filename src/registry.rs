//! In-memory agent registry.
//!
//! The server handshake needs a lookup from claimed agent id to the
//! registered public key. Deployments back this with whatever store they
//! like; this registry is the in-process implementation used by tests and
//! single-proxy setups.

use std::collections::HashMap;

use ed25519_dalek::VerifyingKey;
use parking_lot::RwLock;

use crate::crypto::agent_id_from_public_key;

/// Thread-safe map from agent id to registered public key.
///
/// Registration derives the id from the key, so the registry is
/// self-consistent by construction.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, VerifyingKey>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a public key and return the agent id it authenticates.
    /// Re-registering the same key is a no-op.
    pub fn register(&self, public_key: VerifyingKey) -> String {
        let agent_id = agent_id_from_public_key(&public_key);
        self.agents.write().insert(agent_id.clone(), public_key);
        agent_id
    }

    /// Remove a registered agent. Returns whether it was present.
    pub fn remove(&self, agent_id: &str) -> bool {
        self.agents.write().remove(agent_id).is_some()
    }

    /// Resolve an agent id to its registered public key.
    pub fn lookup(&self, agent_id: &str) -> Option<VerifyingKey> {
        self.agents.read().get(agent_id).copied()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }
}

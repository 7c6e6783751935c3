//! # Switchboard Tunnel
//!
//! Wire protocol and mutually-authenticated handshake for the tunnel
//! carrying proxied messages between a developer-machine agent and a
//! public proxy.
//!
//! ## Architecture
//!
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Routing / Message Consumers                     │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   Auth Handshake (challenge–response, Ed25519 signatures)       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   Connection (multiplexing, fragmentation, reassembly)          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   Frame Codec (18-byte header, strict validation)               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   Transport (any ordered, reliable byte stream; TLS in prod)    │
//! └─────────────────────────────────────────────────────────────────┘
//!
//! The framing layer is symmetric between the peers; only the handshake
//! is asymmetric (client = agent, server = proxy). The transport itself
//! is an external collaborator: anything `AsyncRead + AsyncWrite` works,
//! from a TLS stream to an in-process duplex pipe in tests.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow stylistic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]      // Many functions can't be const due to trait bounds
#![allow(clippy::doc_markdown)]              // ASCII diagrams in docs
#![allow(clippy::cast_possible_truncation)]  // Payload lengths are bounded by config
#![allow(clippy::cast_possible_wrap)]        // Millisecond timestamps fit i64
#![allow(clippy::use_self)]                  // Explicit type names in matches
#![allow(clippy::redundant_pub_crate)]       // Explicit visibility
#![allow(clippy::too_many_lines)]            // Complete state machines
#![allow(clippy::future_not_send)]           // Async internals
#![allow(clippy::match_same_arms)]           // Explicit arm per variant is clearer
#![allow(clippy::return_self_not_must_use)]  // Builder methods don't need must_use
#![allow(clippy::ignored_unit_patterns)]     // Ok(_) vs Ok(()) is stylistic

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod registry;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::Config;
pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::auth::{
        authenticate_as_client, authenticate_with_keypair, wait_for_agent_authentication,
        HandshakeConfig,
    };
    pub use crate::config::Config;
    pub use crate::crypto::{agent_id_from_public_key, load_or_create_agent_key, SigningKeyPair};
    pub use crate::error::{AuthCode, Error, Result};
    pub use crate::protocol::{
        AuthStage, Cancellation, Conn, FrameType, Message, PayloadFormat, PayloadKind,
    };
    pub use crate::registry::AgentRegistry;
}

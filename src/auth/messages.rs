//! Handshake message payloads.
//!
//! Every payload is a UTF-8 JSON object with a `type` tag and schema
//! version `v`. Unknown fields are tolerated so newer peers can extend
//! messages; unknown types and wrong versions are rejected. Absent
//! fields decode to their zero value and fail the handshake's explicit
//! checks instead of the parser.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Handshake message schema version.
pub const AUTH_VERSION: u32 = 1;

/// Client → server: claim an identity and open the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthBegin {
    #[serde(rename = "type", default)]
    pub msg_type: String,
    #[serde(default)]
    pub v: u32,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_time_ms: Option<i64>,
}

impl AuthBegin {
    pub fn new(agent_id: impl Into<String>, client_time_ms: i64) -> Self {
        Self {
            msg_type: "auth_begin".into(),
            v: AUTH_VERSION,
            agent_id: agent_id.into(),
            client_time_ms: Some(client_time_ms),
        }
    }
}

/// Server → client: a freshly minted challenge to sign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthChallenge {
    #[serde(rename = "type", default)]
    pub msg_type: String,
    #[serde(default)]
    pub v: u32,
    #[serde(default)]
    pub challenge_id: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub issued_at_ms: i64,
    #[serde(default)]
    pub expires_at_ms: i64,
}

impl AuthChallenge {
    pub fn new(
        challenge_id: impl Into<String>,
        nonce: impl Into<String>,
        issued_at_ms: i64,
        expires_at_ms: i64,
    ) -> Self {
        Self {
            msg_type: "auth_challenge".into(),
            v: AUTH_VERSION,
            challenge_id: challenge_id.into(),
            nonce: nonce.into(),
            issued_at_ms,
            expires_at_ms,
        }
    }
}

/// Client → server: the challenge fields echoed back plus the signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthProof {
    #[serde(rename = "type", default)]
    pub msg_type: String,
    #[serde(default)]
    pub v: u32,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub challenge_id: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub issued_at_ms: i64,
    #[serde(default)]
    pub signature: String,
}

impl AuthProof {
    pub fn new(
        agent_id: impl Into<String>,
        challenge_id: impl Into<String>,
        nonce: impl Into<String>,
        issued_at_ms: i64,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            msg_type: "auth_proof".into(),
            v: AUTH_VERSION,
            agent_id: agent_id.into(),
            challenge_id: challenge_id.into(),
            nonce: nonce.into(),
            issued_at_ms,
            signature: signature.into(),
        }
    }
}

/// Server → client: the connection is authenticated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthOk {
    #[serde(rename = "type", default)]
    pub msg_type: String,
    #[serde(default)]
    pub v: u32,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub authenticated_at_ms: i64,
}

impl AuthOk {
    pub fn new(agent_id: impl Into<String>, authenticated_at_ms: i64) -> Self {
        Self {
            msg_type: "auth_ok".into(),
            v: AUTH_VERSION,
            agent_id: agent_id.into(),
            authenticated_at_ms,
        }
    }
}

/// Server → client: the handshake was rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthErrorMessage {
    #[serde(rename = "type", default)]
    pub msg_type: String,
    #[serde(default)]
    pub v: u32,
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl AuthErrorMessage {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            msg_type: "auth_error".into(),
            v: AUTH_VERSION,
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Serialize a handshake message to its JSON payload bytes.
pub(crate) fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, AuthError> {
    serde_json::to_vec(msg).map_err(|e| AuthError::InvalidPayload(e.to_string()))
}

/// Parse a handshake payload, validating the `type`/`v` header first.
pub(crate) fn decode_message<T: DeserializeOwned>(
    payload: &[u8],
    want_type: &'static str,
) -> Result<T, AuthError> {
    if payload.is_empty() {
        return Err(AuthError::InvalidPayload("empty payload".into()));
    }

    #[derive(Deserialize)]
    struct Header {
        #[serde(rename = "type", default)]
        msg_type: String,
        #[serde(default)]
        v: u32,
    }

    let header: Header =
        serde_json::from_slice(payload).map_err(|e| AuthError::InvalidPayload(e.to_string()))?;
    if header.msg_type != want_type {
        return Err(AuthError::UnexpectedMessage {
            got: header.msg_type,
            want: want_type,
        });
    }
    if header.v != AUTH_VERSION {
        return Err(AuthError::UnsupportedVersion {
            got: header.v,
            want: AUTH_VERSION,
        });
    }

    serde_json::from_slice(payload).map_err(|e| AuthError::InvalidPayload(e.to_string()))
}

//! Challenge–response authentication handshake.
//!
//! Runs over one tunnel connection. The client (agent) proves possession
//! of its Ed25519 private key by signing a server-minted challenge; the
//! server (proxy) binds the connection to the agent identity derived from
//! the registered public key.
//!
//! Server view of the exchange:
//!
//! ```text
//! INIT → AWAIT_BEGIN → AWAIT_PROOF → {OK, ERROR}
//! ```
//!
//! Every transition consumes or emits exactly one auth frame; there is no
//! retry. On rejection the server best-effort sends `auth_error` with a
//! stable code, closes the connection, and reports the failure.

pub mod messages;
mod signing;

pub use signing::string_to_sign_v1;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::crypto::{
    agent_id_from_public_key, load_or_create_agent_key, verify_detached, SigningKeyPair,
};
use crate::error::{AuthCode, AuthError, AuthRejection, Error, Result};
use crate::protocol::{AuthStage, Cancellation, Conn, Message};

use messages::{AuthBegin, AuthChallenge, AuthErrorMessage, AuthOk, AuthProof};
use signing::{b64_decode, b64_encode, random_bytes};

/// Server-minted nonce length in bytes (base64url-encoded on the wire).
const NONCE_LEN: usize = 32;
/// Server-minted challenge id length in bytes.
const CHALLENGE_ID_LEN: usize = 24;

/// Handshake timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// Deadline for each inbound handshake read.
    #[serde(default = "default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Deadline for each handshake send.
    #[serde(default = "default_write_timeout", with = "humantime_serde")]
    pub write_timeout: Duration,

    /// Window between challenge issuance and proof acceptance.
    #[serde(default = "default_challenge_ttl", with = "humantime_serde")]
    pub challenge_ttl: Duration,
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_write_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_challenge_ttl() -> Duration {
    Duration::from_secs(30)
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            read_timeout: default_read_timeout(),
            write_timeout: default_write_timeout(),
            challenge_ttl: default_challenge_ttl(),
        }
    }
}

/// Authenticate the local agent over `conn`, loading the persisted key
/// pair (and creating one on first use).
///
/// Returns the authenticated agent id.
pub async fn authenticate_as_client<S>(conn: &Conn<S>, config: &HandshakeConfig) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let key = load_or_create_agent_key()?;
    authenticate_with_keypair(conn, &key.keypair, config).await
}

/// Authenticate over `conn` as the agent holding `keypair`.
pub async fn authenticate_with_keypair<S>(
    conn: &Conn<S>,
    keypair: &SigningKeyPair,
    config: &HandshakeConfig,
) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let agent_id = keypair.agent_id();
    debug!(%agent_id, "starting agent authentication");

    let begin = AuthBegin::new(agent_id.clone(), now_ms());
    send_auth(conn, AuthStage::Begin, &begin, config).await?;

    // Challenge.
    let challenge_payload = read_auth(conn, AuthStage::Challenge, config).await?;
    let challenge: AuthChallenge = messages::decode_message(&challenge_payload, "auth_challenge")?;
    if challenge.challenge_id.trim().is_empty() || challenge.nonce.trim().is_empty() {
        return Err(AuthError::IncompleteChallenge.into());
    }

    // Proof.
    let to_sign = string_to_sign_v1(
        &agent_id,
        &challenge.challenge_id,
        &challenge.nonce,
        challenge.issued_at_ms,
    );
    let signature = keypair.sign(to_sign.as_bytes());
    let proof = AuthProof::new(
        agent_id.clone(),
        challenge.challenge_id,
        challenge.nonce,
        challenge.issued_at_ms,
        b64_encode(&signature),
    );
    send_auth(conn, AuthStage::Proof, &proof, config).await?;

    // Result.
    let result = conn
        .recv(&Cancellation::with_timeout(config.read_timeout))
        .await?;
    match result {
        Message::Auth {
            stage: AuthStage::Ok,
            payload,
        } => {
            let ok: AuthOk = messages::decode_message(&payload, "auth_ok")?;
            if ok.agent_id != agent_id {
                return Err(AuthError::AgentIdMismatch {
                    got: ok.agent_id,
                    want: agent_id,
                }
                .into());
            }
            debug!(%agent_id, "agent authenticated");
            Ok(agent_id)
        }

        Message::Auth {
            stage: AuthStage::Error,
            payload,
        } => {
            let rejected: AuthErrorMessage = messages::decode_message(&payload, "auth_error")?;
            let message = (!rejected.message.is_empty()).then_some(rejected.message);
            Err(AuthError::Rejected(AuthRejection {
                code: AuthCode::parse(&rejected.code),
                message,
            })
            .into())
        }

        other => {
            let _ = conn.close().await;
            Err(AuthError::UnexpectedFrame {
                got: other.frame_type().as_u8(),
                want: "auth result",
            }
            .into())
        }
    }
}

/// Wait for an agent to authenticate over `conn`.
///
/// `lookup` resolves a claimed agent id to its registered public key.
/// Returns the authenticated agent id on success.
pub async fn wait_for_agent_authentication<S, F>(
    conn: &Conn<S>,
    lookup: F,
    config: &HandshakeConfig,
) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: Fn(&str) -> Option<VerifyingKey>,
{
    let begin_payload = read_auth(conn, AuthStage::Begin, config).await?;
    let begin: AuthBegin = match messages::decode_message(&begin_payload, "auth_begin") {
        Ok(begin) => begin,
        Err(err) => {
            let _ = conn.close().await;
            return Err(err.into());
        }
    };

    let agent_id = begin.agent_id;
    if agent_id.trim().is_empty() {
        return Err(reject(conn, config, AuthCode::ProtocolError, Some("missing agent_id")).await);
    }

    let Some(public) = lookup(&agent_id) else {
        return Err(reject(conn, config, AuthCode::UnknownAgent, None).await);
    };
    // The registry must be self-consistent: the id is derived from the key.
    if agent_id != agent_id_from_public_key(&public) {
        return Err(reject(conn, config, AuthCode::UnknownAgent, None).await);
    }

    let issued_at_ms = now_ms();
    let expires_at_ms = issued_at_ms + config.challenge_ttl.as_millis() as i64;
    let Ok(nonce) = random_bytes(NONCE_LEN) else {
        return Err(reject(
            conn,
            config,
            AuthCode::InternalError,
            Some("nonce generation failed"),
        )
        .await);
    };
    let Ok(challenge_id) = random_bytes(CHALLENGE_ID_LEN) else {
        return Err(reject(
            conn,
            config,
            AuthCode::InternalError,
            Some("challenge_id generation failed"),
        )
        .await);
    };

    let challenge = AuthChallenge::new(
        b64_encode(&challenge_id),
        b64_encode(&nonce),
        issued_at_ms,
        expires_at_ms,
    );
    if let Err(err) = send_auth(conn, AuthStage::Challenge, &challenge, config).await {
        let _ = conn.close().await;
        return Err(err);
    }

    let proof_payload = match read_auth(conn, AuthStage::Proof, config).await {
        Ok(payload) => payload,
        Err(err) => {
            let _ = conn.close().await;
            return Err(err);
        }
    };
    let proof: AuthProof = match messages::decode_message(&proof_payload, "auth_proof") {
        Ok(proof) => proof,
        Err(_) => {
            return Err(reject(conn, config, AuthCode::ProtocolError, Some("invalid auth_proof")).await)
        }
    };

    // Challenge binding.
    if proof.agent_id != agent_id {
        return Err(reject(conn, config, AuthCode::ProtocolError, Some("agent_id mismatch")).await);
    }
    if proof.challenge_id != challenge.challenge_id
        || proof.nonce != challenge.nonce
        || proof.issued_at_ms != challenge.issued_at_ms
    {
        return Err(reject(conn, config, AuthCode::ReplayedChallenge, None).await);
    }

    // Freshness.
    if now_ms() > challenge.expires_at_ms {
        return Err(reject(conn, config, AuthCode::ExpiredChallenge, None).await);
    }

    let Ok(signature) = b64_decode(&proof.signature) else {
        return Err(reject(conn, config, AuthCode::BadSignature, None).await);
    };
    let Ok(signature) = <[u8; 64]>::try_from(signature.as_slice()) else {
        return Err(reject(conn, config, AuthCode::BadSignature, None).await);
    };

    let to_verify = string_to_sign_v1(&agent_id, &proof.challenge_id, &proof.nonce, proof.issued_at_ms);
    if !verify_detached(&public, to_verify.as_bytes(), &signature) {
        return Err(reject(conn, config, AuthCode::BadSignature, None).await);
    }

    let ok = AuthOk::new(agent_id.clone(), now_ms());
    if let Err(err) = send_auth(conn, AuthStage::Ok, &ok, config).await {
        let _ = conn.close().await;
        return Err(err);
    }

    info!(%agent_id, "agent authenticated");
    Ok(agent_id)
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

async fn send_auth<S, T>(
    conn: &Conn<S>,
    stage: AuthStage,
    msg: &T,
    config: &HandshakeConfig,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = messages::encode_message(msg)?;
    conn.send(
        &Message::auth(stage, payload),
        &Cancellation::with_timeout(config.write_timeout),
    )
    .await
}

/// Read the next message, requiring the given handshake stage.
async fn read_auth<S>(conn: &Conn<S>, want: AuthStage, config: &HandshakeConfig) -> Result<Bytes>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let msg = conn
        .recv(&Cancellation::with_timeout(config.read_timeout))
        .await?;
    match msg {
        Message::Auth { stage, payload } if stage == want => Ok(payload),
        other => {
            let _ = conn.close().await;
            Err(AuthError::UnexpectedFrame {
                got: other.frame_type().as_u8(),
                want: stage_name(want),
            }
            .into())
        }
    }
}

const fn stage_name(stage: AuthStage) -> &'static str {
    match stage {
        AuthStage::Begin => "auth_begin",
        AuthStage::Challenge => "auth_challenge",
        AuthStage::Proof => "auth_proof",
        AuthStage::Ok => "auth_ok",
        AuthStage::Error => "auth_error",
    }
}

/// Best-effort send `auth_error{code}` and close, returning the failure
/// to hand back to the caller. Transmission errors on the error frame are
/// swallowed; the stream is going away either way.
async fn reject<S>(
    conn: &Conn<S>,
    config: &HandshakeConfig,
    code: AuthCode,
    detail: Option<&str>,
) -> Error
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    warn!(code = code.as_str(), "rejecting agent authentication");
    let payload = AuthErrorMessage::new(code.as_str(), detail.unwrap_or_default());
    let _ = send_auth(conn, AuthStage::Error, &payload, config).await;
    let _ = conn.close().await;

    Error::Auth(AuthError::Rejected(AuthRejection {
        code,
        message: detail.map(str::to_string),
    }))
}

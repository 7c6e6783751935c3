//! Error types for the switchboard tunnel core.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result type alias for tunnel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the tunnel core.
#[derive(Error, Debug)]
pub enum Error {
    // Wire protocol errors
    #[error("tunnel protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // Handshake errors
    #[error("{0}")]
    Auth(#[from] AuthError),

    // Key and identity errors
    #[error("invalid key: {0}")]
    InvalidKey(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    // Cancellation
    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // General errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this is a protocol-class error (fatal to the connection).
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Check if this error carries a cancellation cause.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

/// Wire protocol violations.
///
/// Every variant is fatal to the connection when observed on the receive
/// path: the stream is desynchronized and the receiver tears it down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("bad magic")]
    BadMagic,

    #[error("unsupported version {got:#04x}")]
    BadVersion { got: u8 },

    #[error("unknown frame type {0:#04x}")]
    UnknownType(u8),

    #[error("invalid flags {0:#06x}")]
    InvalidFlags(u16),

    #[error("frame payload too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("fragmentation error: {0}")]
    Fragmentation(&'static str),

    #[error("payload envelope error: {0}")]
    Envelope(&'static str),

    #[error("invalid stream id {stream_id} for frame type {frame_type:#04x}")]
    InvalidStreamId { frame_type: u8, stream_id: u64 },

    #[error("ping/pong frames must have stream_id=0, empty payload, START|END")]
    InvalidControlFrame,

    #[error("max frame payload {max} too small for payload envelope")]
    MaxPayloadTooSmall { max: usize },
}

/// Handshake failures.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("authentication failed: {0}")]
    Rejected(AuthRejection),

    #[error("unexpected frame type {got:#04x} while waiting for {want}")]
    UnexpectedFrame { got: u8, want: &'static str },

    #[error("unexpected auth message type {got:?} (want {want:?})")]
    UnexpectedMessage { got: String, want: &'static str },

    #[error("unsupported auth version {got} (want {want})")]
    UnsupportedVersion { got: u32, want: u32 },

    #[error("invalid auth payload: {0}")]
    InvalidPayload(String),

    #[error("invalid auth_challenge: missing challenge_id or nonce")]
    IncompleteChallenge,

    #[error("auth_ok agent_id mismatch: got {got:?} want {want:?}")]
    AgentIdMismatch { got: String, want: String },
}

/// A handshake rejection: a stable code plus optional human detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRejection {
    pub code: AuthCode,
    pub message: Option<String>,
}

impl AuthRejection {
    pub fn new(code: AuthCode) -> Self {
        Self {
            code,
            message: None,
        }
    }

    pub fn with_message(code: AuthCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{} ({msg})", self.code),
            None => write!(f, "{}", self.code),
        }
    }
}

/// Stable handshake rejection codes.
///
/// The string tokens are part of the wire contract and must not change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCode {
    ProtocolError,
    UnknownAgent,
    ReplayedChallenge,
    ExpiredChallenge,
    BadSignature,
    InternalError,
    /// A code this build does not know. Kept verbatim so newer peers can
    /// introduce codes without breaking older clients.
    Unrecognized(String),
}

impl AuthCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ProtocolError => "protocol_error",
            Self::UnknownAgent => "unknown_agent",
            Self::ReplayedChallenge => "replayed_challenge",
            Self::ExpiredChallenge => "expired_challenge",
            Self::BadSignature => "bad_signature",
            Self::InternalError => "internal_error",
            Self::Unrecognized(code) => code,
        }
    }

    pub fn parse(code: &str) -> Self {
        match code {
            "protocol_error" => Self::ProtocolError,
            "unknown_agent" => Self::UnknownAgent,
            "replayed_challenge" => Self::ReplayedChallenge,
            "expired_challenge" => Self::ExpiredChallenge,
            "bad_signature" => Self::BadSignature,
            "internal_error" => Self::InternalError,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl fmt::Display for AuthCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_code_tokens_are_stable() {
        let codes = [
            (AuthCode::ProtocolError, "protocol_error"),
            (AuthCode::UnknownAgent, "unknown_agent"),
            (AuthCode::ReplayedChallenge, "replayed_challenge"),
            (AuthCode::ExpiredChallenge, "expired_challenge"),
            (AuthCode::BadSignature, "bad_signature"),
            (AuthCode::InternalError, "internal_error"),
        ];
        for (code, token) in codes {
            assert_eq!(code.as_str(), token);
            assert_eq!(AuthCode::parse(token), code);
        }
    }

    #[test]
    fn unrecognized_codes_round_trip() {
        let code = AuthCode::parse("rate_limited");
        assert_eq!(code, AuthCode::Unrecognized("rate_limited".to_string()));
        assert_eq!(code.as_str(), "rate_limited");
    }

    #[test]
    fn protocol_errors_are_fatal() {
        assert!(Error::Protocol(ProtocolError::BadMagic).is_protocol());
        assert!(!Error::Cancelled.is_protocol());
        assert!(Error::Cancelled.is_cancellation());
        assert!(Error::DeadlineExceeded.is_cancellation());
    }

    #[test]
    fn rejection_display_includes_detail() {
        let bare = AuthRejection::new(AuthCode::BadSignature);
        assert_eq!(bare.to_string(), "bad_signature");

        let detailed = AuthRejection::with_message(AuthCode::ProtocolError, "missing agent_id");
        assert_eq!(detailed.to_string(), "protocol_error (missing agent_id)");
    }
}

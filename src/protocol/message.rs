//! Logical tunnel messages.
//!
//! A logical message is what one `send` emits and one `recv` returns:
//! one or more frames sharing `(type, stream_id)`, bracketed by the
//! `START` and `END` flags, reassembled in arrival order.

use bytes::Bytes;

use super::{FrameType, PayloadFormat, PayloadKind};

/// Handshake stage carried by an auth frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthStage {
    Begin,
    Challenge,
    Proof,
    Ok,
    Error,
}

impl AuthStage {
    pub const fn frame_type(self) -> FrameType {
        match self {
            Self::Begin => FrameType::AuthBegin,
            Self::Challenge => FrameType::AuthChallenge,
            Self::Proof => FrameType::AuthProof,
            Self::Ok => FrameType::AuthOk,
            Self::Error => FrameType::AuthError,
        }
    }

    pub const fn from_frame_type(t: FrameType) -> Option<Self> {
        match t {
            FrameType::AuthBegin => Some(Self::Begin),
            FrameType::AuthChallenge => Some(Self::Challenge),
            FrameType::AuthProof => Some(Self::Proof),
            FrameType::AuthOk => Some(Self::Ok),
            FrameType::AuthError => Some(Self::Error),
            _ => None,
        }
    }
}

/// One logical tunnel message.
///
/// Control messages carry nothing; auth messages carry an opaque byte
/// payload (a UTF-8 JSON document at the handshake layer); payload
/// messages carry an envelope plus data addressed to a non-zero stream.
/// The model is structural; cross-field rules are enforced on the send
/// and receive paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Keepalive probe.
    Ping,
    /// Keepalive reply.
    Pong,
    /// Handshake stage message. Always stream 0.
    Auth { stage: AuthStage, payload: Bytes },
    /// Proxied message addressed to a logical stream.
    Payload {
        stream_id: u64,
        kind: PayloadKind,
        format: PayloadFormat,
        data: Bytes,
    },
}

impl Message {
    pub fn ping() -> Self {
        Self::Ping
    }

    pub fn pong() -> Self {
        Self::Pong
    }

    pub fn auth(stage: AuthStage, payload: impl Into<Bytes>) -> Self {
        Self::Auth {
            stage,
            payload: payload.into(),
        }
    }

    /// A request payload message (opaque bytes).
    pub fn request(stream_id: u64, data: impl Into<Bytes>) -> Self {
        Self::payload(stream_id, PayloadKind::Request, data)
    }

    /// A response payload message (opaque bytes).
    pub fn response(stream_id: u64, data: impl Into<Bytes>) -> Self {
        Self::payload(stream_id, PayloadKind::Response, data)
    }

    /// A oneway payload message (opaque bytes).
    pub fn oneway(stream_id: u64, data: impl Into<Bytes>) -> Self {
        Self::payload(stream_id, PayloadKind::Oneway, data)
    }

    pub fn payload(stream_id: u64, kind: PayloadKind, data: impl Into<Bytes>) -> Self {
        Self::Payload {
            stream_id,
            kind,
            format: PayloadFormat::OpaqueBytes,
            data: data.into(),
        }
    }

    /// The frame type this message is carried in.
    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::Ping => FrameType::Ping,
            Self::Pong => FrameType::Pong,
            Self::Auth { stage, .. } => stage.frame_type(),
            Self::Payload { .. } => FrameType::Payload,
        }
    }

    /// The stream this message is addressed to. Zero for everything but
    /// payload messages.
    pub fn stream_id(&self) -> u64 {
        match self {
            Self::Payload { stream_id, .. } => *stream_id,
            _ => 0,
        }
    }
}

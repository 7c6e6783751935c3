//! Tunnel wire protocol.
//!
//! Defines the frame format, logical message model, and the connection
//! layer that fragments and reassembles messages over an ordered,
//! reliable byte stream.
//!
//! ## Frame Format
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ Magic (2) │ Version (1) │ Type (1) │ Flags (2) │ Stream ID (8)   │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ Payload Length (4) │ Payload ...                                 │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All multi-byte integers are big-endian.

mod cancel;
mod conn;
mod frame;
mod message;

pub use cancel::{CancelCause, Cancellation};
pub use conn::Conn;
pub use message::{AuthStage, Message};

/// Frame magic bytes (`'S'`, `'B'`).
pub const MAGIC: [u8; 2] = [0x53, 0x42];

/// Wire protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Header size in bytes: magic + version + type + flags + stream id + length.
pub const HEADER_SIZE: usize = 18;

/// Size of the payload-message envelope carried at the start of the first
/// fragment of every payload message.
pub const ENVELOPE_SIZE: usize = 4;

/// Default maximum frame payload size.
pub const DEFAULT_MAX_FRAME_PAYLOAD: usize = 16 << 20; // 16 MiB

/// Frame flag bits. Any other bit on the wire is a protocol error.
pub mod flags {
    /// First frame of a logical message.
    pub const START: u16 = 0x0001;
    /// Final frame of a logical message.
    pub const END: u16 = 0x0002;
    /// Single-frame messages carry both edge flags.
    pub const START_END: u16 = START | END;
    /// All flag bits defined in protocol v1.
    pub const MASK: u16 = START | END;
}

/// Tunnel frame type ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    AuthBegin = 0x01,
    AuthChallenge = 0x02,
    AuthProof = 0x03,
    AuthOk = 0x04,
    AuthError = 0x05,

    Payload = 0x10,

    Ping = 0xFE,
    Pong = 0xFF,
}

impl FrameType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::AuthBegin),
            0x02 => Some(Self::AuthChallenge),
            0x03 => Some(Self::AuthProof),
            0x04 => Some(Self::AuthOk),
            0x05 => Some(Self::AuthError),
            0x10 => Some(Self::Payload),
            0xFE => Some(Self::Ping),
            0xFF => Some(Self::Pong),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if this is one of the handshake stage types.
    pub const fn is_auth(self) -> bool {
        matches!(
            self,
            Self::AuthBegin | Self::AuthChallenge | Self::AuthProof | Self::AuthOk | Self::AuthError
        )
    }

    /// Check if this is a keepalive control type.
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Ping | Self::Pong)
    }
}

/// First byte of the payload-message envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadKind {
    Request = 0x01,
    Response = 0x02,
    Oneway = 0x03,
}

impl PayloadKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::Request),
            0x02 => Some(Self::Response),
            0x03 => Some(Self::Oneway),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Second byte of the payload-message envelope.
///
/// v1 defines only opaque bytes; the routing layer gives the data meaning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadFormat {
    #[default]
    OpaqueBytes = 0x00,
}

impl PayloadFormat {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(Self::OpaqueBytes),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

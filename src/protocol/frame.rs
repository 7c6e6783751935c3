//! Frame encoding and decoding.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{flags, FrameType, HEADER_SIZE, MAGIC, PROTOCOL_VERSION};
use crate::error::{ProtocolError, Result};

/// One decoded wire frame. Exists only between decode and reassembly.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub frame_type: FrameType,
    pub flags: u16,
    pub stream_id: u64,
    pub payload: Bytes,
}

impl Frame {
    pub(crate) fn is_final(&self) -> bool {
        self.flags & flags::END != 0
    }
}

/// Encode one frame onto `w`: the 18-byte header, then the payload.
///
/// At most two writes are issued so the codec behaves the same over
/// buffered and unbuffered streams. The writer is never flushed or closed.
pub(crate) async fn encode_frame_to<W>(
    w: &mut W,
    frame_type: FrameType,
    flag_bits: u16,
    stream_id: u64,
    payload: &[u8],
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut hdr = [0u8; HEADER_SIZE];
    hdr[0] = MAGIC[0];
    hdr[1] = MAGIC[1];
    hdr[2] = PROTOCOL_VERSION;
    hdr[3] = frame_type.as_u8();
    hdr[4..6].copy_from_slice(&flag_bits.to_be_bytes());
    hdr[6..14].copy_from_slice(&stream_id.to_be_bytes());
    hdr[14..18].copy_from_slice(&(payload.len() as u32).to_be_bytes());

    w.write_all(&hdr).await?;
    if !payload.is_empty() {
        w.write_all(payload).await?;
    }
    Ok(())
}

/// Decode one frame from `r`.
///
/// The header is validated magic, version, type, flags, length, in that
/// order; the first violated check wins. Short reads surface the
/// underlying IO error unchanged so EOF stays distinguishable from
/// protocol errors.
pub(crate) async fn decode_frame_from<R>(r: &mut R, max_payload: usize) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut hdr = [0u8; HEADER_SIZE];
    r.read_exact(&mut hdr).await?;

    if hdr[0] != MAGIC[0] || hdr[1] != MAGIC[1] {
        return Err(ProtocolError::BadMagic.into());
    }
    if hdr[2] != PROTOCOL_VERSION {
        return Err(ProtocolError::BadVersion { got: hdr[2] }.into());
    }

    let Some(frame_type) = FrameType::from_u8(hdr[3]) else {
        return Err(ProtocolError::UnknownType(hdr[3]).into());
    };

    let flag_bits = u16::from_be_bytes([hdr[4], hdr[5]]);
    if flag_bits & !flags::MASK != 0 {
        return Err(ProtocolError::InvalidFlags(flag_bits).into());
    }

    let stream_id = u64::from_be_bytes(hdr[6..14].try_into().expect("8-byte slice"));
    let payload_len = u32::from_be_bytes(hdr[14..18].try_into().expect("4-byte slice")) as usize;
    if payload_len > max_payload {
        return Err(ProtocolError::FrameTooLarge {
            size: payload_len,
            max: max_payload,
        }
        .into());
    }

    let payload = if payload_len > 0 {
        let mut buf = vec![0u8; payload_len];
        r.read_exact(&mut buf).await?;
        Bytes::from(buf)
    } else {
        Bytes::new()
    };

    Ok(Frame {
        frame_type,
        flags: flag_bits,
        stream_id,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn raw_header(magic: [u8; 2], version: u8, typ: u8, flag_bits: u16, stream_id: u64, len: u32) -> Vec<u8> {
        let mut hdr = Vec::with_capacity(HEADER_SIZE);
        hdr.extend_from_slice(&magic);
        hdr.push(version);
        hdr.push(typ);
        hdr.extend_from_slice(&flag_bits.to_be_bytes());
        hdr.extend_from_slice(&stream_id.to_be_bytes());
        hdr.extend_from_slice(&len.to_be_bytes());
        hdr
    }

    fn protocol_err(err: Error) -> ProtocolError {
        match err {
            Error::Protocol(p) => p,
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn encode_decode_round_trip() {
        let mut wire = Vec::new();
        encode_frame_to(&mut wire, FrameType::Payload, flags::START_END, 42, b"hello")
            .await
            .unwrap();
        assert_eq!(wire.len(), HEADER_SIZE + 5);

        let frame = decode_frame_from(&mut wire.as_slice(), 1024).await.unwrap();
        assert_eq!(frame.frame_type, FrameType::Payload);
        assert_eq!(frame.flags, flags::START_END);
        assert_eq!(frame.stream_id, 42);
        assert_eq!(&frame.payload[..], b"hello");
        assert!(frame.is_final());
    }

    #[tokio::test]
    async fn header_layout_is_byte_exact() {
        let mut wire = Vec::new();
        encode_frame_to(&mut wire, FrameType::Ping, flags::START_END, 0, &[])
            .await
            .unwrap();
        assert_eq!(
            wire,
            vec![0x53, 0x42, 0x01, 0xFE, 0x00, 0x03, 0, 0, 0, 0, 0, 0, 0, 0, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[tokio::test]
    async fn empty_payload_decodes_empty() {
        let mut wire = Vec::new();
        encode_frame_to(&mut wire, FrameType::Pong, flags::START_END, 0, &[])
            .await
            .unwrap();
        let frame = decode_frame_from(&mut wire.as_slice(), 1024).await.unwrap();
        assert!(frame.payload.is_empty());
    }

    #[tokio::test]
    async fn rejects_bad_magic() {
        let wire = raw_header([0x00, 0x42], 0x01, 0xFE, flags::START_END, 0, 0);
        let err = decode_frame_from(&mut wire.as_slice(), 1024).await.unwrap_err();
        assert_eq!(protocol_err(err), ProtocolError::BadMagic);
    }

    #[tokio::test]
    async fn rejects_bad_version() {
        let wire = raw_header(MAGIC, 0x02, 0xFE, flags::START_END, 0, 0);
        let err = decode_frame_from(&mut wire.as_slice(), 1024).await.unwrap_err();
        assert_eq!(protocol_err(err), ProtocolError::BadVersion { got: 0x02 });
    }

    #[tokio::test]
    async fn rejects_unknown_type() {
        let wire = raw_header(MAGIC, 0x01, 0x99, flags::START_END, 0, 0);
        let err = decode_frame_from(&mut wire.as_slice(), 1024).await.unwrap_err();
        assert_eq!(protocol_err(err), ProtocolError::UnknownType(0x99));
    }

    #[tokio::test]
    async fn rejects_undefined_flag_bits() {
        let wire = raw_header(MAGIC, 0x01, 0x10, 0x0004, 1, 0);
        let err = decode_frame_from(&mut wire.as_slice(), 1024).await.unwrap_err();
        assert_eq!(protocol_err(err), ProtocolError::InvalidFlags(0x0004));
    }

    #[tokio::test]
    async fn rejects_oversized_payload_declaration() {
        let wire = raw_header(MAGIC, 0x01, 0x10, flags::START_END, 1, 2048);
        let err = decode_frame_from(&mut wire.as_slice(), 1024).await.unwrap_err();
        assert_eq!(
            protocol_err(err),
            ProtocolError::FrameTooLarge {
                size: 2048,
                max: 1024
            }
        );
    }

    #[tokio::test]
    async fn rejection_order_magic_beats_version_and_type() {
        // Every header field is invalid; magic must win.
        let wire = raw_header([0xDE, 0xAD], 0x7F, 0x99, 0xFFFF, 0, u32::MAX);
        let err = decode_frame_from(&mut wire.as_slice(), 16).await.unwrap_err();
        assert_eq!(protocol_err(err), ProtocolError::BadMagic);
    }

    #[tokio::test]
    async fn rejection_order_version_beats_type_and_flags() {
        let wire = raw_header(MAGIC, 0x7F, 0x99, 0xFFFF, 0, u32::MAX);
        let err = decode_frame_from(&mut wire.as_slice(), 16).await.unwrap_err();
        assert_eq!(protocol_err(err), ProtocolError::BadVersion { got: 0x7F });
    }

    #[tokio::test]
    async fn rejection_order_type_beats_flags_and_size() {
        let wire = raw_header(MAGIC, 0x01, 0x99, 0xFFFF, 0, u32::MAX);
        let err = decode_frame_from(&mut wire.as_slice(), 16).await.unwrap_err();
        assert_eq!(protocol_err(err), ProtocolError::UnknownType(0x99));
    }

    #[tokio::test]
    async fn rejection_order_flags_beat_size() {
        let wire = raw_header(MAGIC, 0x01, 0x10, 0xFFFF, 1, u32::MAX);
        let err = decode_frame_from(&mut wire.as_slice(), 16).await.unwrap_err();
        assert_eq!(protocol_err(err), ProtocolError::InvalidFlags(0xFFFF));
    }

    #[tokio::test]
    async fn truncated_header_surfaces_io_error() {
        let wire = [0x53u8, 0x42, 0x01];
        let err = decode_frame_from(&mut &wire[..], 1024).await.unwrap_err();
        match err {
            Error::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected IO error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_payload_surfaces_io_error() {
        let mut wire = raw_header(MAGIC, 0x01, 0x10, flags::START_END, 7, 10);
        wire.extend_from_slice(b"short");
        let err = decode_frame_from(&mut wire.as_slice(), 1024).await.unwrap_err();
        match err {
            Error::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected IO error, got {other:?}"),
        }
    }
}

//! Tunnel connection: framed send and receive over one endpoint.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tracing::debug;

use super::frame::{decode_frame_from, encode_frame_to, Frame};
use super::{
    flags, AuthStage, Cancellation, FrameType, Message, PayloadFormat, PayloadKind,
    DEFAULT_MAX_FRAME_PAYLOAD, ENVELOPE_SIZE,
};
use crate::error::{Error, ProtocolError, Result};

/// A tunnel connection over one transport endpoint.
///
/// The connection exclusively owns the endpoint. It is safe for one
/// concurrent sender plus one concurrent receiver: each direction is
/// serialized by its own lock, so a fragmented send is atomic from the
/// peer's view and reassembly is atomic for the receiving task.
pub struct Conn<S> {
    reader: Mutex<ReadHalf<S>>,
    writer: Mutex<WriteHalf<S>>,
    max_frame_payload: usize,
}

impl<S> Conn<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a transport endpoint with the default maximum frame payload.
    pub fn new(stream: S) -> Self {
        Self::with_max_frame_payload(stream, DEFAULT_MAX_FRAME_PAYLOAD)
    }

    /// Wrap a transport endpoint with a custom maximum frame payload.
    pub fn with_max_frame_payload(stream: S, max_frame_payload: usize) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            max_frame_payload,
        }
    }

    /// The largest frame payload this connection will send or accept.
    pub fn max_frame_payload(&self) -> usize {
        self.max_frame_payload
    }

    /// Close the underlying endpoint. The peer observes EOF.
    pub async fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await?;
        Ok(())
    }

    /// Send one logical message, fragmenting as needed.
    ///
    /// Frames of a single message are never interleaved with frames from
    /// another message sent on this connection.
    pub async fn send(&self, msg: &Message, cancel: &Cancellation) -> Result<()> {
        let mut writer = self.writer.lock().await;

        match msg {
            Message::Ping | Message::Pong => {
                let frame_type = msg.frame_type();
                cancel
                    .run(async {
                        encode_frame_to(&mut *writer, frame_type, flags::START_END, 0, &[]).await?;
                        Ok(())
                    })
                    .await
            }

            Message::Auth { stage, payload } => {
                self.send_fragmented(&mut writer, stage.frame_type(), 0, payload, cancel)
                    .await
            }

            Message::Payload {
                stream_id,
                kind,
                format,
                data,
            } => {
                if *stream_id == 0 {
                    return Err(ProtocolError::InvalidStreamId {
                        frame_type: FrameType::Payload.as_u8(),
                        stream_id: 0,
                    }
                    .into());
                }
                if self.max_frame_payload < ENVELOPE_SIZE {
                    return Err(ProtocolError::MaxPayloadTooSmall {
                        max: self.max_frame_payload,
                    }
                    .into());
                }

                // First fragment carries the envelope plus as much data as fits.
                let first_data_cap = self.max_frame_payload - ENVELOPE_SIZE;
                let first_len = data.len().min(first_data_cap);
                let mut first = BytesMut::with_capacity(ENVELOPE_SIZE + first_len);
                first.put_slice(&[kind.as_u8(), format.as_u8(), 0x00, 0x00]);
                first.put_slice(&data[..first_len]);
                let mut remaining = &data[first_len..];

                if remaining.is_empty() {
                    return cancel
                        .run(async {
                            encode_frame_to(
                                &mut *writer,
                                FrameType::Payload,
                                flags::START_END,
                                *stream_id,
                                &first,
                            )
                            .await?;
                            Ok(())
                        })
                        .await;
                }

                cancel
                    .run(async {
                        encode_frame_to(
                            &mut *writer,
                            FrameType::Payload,
                            flags::START,
                            *stream_id,
                            &first,
                        )
                        .await?;
                        Ok(())
                    })
                    .await?;

                while !remaining.is_empty() {
                    let take = remaining.len().min(self.max_frame_payload);
                    let (chunk, rest) = remaining.split_at(take);
                    remaining = rest;

                    let flag_bits = if remaining.is_empty() { flags::END } else { 0 };
                    cancel
                        .run(async {
                            encode_frame_to(
                                &mut *writer,
                                FrameType::Payload,
                                flag_bits,
                                *stream_id,
                                chunk,
                            )
                            .await?;
                            Ok(())
                        })
                        .await?;
                }
                Ok(())
            }
        }
    }

    /// Receive the next fully reassembled logical message.
    ///
    /// Any protocol violation closes the connection best-effort before the
    /// error surfaces: a desynchronized stream cannot be recovered, and
    /// tearing it down lets the remote peer observe EOF.
    pub async fn recv(&self, cancel: &Cancellation) -> Result<Message> {
        let mut reader = self.reader.lock().await;

        let first = self.read_frame(&mut reader, cancel).await?;
        if first.flags & flags::START == 0 {
            return Err(self
                .fail(ProtocolError::Fragmentation("first frame missing START"))
                .await);
        }

        let frame_type = first.frame_type;
        let stream_id = first.stream_id;

        match frame_type {
            FrameType::Ping | FrameType::Pong => {
                if stream_id != 0 || !first.payload.is_empty() || first.flags != flags::START_END {
                    return Err(self.fail(ProtocolError::InvalidControlFrame).await);
                }
                let msg = if frame_type == FrameType::Ping {
                    Message::Ping
                } else {
                    Message::Pong
                };
                return Ok(msg);
            }
            FrameType::Payload => {
                if stream_id == 0 {
                    return Err(self
                        .fail(ProtocolError::InvalidStreamId {
                            frame_type: frame_type.as_u8(),
                            stream_id,
                        })
                        .await);
                }
                return self.recv_payload(&mut reader, first, cancel).await;
            }
            _ => {
                if stream_id != 0 {
                    return Err(self
                        .fail(ProtocolError::InvalidStreamId {
                            frame_type: frame_type.as_u8(),
                            stream_id,
                        })
                        .await);
                }
            }
        }

        // Generic reassembly for auth stages: concatenate fragment payloads.
        let stage = AuthStage::from_frame_type(frame_type).expect("auth frame type");
        let mut done = first.is_final();
        let mut payload = BytesMut::from(&first.payload[..]);
        while !done {
            let next = self
                .read_continuation(&mut reader, frame_type, stream_id, cancel)
                .await?;
            payload.extend_from_slice(&next.payload);
            done = next.is_final();
        }

        Ok(Message::Auth {
            stage,
            payload: payload.freeze(),
        })
    }

    async fn recv_payload(
        &self,
        reader: &mut ReadHalf<S>,
        first: Frame,
        cancel: &Cancellation,
    ) -> Result<Message> {
        if first.payload.len() < ENVELOPE_SIZE {
            return Err(self
                .fail(ProtocolError::Envelope("first fragment shorter than envelope"))
                .await);
        }
        let reserved = u16::from_be_bytes([first.payload[2], first.payload[3]]);
        if reserved != 0 {
            return Err(self
                .fail(ProtocolError::Envelope("reserved bytes must be zero"))
                .await);
        }
        let Some(format) = PayloadFormat::from_u8(first.payload[1]) else {
            return Err(self
                .fail(ProtocolError::Envelope("unsupported payload format"))
                .await);
        };
        let Some(kind) = PayloadKind::from_u8(first.payload[0]) else {
            return Err(self
                .fail(ProtocolError::Envelope("unsupported payload kind"))
                .await);
        };

        let stream_id = first.stream_id;
        let mut done = first.is_final();
        let mut data = BytesMut::from(&first.payload[ENVELOPE_SIZE..]);
        while !done {
            let next = self
                .read_continuation(reader, FrameType::Payload, stream_id, cancel)
                .await?;
            data.extend_from_slice(&next.payload);
            done = next.is_final();
        }

        Ok(Message::Payload {
            stream_id,
            kind,
            format,
            data: data.freeze(),
        })
    }

    async fn send_fragmented(
        &self,
        writer: &mut WriteHalf<S>,
        frame_type: FrameType,
        stream_id: u64,
        payload: &[u8],
        cancel: &Cancellation,
    ) -> Result<()> {
        if payload.len() <= self.max_frame_payload {
            return cancel
                .run(async {
                    encode_frame_to(&mut *writer, frame_type, flags::START_END, stream_id, payload)
                        .await?;
                    Ok(())
                })
                .await;
        }

        let mut remaining = payload;
        let mut first = true;
        while !remaining.is_empty() {
            let take = remaining.len().min(self.max_frame_payload);
            let (chunk, rest) = remaining.split_at(take);
            remaining = rest;

            let mut flag_bits = 0u16;
            if first {
                flag_bits |= flags::START;
                first = false;
            }
            if remaining.is_empty() {
                flag_bits |= flags::END;
            }

            cancel
                .run(async {
                    encode_frame_to(&mut *writer, frame_type, flag_bits, stream_id, chunk).await?;
                    Ok(())
                })
                .await?;
        }
        Ok(())
    }

    /// Read one frame, tearing the connection down on protocol errors.
    async fn read_frame(&self, reader: &mut ReadHalf<S>, cancel: &Cancellation) -> Result<Frame> {
        match cancel
            .run(decode_frame_from(&mut *reader, self.max_frame_payload))
            .await
        {
            Ok(frame) => Ok(frame),
            Err(err) => {
                if let Error::Protocol(protocol_err) = &err {
                    self.shutdown_best_effort(protocol_err).await;
                }
                Err(err)
            }
        }
    }

    /// Read and validate a continuation frame of an in-progress message.
    async fn read_continuation(
        &self,
        reader: &mut ReadHalf<S>,
        frame_type: FrameType,
        stream_id: u64,
        cancel: &Cancellation,
    ) -> Result<Frame> {
        let next = self.read_frame(reader, cancel).await?;
        if next.frame_type != frame_type || next.stream_id != stream_id {
            return Err(self
                .fail(ProtocolError::Fragmentation(
                    "continuation type or stream mismatch",
                ))
                .await);
        }
        if next.flags & flags::START != 0 {
            return Err(self
                .fail(ProtocolError::Fragmentation("unexpected START in continuation"))
                .await);
        }
        Ok(next)
    }

    async fn fail(&self, err: ProtocolError) -> Error {
        self.shutdown_best_effort(&err).await;
        err.into()
    }

    async fn shutdown_best_effort(&self, err: &ProtocolError) {
        debug!(error = %err, "closing connection after protocol error");
        // The receive path holds only the read lock; skip the shutdown
        // rather than wait behind an in-flight send.
        if let Ok(mut writer) = self.writer.try_lock() {
            let _ = writer.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn payload_send_requires_nonzero_stream() {
        let (a, _b) = tokio::io::duplex(64);
        let conn = Conn::new(a);

        let msg = Message::Payload {
            stream_id: 0,
            kind: PayloadKind::Request,
            format: PayloadFormat::OpaqueBytes,
            data: bytes::Bytes::from_static(b"x"),
        };
        let err = conn.send(&msg, &Cancellation::none()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::InvalidStreamId { stream_id: 0, .. })
        ));
    }

    #[tokio::test]
    async fn envelope_must_fit_in_max_payload() {
        let (a, _b) = tokio::io::duplex(64);
        let conn = Conn::with_max_frame_payload(a, ENVELOPE_SIZE - 1);

        let err = conn
            .send(&Message::request(1, &b"data"[..]), &Cancellation::none())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::MaxPayloadTooSmall { .. })
        ));
    }

    #[tokio::test]
    async fn envelope_only_max_payload_still_sends() {
        let (a, b) = tokio::io::duplex(1024);
        let ca = Conn::with_max_frame_payload(a, ENVELOPE_SIZE);
        let cb = Conn::with_max_frame_payload(b, ENVELOPE_SIZE);

        let send = tokio::spawn(async move {
            ca.send(&Message::oneway(5, &b"abcdefgh"[..]), &Cancellation::none())
                .await
        });
        let msg = cb.recv(&Cancellation::none()).await.unwrap();
        send.await.unwrap().unwrap();

        match msg {
            Message::Payload {
                stream_id, data, ..
            } => {
                assert_eq!(stream_id, 5);
                assert_eq!(&data[..], b"abcdefgh");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

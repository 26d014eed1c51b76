use crate::{FrameKind, Message, ProtocolError, Result, MAX_FRAME_SIZE};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Length-prefixed frame codec for broker messages.
///
/// Frame layout: [4-byte length, big-endian] [1-byte frame kind] [JSON payload].
/// The length covers the kind byte plus the payload. JSON is used because task
/// args and results are arbitrary JSON documents.
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        // Length prefix plus frame kind.
        if src.len() < 5 {
            return Ok(None);
        }

        let mut length_bytes = [0u8; 4];
        length_bytes.copy_from_slice(&src[0..4]);
        let length = u32::from_be_bytes(length_bytes) as usize;

        // The length covers the kind byte, so zero is malformed.
        if length == 0 {
            return Err(ProtocolError::Protocol("zero-length frame".to_string()));
        }

        if length > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge(length));
        }

        if src.len() < 4 + length {
            src.reserve(4 + length - src.len());
            return Ok(None);
        }

        src.advance(4);
        let kind_byte = src.get_u8();
        let kind =
            FrameKind::from_u8(kind_byte).ok_or(ProtocolError::UnknownFrameKind(kind_byte))?;

        let payload = src.split_to(length - 1);

        let message = match kind {
            FrameKind::Enqueue => Message::Enqueue(serde_json::from_slice(&payload)?),
            FrameKind::Dequeue => Message::Dequeue(serde_json::from_slice(&payload)?),
            FrameKind::Report => Message::Report(serde_json::from_slice(&payload)?),
            FrameKind::Heartbeat => Message::Heartbeat(serde_json::from_slice(&payload)?),
            FrameKind::Accepted => Message::Accepted(serde_json::from_slice(&payload)?),
            FrameKind::Rejected => Message::Rejected(serde_json::from_slice(&payload)?),
            FrameKind::Status => Message::Status(serde_json::from_slice(&payload)?),
        };

        Ok(Some(message))
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let payload = match &item {
            Message::Enqueue(req) => serde_json::to_vec(req)?,
            Message::Dequeue(req) => serde_json::to_vec(req)?,
            Message::Report(req) => serde_json::to_vec(req)?,
            Message::Heartbeat(req) => serde_json::to_vec(req)?,
            Message::Accepted(resp) => serde_json::to_vec(resp)?,
            Message::Rejected(resp) => serde_json::to_vec(resp)?,
            Message::Status(req) => serde_json::to_vec(req)?,
        };

        let total_length = 1 + payload.len();
        if total_length > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge(total_length));
        }

        dst.reserve(4 + total_length);
        dst.put_u32(total_length as u32);
        dst.put_u8(item.frame_kind().as_u8());
        dst.put_slice(&payload);

        Ok(())
    }
}

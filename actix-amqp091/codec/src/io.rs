use actix_codec::{Decoder, Encoder};
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};

use super::errors::AmqpCodecError;
use super::framing::{AmqpFrame, FRAME_OVERHEAD, HEADER_LEN};
use crate::buffer::Buffer;
use crate::codec::{Decode, Encode};

const SIZE_LOW_WM: usize = 4096;
const SIZE_HIGH_WM: usize = 32768;

const PROTOCOL_HEADER_PREFIX: &[u8] = b"AMQP";

/// Frame codec for a 0-9-1 connection.
///
/// Decoding is resumable: a partial frame stays in the read buffer until
/// the rest of it arrives.
#[derive(Debug, Default)]
pub struct AmqpCodec {
    max_size: usize,
}

impl AmqpCodec {
    pub fn new() -> AmqpCodec {
        AmqpCodec { max_size: 0 }
    }

    /// Set max inbound frame size, including frame header and end marker.
    ///
    /// If max size is set to `0`, size is unlimited.
    /// By default max size is set to `0`
    pub fn max_size(&mut self, size: usize) {
        self.max_size = size;
    }

    fn reserve(dst: &mut BytesMut, size: usize) {
        let need = std::cmp::max(SIZE_LOW_WM, size);
        if dst.remaining_mut() < need {
            dst.reserve(std::cmp::max(need, SIZE_HIGH_WM));
        }
    }
}

impl Decoder for AmqpCodec {
    type Item = AmqpFrame;
    type Error = AmqpCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() >= PROTOCOL_HEADER_PREFIX.len() && src.starts_with(PROTOCOL_HEADER_PREFIX) {
            // broker rejected our protocol header and answered with its own
            if src.len() < 8 {
                return Ok(None);
            }
            let mut version = [0u8; 4];
            version.copy_from_slice(&src[4..8]);
            return Err(AmqpCodecError::ProtocolVersionMismatch(version));
        }

        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let size = BigEndian::read_u32(&src[3..HEADER_LEN]) as usize + FRAME_OVERHEAD;
        if self.max_size != 0 && size > self.max_size {
            return Err(AmqpCodecError::MaxSizeExceeded);
        }
        if src.len() < size {
            // extend receiving buffer to fit the whole frame
            if src.capacity() < size {
                src.reserve(std::cmp::max(SIZE_LOW_WM, size - src.len()));
            }
            return Ok(None);
        }

        let mut buf = Buffer::from(src.split_to(size));
        Ok(Some(AmqpFrame::decode(&mut buf)?))
    }
}

impl Encoder<AmqpFrame> for AmqpCodec {
    type Error = AmqpCodecError;

    fn encode(&mut self, item: AmqpFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let size = item.encoded_size();
        let mut buf = Buffer::with_capacity(size);
        item.encode(&mut buf)?;

        AmqpCodec::reserve(dst, size);
        dst.put_slice(buf.as_ref());
        Ok(())
    }
}

/// Pre-encoded frames are written as is.
impl Encoder<Bytes> for AmqpCodec {
    type Error = AmqpCodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        AmqpCodec::reserve(dst, item.len());
        dst.put_slice(item.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AmqpParseError;
    use crate::framing::Frame;
    use crate::protocol::{Method, QueueDeclareOk};

    fn frame() -> AmqpFrame {
        AmqpFrame::new(
            7,
            Method::from(QueueDeclareOk {
                queue: "events".into(),
                message_count: 5,
                consumer_count: 1,
            }),
        )
    }

    #[test]
    fn test_resumable_decode() {
        let mut codec = AmqpCodec::new();
        let mut wire = BytesMut::new();
        codec.encode(frame(), &mut wire).unwrap();
        codec.encode(AmqpFrame::heartbeat(), &mut wire).unwrap();

        let mut src = BytesMut::new();
        let mut decoded = Vec::new();
        for b in wire.iter() {
            src.put_u8(*b);
            while let Some(frame) = codec.decode(&mut src).unwrap() {
                decoded.push(frame);
            }
        }
        assert_eq!(decoded, vec![frame(), AmqpFrame::heartbeat()]);
        assert!(src.is_empty());
    }

    #[test]
    fn test_several_frames_in_one_chunk() {
        let mut codec = AmqpCodec::new();
        let mut src = BytesMut::new();
        codec.encode(frame(), &mut src).unwrap();
        codec
            .encode(AmqpFrame::new(7, Frame::Body(Bytes::from_static(b"abc"))), &mut src)
            .unwrap();
        src.put_slice(&b"\x08\x00"[..]);

        assert_eq!(codec.decode(&mut src).unwrap(), Some(frame()));
        assert!(codec.decode(&mut src).unwrap().is_some());
        assert_eq!(codec.decode(&mut src).unwrap(), None);
        assert_eq!(&src[..], b"\x08\x00");
    }

    #[test]
    fn test_bytes_passthrough() {
        let mut codec = AmqpCodec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(Bytes::from_static(b"AMQP\x00\x00\x09\x01"), &mut dst)
            .unwrap();
        assert_eq!(&dst[..], b"AMQP\x00\x00\x09\x01");
    }

    #[test]
    fn test_max_size() {
        let mut codec = AmqpCodec::new();
        codec.max_size(16);
        let mut src = BytesMut::new();
        codec.encode(frame(), &mut src).unwrap();
        match codec.decode(&mut src) {
            Err(AmqpCodecError::MaxSizeExceeded) => (),
            res => panic!("unexpected result: {:?}", res),
        }
    }

    #[test]
    fn test_protocol_header_from_broker() {
        let mut codec = AmqpCodec::new();
        let mut src = BytesMut::from(&b"AMQP\x00\x00"[..]);
        assert!(codec.decode(&mut src).unwrap().is_none());
        src.put_slice(&b"\x09\x01"[..]);
        match codec.decode(&mut src) {
            Err(AmqpCodecError::ProtocolVersionMismatch(v)) => assert_eq!(v, [0, 0, 9, 1]),
            res => panic!("unexpected result: {:?}", res),
        }
    }

    #[test]
    fn test_bad_frame_end() {
        let mut codec = AmqpCodec::new();
        let mut src = BytesMut::from(&b"\x08\x00\x00\x00\x00\x00\x00\x00"[..]);
        match codec.decode(&mut src) {
            Err(AmqpCodecError::ParseError(AmqpParseError::InvalidFrameEnd(0))) => (),
            res => panic!("unexpected result: {:?}", res),
        }
    }
}

use bytes::Bytes;

use crate::buffer::Buffer;
use crate::codec::{Decode, Encode};
use crate::errors::{AmqpCodecError, AmqpParseError};
use crate::protocol::{self, ContentHeader, Method};

/// Length in bytes of the fixed frame header: type, channel and payload size
pub const HEADER_LEN: usize = 7;

/// Header plus the trailing end marker
pub const FRAME_OVERHEAD: usize = HEADER_LEN + 1;

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Method(Method),
    Header(ContentHeader),
    Body(Bytes),
    Heartbeat,
}

impl Frame {
    pub fn frame_type(&self) -> u8 {
        match self {
            Frame::Method(_) => protocol::FRAME_METHOD,
            Frame::Header(_) => protocol::FRAME_HEADER,
            Frame::Body(_) => protocol::FRAME_BODY,
            Frame::Heartbeat => protocol::FRAME_HEARTBEAT,
        }
    }

    fn payload_size(&self) -> usize {
        match self {
            Frame::Method(method) => method.encoded_size(),
            Frame::Header(header) => header.encoded_size(),
            Frame::Body(body) => body.len(),
            Frame::Heartbeat => 0,
        }
    }
}

impl From<Method> for Frame {
    fn from(method: Method) -> Frame {
        Frame::Method(method)
    }
}

impl From<ContentHeader> for Frame {
    fn from(header: ContentHeader) -> Frame {
        Frame::Header(header)
    }
}

/// Represents an AMQP Frame
#[derive(Clone, Debug, PartialEq)]
pub struct AmqpFrame {
    channel_id: u16,
    frame: Frame,
}

impl AmqpFrame {
    pub fn new<F: Into<Frame>>(channel_id: u16, frame: F) -> AmqpFrame {
        AmqpFrame {
            channel_id,
            frame: frame.into(),
        }
    }

    pub fn heartbeat() -> AmqpFrame {
        AmqpFrame::new(0, Frame::Heartbeat)
    }

    #[inline]
    pub fn channel_id(&self) -> u16 {
        self.channel_id
    }

    #[inline]
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Method carried by this frame, if it is a method frame.
    pub fn method(&self) -> Option<&Method> {
        match self.frame {
            Frame::Method(ref method) => Some(method),
            _ => None,
        }
    }

    #[inline]
    pub fn into_parts(self) -> (u16, Frame) {
        (self.channel_id, self.frame)
    }
}

impl Encode for AmqpFrame {
    fn encoded_size(&self) -> usize {
        FRAME_OVERHEAD + self.frame.payload_size()
    }

    fn encode(&self, buf: &mut Buffer) -> Result<(), AmqpCodecError> {
        let mut payload = Buffer::with_capacity(self.frame.payload_size());
        match self.frame {
            Frame::Method(ref method) => method.encode(&mut payload)?,
            Frame::Header(ref header) => header.encode(&mut payload)?,
            Frame::Body(ref body) => {
                payload.append(body.as_ref());
            }
            Frame::Heartbeat => (),
        }

        buf.append_u8(self.frame.frame_type())
            .append_u16(self.channel_id)
            .append_u32(payload.len() as u32)
            .append(payload.as_ref())
            .append_u8(protocol::FRAME_END);
        Ok(())
    }
}

impl Decode for AmqpFrame {
    /// Decode one frame from the front of `buf`.
    ///
    /// Nothing is consumed unless the whole frame, including its end marker,
    /// is available.
    fn decode(buf: &mut Buffer) -> Result<Self, AmqpParseError> {
        let frame_type = buf.read_u8(0)?;
        let channel_id = buf.read_u16(1)?;
        let size = buf.read_u32(3)? as usize;
        let end = buf.read_u8(HEADER_LEN + size)?;

        buf.discard(HEADER_LEN)?;
        let mut payload = buf.consume_slice(size)?;
        buf.discard(1)?;

        let frame = match frame_type {
            protocol::FRAME_METHOD => {
                Frame::Method(Method::decode(&mut payload).map_err(|e| mismatch(e, size))?)
            }
            protocol::FRAME_HEADER => {
                Frame::Header(ContentHeader::decode(&mut payload).map_err(|e| mismatch(e, size))?)
            }
            protocol::FRAME_BODY => Frame::Body(payload.consume(size)?),
            protocol::FRAME_HEARTBEAT => Frame::Heartbeat,
            _ => return Err(AmqpParseError::InvalidFrameType(frame_type)),
        };

        if !payload.is_empty() {
            return Err(AmqpParseError::PayloadSizeMismatch {
                declared: size,
                consumed: size - payload.len(),
            });
        }
        if end != protocol::FRAME_END {
            return Err(AmqpParseError::InvalidFrameEnd(end));
        }
        Ok(AmqpFrame { channel_id, frame })
    }
}

/// Running out of payload bytes means the declared size was too small.
fn mismatch(err: AmqpParseError, size: usize) -> AmqpParseError {
    match err {
        AmqpParseError::BufferUnderflow => AmqpParseError::PayloadSizeMismatch {
            declared: size,
            consumed: size + 1,
        },
        err => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BasicProperties, ChannelOpen, ChannelOpenOk, QueueDeclareOk};

    fn encode(frame: &AmqpFrame) -> Buffer {
        let mut buf = Buffer::new();
        frame.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), frame.encoded_size());
        buf
    }

    #[test]
    fn test_heartbeat() {
        let buf = encode(&AmqpFrame::heartbeat());
        assert_eq!(buf.as_ref(), b"\x08\x00\x00\x00\x00\x00\x00\xce");
    }

    #[test]
    fn test_method_frame() {
        let frame = AmqpFrame::new(1, Method::from(ChannelOpen::default()));
        let mut buf = encode(&frame);
        assert_eq!(
            buf.as_ref(),
            b"\x01\x00\x01\x00\x00\x00\x05\x00\x14\x00\x0a\x00\xce"
        );
        assert_eq!(AmqpFrame::decode(&mut buf).unwrap(), frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_header_and_body_frames() {
        let header = AmqpFrame::new(
            3,
            ContentHeader::new(
                2,
                BasicProperties {
                    content_type: Some("text/plain".into()),
                    ..Default::default()
                },
            ),
        );
        let body = AmqpFrame::new(3, Frame::Body(Bytes::from_static(b"hi")));

        let mut buf = encode(&header);
        buf.append(encode(&body).as_ref());
        assert_eq!(AmqpFrame::decode(&mut buf).unwrap(), header);
        assert_eq!(AmqpFrame::decode(&mut buf).unwrap(), body);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_is_not_consumed() {
        let frame = AmqpFrame::new(
            2,
            Method::from(QueueDeclareOk {
                queue: "q".into(),
                message_count: 1,
                consumer_count: 0,
            }),
        );
        let full = encode(&frame);
        for n in 0..full.len() {
            let mut buf = Buffer::from(&full.as_ref()[..n]);
            assert_eq!(
                AmqpFrame::decode(&mut buf),
                Err(AmqpParseError::BufferUnderflow)
            );
            assert_eq!(buf.len(), n);
        }
    }

    #[test]
    fn test_invalid_end_marker() {
        let mut buf = Buffer::from(&b"\x08\x00\x00\x00\x00\x00\x00\xcd"[..]);
        assert_eq!(
            AmqpFrame::decode(&mut buf),
            Err(AmqpParseError::InvalidFrameEnd(0xcd))
        );
    }

    #[test]
    fn test_invalid_frame_type() {
        let mut buf = Buffer::from(&b"\x05\x00\x00\x00\x00\x00\x00\xce"[..]);
        assert_eq!(
            AmqpFrame::decode(&mut buf),
            Err(AmqpParseError::InvalidFrameType(5))
        );
    }

    #[test]
    fn test_payload_size_mismatch() {
        // channel.open-ok with one trailing byte inside the declared payload
        let mut buf =
            Buffer::from(&b"\x01\x00\x01\x00\x00\x00\x09\x00\x14\x00\x0b\x00\x00\x00\x00\xff\xce"[..]);
        assert_eq!(
            AmqpFrame::decode(&mut buf),
            Err(AmqpParseError::PayloadSizeMismatch {
                declared: 9,
                consumed: 8
            })
        );

        // declared payload too short for the method arguments
        let mut buf = Buffer::from(&b"\x01\x00\x01\x00\x00\x00\x06\x00\x14\x00\x0b\x00\x00\xce"[..]);
        match AmqpFrame::decode(&mut buf) {
            Err(AmqpParseError::PayloadSizeMismatch { declared: 6, .. }) => (),
            res => panic!("unexpected result: {:?}", res),
        }

        let ok = AmqpFrame::new(1, Method::from(ChannelOpenOk::default()));
        assert_eq!(encode(&ok).len(), 8 + 8);
    }

    #[test]
    fn test_unknown_method() {
        let mut buf = Buffer::from(&b"\x01\x00\x00\x00\x00\x00\x04\x00\x0a\x00\x63\xce"[..]);
        assert_eq!(
            AmqpFrame::decode(&mut buf),
            Err(AmqpParseError::InvalidMethod(10, 99))
        );
    }
}

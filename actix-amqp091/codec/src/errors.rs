#[derive(Debug, Display, From, Clone, PartialEq)]
pub enum AmqpParseError {
    #[from(ignore)]
    #[display(fmt = "Not enough bytes in buffer")]
    BufferUnderflow,
    #[from(ignore)]
    #[display(fmt = "Unknown class id: {}", _0)]
    InvalidClass(u16),
    #[from(ignore)]
    #[display(fmt = "Unknown method id: {}.{}", _0, _1)]
    InvalidMethod(u16, u16),
    #[from(ignore)]
    #[display(fmt = "Unexpected frame type: {}", _0)]
    InvalidFrameType(u8),
    #[from(ignore)]
    #[display(fmt = "Unexpected frame end marker: {:#x}", _0)]
    InvalidFrameEnd(u8),
    #[from(ignore)]
    #[display(
        fmt = "Frame payload size mismatch, declared {} consumed {}",
        declared,
        consumed
    )]
    PayloadSizeMismatch { declared: usize, consumed: usize },
    #[from(ignore)]
    #[display(fmt = "Unknown field value type: '{}'", "*_0 as char")]
    InvalidFieldType(u8),
    #[from(ignore)]
    #[display(fmt = "Timestamp out of range: {}", _0)]
    InvalidTimestamp(u64),
    Utf8Error(std::str::Utf8Error),
}

#[derive(Debug, Display, From)]
pub enum AmqpCodecError {
    ParseError(AmqpParseError),
    #[from(ignore)]
    #[display(fmt = "max inbound frame size exceeded")]
    MaxSizeExceeded,
    #[from(ignore)]
    #[display(fmt = "Peer does not support protocol version, offered {:?}", _0)]
    ProtocolVersionMismatch([u8; 4]),
    #[from(ignore)]
    #[display(fmt = "Short string is longer than 255 bytes: {}", _0)]
    ShortStringTooLong(usize),
    #[from(ignore)]
    #[display(fmt = "Timestamp before unix epoch: {}", _0)]
    NegativeTimestamp(i64),
    #[display(fmt = "Io error: {:?}", _0)]
    Io(Option<std::io::Error>),
}

impl Clone for AmqpCodecError {
    fn clone(&self) -> AmqpCodecError {
        match self {
            AmqpCodecError::ParseError(err) => AmqpCodecError::ParseError(err.clone()),
            AmqpCodecError::MaxSizeExceeded => AmqpCodecError::MaxSizeExceeded,
            AmqpCodecError::ProtocolVersionMismatch(v) => {
                AmqpCodecError::ProtocolVersionMismatch(*v)
            }
            AmqpCodecError::ShortStringTooLong(len) => AmqpCodecError::ShortStringTooLong(*len),
            AmqpCodecError::NegativeTimestamp(ts) => AmqpCodecError::NegativeTimestamp(*ts),
            AmqpCodecError::Io(_) => AmqpCodecError::Io(None),
        }
    }
}

impl From<std::io::Error> for AmqpCodecError {
    fn from(err: std::io::Error) -> AmqpCodecError {
        AmqpCodecError::Io(Some(err))
    }
}

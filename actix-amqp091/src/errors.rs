use std::fmt;

use amqp091_codec::protocol::{ChannelClose, ConnectionClose, Method};
use amqp091_codec::{AmqpCodecError, AmqpParseError};
use bytestring::ByteString;

/// Reply code and text of a `connection.close` or `channel.close`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub reply_code: u16,
    pub reply_text: ByteString,
    pub class_id: u16,
    pub method_id: u16,
    /// Channel the close was sent on, `0` for the connection.
    pub channel_id: u16,
}

impl CloseReason {
    pub fn new<T: Into<ByteString>>(reply_code: u16, reply_text: T) -> Self {
        CloseReason {
            reply_code,
            reply_text: reply_text.into(),
            class_id: 0,
            method_id: 0,
            channel_id: 0,
        }
    }

    /// Close reason blaming a specific method.
    pub(crate) fn for_method(mut self, method: &Method) -> Self {
        self.class_id = method.class_id();
        self.method_id = method.method_id();
        self
    }

    pub(crate) fn on_channel(mut self, channel_id: u16) -> Self {
        self.channel_id = channel_id;
        self
    }

    pub(crate) fn to_connection_close(&self) -> ConnectionClose {
        ConnectionClose {
            reply_code: self.reply_code,
            reply_text: self.reply_text.clone(),
            class_id: self.class_id,
            method_id: self.method_id,
        }
    }
}

impl<'a> From<&'a ConnectionClose> for CloseReason {
    fn from(close: &'a ConnectionClose) -> Self {
        CloseReason {
            reply_code: close.reply_code,
            reply_text: close.reply_text.clone(),
            class_id: close.class_id,
            method_id: close.method_id,
            channel_id: 0,
        }
    }
}

impl<'a> From<&'a ChannelClose> for CloseReason {
    fn from(close: &'a ChannelClose) -> Self {
        CloseReason {
            reply_code: close.reply_code,
            reply_text: close.reply_text.clone(),
            class_id: close.class_id,
            method_id: close.method_id,
            channel_id: 0,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.reply_code, self.reply_text)?;
        if self.class_id != 0 {
            write!(f, " (method {}.{})", self.class_id, self.method_id)?;
        }
        if self.channel_id != 0 {
            write!(f, " on channel #{}", self.channel_id)?;
        }
        Ok(())
    }
}

#[derive(Debug, Display, Clone)]
pub enum AmqpError {
    #[display(fmt = "Codec error: {}", _0)]
    Codec(AmqpCodecError),
    /// Client closed the connection because the peer broke the protocol
    #[display(fmt = "Protocol violation: {}", _0)]
    ProtocolViolation(CloseReason),
    /// Operation is not allowed in the current channel state or mode
    #[display(fmt = "Channel exception: {}", _0)]
    ChannelException(ByteString),
    /// Broker closed the channel or the connection
    #[display(fmt = "Closed by broker: {}", _0)]
    RemoteClose(CloseReason),
    #[display(fmt = "SASL mechanism is not offered by the broker")]
    UnsupportedMechanism,
    #[display(fmt = "Heartbeat interval must be less than 32768 seconds")]
    InvalidHeartbeat,
    TooManyChannels,
    Disconnected,
    Timeout,
}

impl AmqpError {
    pub(crate) fn channel_exception<T: Into<ByteString>>(text: T) -> Self {
        AmqpError::ChannelException(text.into())
    }

    /// Reply that does not belong to the request it completed.
    pub(crate) fn unexpected(method: &Method) -> Self {
        AmqpError::ProtocolViolation(
            CloseReason::new(
                amqp091_codec::protocol::reply_code::UNEXPECTED_FRAME,
                format!("Unexpected method {}", method.name()),
            )
            .for_method(method),
        )
    }
}

impl From<AmqpCodecError> for AmqpError {
    fn from(err: AmqpCodecError) -> Self {
        AmqpError::Codec(err)
    }
}

impl From<AmqpParseError> for AmqpError {
    fn from(err: AmqpParseError) -> Self {
        AmqpError::Codec(AmqpCodecError::ParseError(err))
    }
}

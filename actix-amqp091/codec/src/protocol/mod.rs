use bytes::Bytes;
use bytestring::ByteString;
use chrono::{DateTime, Utc};

use crate::buffer::Buffer;
use crate::codec::{Decode, Encode};
use crate::errors::{AmqpCodecError, AmqpParseError};
use crate::types::FieldTable;

pub const FRAME_METHOD: u8 = 1;
pub const FRAME_HEADER: u8 = 2;
pub const FRAME_BODY: u8 = 3;
pub const FRAME_HEARTBEAT: u8 = 8;
pub const FRAME_END: u8 = 0xCE;

pub const CLASS_CONNECTION: u16 = 10;
pub const CLASS_CHANNEL: u16 = 20;
pub const CLASS_ACCESS: u16 = 30;
pub const CLASS_EXCHANGE: u16 = 40;
pub const CLASS_QUEUE: u16 = 50;
pub const CLASS_BASIC: u16 = 60;
pub const CLASS_CONFIRM: u16 = 85;
pub const CLASS_TX: u16 = 90;

/// Reply codes used in `connection.close` and `channel.close`.
pub mod reply_code {
    pub const REPLY_SUCCESS: u16 = 200;
    pub const CONTENT_TOO_LARGE: u16 = 311;
    pub const NO_ROUTE: u16 = 312;
    pub const NO_CONSUMERS: u16 = 313;
    pub const CONNECTION_FORCED: u16 = 320;
    pub const INVALID_PATH: u16 = 402;
    pub const ACCESS_REFUSED: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const RESOURCE_LOCKED: u16 = 405;
    pub const PRECONDITION_FAILED: u16 = 406;
    pub const FRAME_ERROR: u16 = 501;
    pub const SYNTAX_ERROR: u16 = 502;
    pub const COMMAND_INVALID: u16 = 503;
    pub const CHANNEL_ERROR: u16 = 504;
    pub const UNEXPECTED_FRAME: u16 = 505;
    pub const RESOURCE_ERROR: u16 = 506;
    pub const NOT_ALLOWED: u16 = 530;
    pub const NOT_IMPLEMENTED: u16 = 540;
    pub const INTERNAL_ERROR: u16 = 541;
}

/// Eight byte protocol header sent by the client before any frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolHeader {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
}

const PROTOCOL_HEADER_PREFIX: &[u8] = b"AMQP\x00";

impl Default for ProtocolHeader {
    fn default() -> Self {
        ProtocolHeader {
            major: 0,
            minor: 9,
            revision: 1,
        }
    }
}

impl Encode for ProtocolHeader {
    fn encoded_size(&self) -> usize {
        8
    }

    fn encode(&self, buf: &mut Buffer) -> Result<(), AmqpCodecError> {
        buf.append(PROTOCOL_HEADER_PREFIX)
            .append_u8(self.major)
            .append_u8(self.minor)
            .append_u8(self.revision);
        Ok(())
    }
}

/// Wire type of a method argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    Octet,
    Short,
    Long,
    LongLong,
    Bit,
    ShortStr,
    LongStr,
    Table,
    Timestamp,
}

#[derive(Debug, Clone, Copy)]
pub struct ArgumentInfo {
    pub name: &'static str,
    pub kind: ArgumentKind,
}

/// Structural description of one method.
#[derive(Debug, Clone, Copy)]
pub struct MethodInfo {
    pub class_id: u16,
    pub method_id: u16,
    pub name: &'static str,
    pub arguments: &'static [ArgumentInfo],
    /// Methods that complete this one when it is sent synchronously.
    pub replies: &'static [(u16, u16)],
    /// Method frame is followed by a content header and body frames.
    pub content: bool,
}

impl MethodInfo {
    pub fn is_synchronous(&self) -> bool {
        !self.replies.is_empty()
    }
}

/// Writes method arguments, packing consecutive bits into octets.
pub struct ArgumentWriter<'a> {
    buf: &'a mut Buffer,
    bits: u8,
    nbits: u8,
}

impl<'a> ArgumentWriter<'a> {
    pub fn new(buf: &'a mut Buffer) -> Self {
        ArgumentWriter {
            buf,
            bits: 0,
            nbits: 0,
        }
    }

    fn flush_bits(&mut self) {
        if self.nbits > 0 {
            self.buf.append_u8(self.bits);
            self.bits = 0;
            self.nbits = 0;
        }
    }

    pub fn write_bit(&mut self, value: bool) {
        if value {
            self.bits |= 1 << self.nbits;
        }
        self.nbits += 1;
        if self.nbits == 8 {
            self.flush_bits();
        }
    }

    pub fn write<T: Encode>(&mut self, value: &T) -> Result<(), AmqpCodecError> {
        self.flush_bits();
        value.encode(self.buf)
    }

    pub fn finish(mut self) {
        self.flush_bits();
    }
}

/// Reads method arguments, unpacking consecutive bits from octets.
pub struct ArgumentReader<'a> {
    buf: &'a mut Buffer,
    bits: u8,
    pos: u8,
}

impl<'a> ArgumentReader<'a> {
    pub fn new(buf: &'a mut Buffer) -> Self {
        ArgumentReader {
            buf,
            bits: 0,
            pos: 8,
        }
    }

    pub fn read_bit(&mut self) -> Result<bool, AmqpParseError> {
        if self.pos == 8 {
            self.bits = self.buf.consume_u8()?;
            self.pos = 0;
        }
        let value = self.bits & (1 << self.pos) != 0;
        self.pos += 1;
        Ok(value)
    }

    pub fn read<T: Decode>(&mut self) -> Result<T, AmqpParseError> {
        self.pos = 8;
        T::decode(self.buf)
    }
}

/// Type usable as a method argument.
pub trait Argument: Sized {
    const KIND: ArgumentKind;

    fn read(reader: &mut ArgumentReader<'_>) -> Result<Self, AmqpParseError>;

    fn write(&self, writer: &mut ArgumentWriter<'_>) -> Result<(), AmqpCodecError>;

    /// Encoded size, `bits` tracks the position inside a packed bit octet.
    fn size(&self, bits: &mut u8) -> usize;
}

impl Argument for bool {
    const KIND: ArgumentKind = ArgumentKind::Bit;

    fn read(reader: &mut ArgumentReader<'_>) -> Result<Self, AmqpParseError> {
        reader.read_bit()
    }

    fn write(&self, writer: &mut ArgumentWriter<'_>) -> Result<(), AmqpCodecError> {
        writer.write_bit(*self);
        Ok(())
    }

    fn size(&self, bits: &mut u8) -> usize {
        if *bits == 0 {
            *bits = 1;
            1
        } else {
            *bits = (*bits + 1) % 8;
            0
        }
    }
}

macro_rules! impl_argument {
    ($ty:ty, $kind:ident) => {
        impl Argument for $ty {
            const KIND: ArgumentKind = ArgumentKind::$kind;

            fn read(reader: &mut ArgumentReader<'_>) -> Result<Self, AmqpParseError> {
                reader.read()
            }

            fn write(&self, writer: &mut ArgumentWriter<'_>) -> Result<(), AmqpCodecError> {
                writer.write(self)
            }

            fn size(&self, bits: &mut u8) -> usize {
                *bits = 0;
                self.encoded_size()
            }
        }
    };
}

impl_argument!(u8, Octet);
impl_argument!(u16, Short);
impl_argument!(u32, Long);
impl_argument!(u64, LongLong);
impl_argument!(ByteString, ShortStr);
impl_argument!(Bytes, LongStr);
impl_argument!(FieldTable, Table);
impl_argument!(DateTime<Utc>, Timestamp);

macro_rules! define_methods {
    (@default) => {
        Default::default()
    };
    (@default $default:expr) => {
        $default
    };
    ($(
        $(#[$doc:meta])*
        $name:ident($class_id:literal, $method_id:literal, $label:literal)
            content: $content:literal,
            replies: [$(($reply_class:literal, $reply_method:literal)),*]
        {
            $($field:ident: $ty:ty $(= $default:expr)?),* $(,)?
        }
    )*) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, PartialEq)]
            pub struct $name {
                $(pub $field: $ty,)*
            }

            impl $name {
                pub const INFO: MethodInfo = MethodInfo {
                    class_id: $class_id,
                    method_id: $method_id,
                    name: $label,
                    arguments: &[$(ArgumentInfo {
                        name: stringify!($field),
                        kind: <$ty as Argument>::KIND,
                    }),*],
                    replies: &[$(($reply_class, $reply_method)),*],
                    content: $content,
                };
            }

            impl Default for $name {
                fn default() -> Self {
                    $name {
                        $($field: define_methods!(@default $($default)?),)*
                    }
                }
            }

            impl From<$name> for Method {
                fn from(method: $name) -> Method {
                    Method::$name(method)
                }
            }

            impl std::convert::TryFrom<Method> for $name {
                type Error = Method;

                fn try_from(method: Method) -> Result<Self, Method> {
                    match method {
                        Method::$name(method) => Ok(method),
                        method => Err(method),
                    }
                }
            }
        )*

        /// Every method known to the registry.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Method {
            $($name($name),)*
        }

        /// Registry table, in class then method order.
        pub static METHODS: &[MethodInfo] = &[$($name::INFO),*];

        impl Method {
            pub fn info(&self) -> &'static MethodInfo {
                match self {
                    $(Method::$name(_) => &$name::INFO,)*
                }
            }

            #[allow(unused_variables, unused_mut)]
            pub(super) fn arguments_size(&self) -> usize {
                let mut bits = 0u8;
                match self {
                    $(Method::$name(method) => 0 $(+ method.$field.size(&mut bits))*,)*
                }
            }

            #[allow(unused_variables)]
            pub(super) fn write_arguments(&self, writer: &mut ArgumentWriter<'_>) -> Result<(), AmqpCodecError> {
                match self {
                    $(Method::$name(method) => {
                        $(method.$field.write(writer)?;)*
                    })*
                }
                Ok(())
            }

            #[allow(unused_variables)]
            pub(super) fn read_arguments(
                class_id: u16,
                method_id: u16,
                reader: &mut ArgumentReader<'_>,
            ) -> Result<Method, AmqpParseError> {
                match (class_id, method_id) {
                    $(($class_id, $method_id) => Ok(Method::$name($name {
                        $($field: Argument::read(reader)?,)*
                    })),)*
                    _ => {
                        if METHODS.iter().any(|m| m.class_id == class_id) {
                            Err(AmqpParseError::InvalidMethod(class_id, method_id))
                        } else {
                            Err(AmqpParseError::InvalidClass(class_id))
                        }
                    }
                }
            }
        }
    };
}

mod definitions;
mod properties;

pub use self::definitions::*;
pub use self::properties::{BasicProperties, ContentHeader};

/// Look up a method description by its wire ids.
pub fn method_info(class_id: u16, method_id: u16) -> Result<&'static MethodInfo, AmqpParseError> {
    METHODS
        .iter()
        .find(|m| m.class_id == class_id && m.method_id == method_id)
        .ok_or_else(|| {
            if METHODS.iter().any(|m| m.class_id == class_id) {
                AmqpParseError::InvalidMethod(class_id, method_id)
            } else {
                AmqpParseError::InvalidClass(class_id)
            }
        })
}

impl Method {
    #[inline]
    pub fn class_id(&self) -> u16 {
        self.info().class_id
    }

    #[inline]
    pub fn method_id(&self) -> u16 {
        self.info().method_id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.info().name
    }

    /// Method is followed by a content header on the same channel.
    #[inline]
    pub fn has_content(&self) -> bool {
        self.info().content
    }

    /// Does `other` complete this method as its synchronous reply.
    pub fn is_reply(&self, other: &Method) -> bool {
        let id = (other.class_id(), other.method_id());
        self.info().replies.iter().any(|r| *r == id)
    }
}

impl Encode for Method {
    fn encoded_size(&self) -> usize {
        4 + self.arguments_size()
    }

    fn encode(&self, buf: &mut Buffer) -> Result<(), AmqpCodecError> {
        buf.append_u16(self.class_id()).append_u16(self.method_id());
        let mut writer = ArgumentWriter::new(buf);
        self.write_arguments(&mut writer)?;
        writer.finish();
        Ok(())
    }
}

impl Decode for Method {
    fn decode(buf: &mut Buffer) -> Result<Self, AmqpParseError> {
        let class_id = buf.consume_u16()?;
        let method_id = buf.consume_u16()?;
        let mut reader = ArgumentReader::new(buf);
        Method::read_arguments(class_id, method_id, &mut reader)
    }
}

use bytes::Bytes;
use bytestring::ByteString;
use chrono::{DateTime, Utc};
use fxhash::FxHashMap;

mod value;

pub use self::value::FieldValue;

/// `shortstr` method argument, at most 255 bytes on the wire.
pub type ShortString = ByteString;

/// `longstr` method argument, opaque bytes.
pub type LongString = Bytes;

/// `timestamp` method argument.
pub type Timestamp = DateTime<Utc>;

/// AMQP field table, keys are short strings.
pub type FieldTable = FxHashMap<ByteString, FieldValue>;

/// AMQP field array.
pub type FieldArray = Vec<FieldValue>;

/// Fixed point number, `value / 10^scale`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
pub struct Decimal {
    pub scale: u8,
    pub value: u32,
}

impl Decimal {
    pub fn new(scale: u8, value: u32) -> Self {
        Decimal { scale, value }
    }
}

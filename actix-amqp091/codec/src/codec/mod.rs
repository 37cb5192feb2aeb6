use std::marker::Sized;

use crate::buffer::Buffer;
use crate::errors::{AmqpCodecError, AmqpParseError};

mod decode;
mod encode;

pub trait Encode {
    fn encoded_size(&self) -> usize;

    fn encode(&self, buf: &mut Buffer) -> Result<(), AmqpCodecError>;
}

pub trait Decode
where
    Self: Sized,
{
    fn decode(buf: &mut Buffer) -> Result<Self, AmqpParseError>;
}

pub const FIELD_BOOLEAN: u8 = b't';
pub const FIELD_SHORT_SHORT_INT: u8 = b'b';
pub const FIELD_SHORT_SHORT_UINT: u8 = b'B';
pub const FIELD_SHORT_INT: u8 = b'U';
pub const FIELD_SHORT_UINT: u8 = b'u';
pub const FIELD_LONG_INT: u8 = b'I';
pub const FIELD_LONG_UINT: u8 = b'i';
pub const FIELD_LONG_LONG_INT: u8 = b'L';
pub const FIELD_LONG_LONG_UINT: u8 = b'l';
pub const FIELD_FLOAT: u8 = b'f';
pub const FIELD_DOUBLE: u8 = b'd';
pub const FIELD_DECIMAL: u8 = b'D';
pub const FIELD_SHORT_STRING: u8 = b's';
pub const FIELD_LONG_STRING: u8 = b'S';
pub const FIELD_BYTE_ARRAY: u8 = b'x';
pub const FIELD_ARRAY: u8 = b'A';
pub const FIELD_TIMESTAMP: u8 = b'T';
pub const FIELD_TABLE: u8 = b'F';
pub const FIELD_VOID: u8 = b'V';

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use bytestring::ByteString;
    use chrono::{TimeZone, Utc};

    use crate::buffer::Buffer;
    use crate::codec::{Decode, Encode};
    use crate::errors::{AmqpCodecError, AmqpParseError};
    use crate::types::{Decimal, FieldArray, FieldTable, FieldValue};

    fn encode<T: Encode>(value: &T) -> Buffer {
        let mut buf = Buffer::new();
        value.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), value.encoded_size());
        buf
    }

    #[test]
    fn test_table_wire_format() {
        let mut table = FieldTable::default();
        table.insert("a".into(), FieldValue::LongLongInt(1));

        let buf = encode(&table);
        assert_eq!(
            buf.as_ref(),
            b"\x00\x00\x00\x0b\x01aL\x00\x00\x00\x00\x00\x00\x00\x01"
        );
    }

    #[test]
    fn test_table_decode_literal() {
        let mut buf = Buffer::from(
            &b"\x00\x00\x00\x15\x03keyS\x00\x00\x00\x05value\x04flagt\x01"[..],
        );
        let table = FieldTable::decode(&mut buf).unwrap();
        assert!(buf.is_empty());
        assert_eq!(table.len(), 2);
        assert_eq!(table["key"], "value");
        assert_eq!(table["flag"], FieldValue::Boolean(true));
    }

    #[test]
    fn test_nested_table() {
        let mut inner = FieldTable::default();
        inner.insert("i8".into(), FieldValue::ShortShortInt(-3));
        inner.insert("u8".into(), FieldValue::ShortShortUint(250));
        inner.insert("i16".into(), FieldValue::ShortInt(-300));
        inner.insert("u16".into(), FieldValue::ShortUint(60000));
        inner.insert("i32".into(), FieldValue::LongInt(-70000));
        inner.insert("u32".into(), FieldValue::LongUint(4_000_000_000));
        inner.insert("i64".into(), FieldValue::LongLongInt(-2));
        inner.insert("u64".into(), FieldValue::LongLongUint(u64::MAX));

        let array: FieldArray = vec![
            FieldValue::from(1.5f32),
            FieldValue::from(1.5f64),
            FieldValue::Decimal(Decimal::new(2, 31415)),
            FieldValue::Void,
            FieldValue::ByteArray(Bytes::from_static(b"\x00\x01")),
        ];

        let mut table = FieldTable::default();
        table.insert("table".into(), FieldValue::Table(inner));
        table.insert("array".into(), FieldValue::Array(array));
        table.insert("short".into(), FieldValue::ShortString("s".into()));
        table.insert("long".into(), FieldValue::from("long string"));
        table.insert(
            "time".into(),
            FieldValue::Timestamp(Utc.with_ymd_and_hms(2011, 7, 26, 18, 21, 3).unwrap()),
        );
        table.insert("empty".into(), FieldValue::Table(FieldTable::default()));

        let mut buf = encode(&table);
        let decoded = FieldTable::decode(&mut buf).unwrap();
        assert!(buf.is_empty());
        assert_eq!(decoded, table);
    }

    #[test]
    fn test_timestamp_seconds() {
        let value = FieldValue::Timestamp(Utc.timestamp_opt(1_311_704_463, 0).unwrap());
        let buf = encode(&value);
        assert_eq!(buf.as_ref(), b"T\x00\x00\x00\x00\x4e\x2f\x05\x8f");

        let mut buf = buf;
        assert_eq!(FieldValue::decode(&mut buf).unwrap(), value);
    }

    #[test]
    fn test_timestamp_before_epoch() {
        let value = FieldValue::Timestamp(Utc.timestamp_opt(-1, 0).unwrap());
        let mut buf = Buffer::new();
        match value.encode(&mut buf) {
            Err(AmqpCodecError::NegativeTimestamp(-1)) => (),
            res => panic!("unexpected result: {:?}", res),
        }

        // unsigned on the wire, out of range for chrono
        let mut buf = Buffer::from(&b"T\xff\xff\xff\xff\xff\xff\xff\xff"[..]);
        assert_eq!(
            FieldValue::decode(&mut buf),
            Err(AmqpParseError::InvalidTimestamp(u64::MAX))
        );
    }

    #[test]
    fn test_invalid_field_type() {
        let mut buf = Buffer::from(&b"\x00\x00\x00\x03\x01a?"[..]);
        assert_eq!(
            FieldTable::decode(&mut buf),
            Err(AmqpParseError::InvalidFieldType(b'?'))
        );
    }

    #[test]
    fn test_truncated_table() {
        let mut buf = Buffer::from(&b"\x00\x00\x00\x10\x01at\x01"[..]);
        assert_eq!(
            FieldTable::decode(&mut buf),
            Err(AmqpParseError::BufferUnderflow)
        );
    }

    #[test]
    fn test_short_string_too_long() {
        let long = ByteString::from("x".repeat(256));
        let mut buf = Buffer::new();
        match long.encode(&mut buf) {
            Err(AmqpCodecError::ShortStringTooLong(256)) => (),
            res => panic!("unexpected result: {:?}", res),
        }
    }
}

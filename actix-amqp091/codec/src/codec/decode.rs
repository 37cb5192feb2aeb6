use std::convert::TryFrom;

use bytes::Bytes;
use bytestring::ByteString;
use chrono::{DateTime, TimeZone, Utc};
use ordered_float::OrderedFloat;

use crate::buffer::Buffer;
use crate::codec::{self, Decode};
use crate::errors::AmqpParseError;
use crate::types::{Decimal, FieldArray, FieldTable, FieldValue};

impl Decode for u8 {
    fn decode(buf: &mut Buffer) -> Result<Self, AmqpParseError> {
        buf.consume_u8()
    }
}

impl Decode for u16 {
    fn decode(buf: &mut Buffer) -> Result<Self, AmqpParseError> {
        buf.consume_u16()
    }
}

impl Decode for u32 {
    fn decode(buf: &mut Buffer) -> Result<Self, AmqpParseError> {
        buf.consume_u32()
    }
}

impl Decode for u64 {
    fn decode(buf: &mut Buffer) -> Result<Self, AmqpParseError> {
        buf.consume_u64()
    }
}

impl Decode for ByteString {
    fn decode(buf: &mut Buffer) -> Result<Self, AmqpParseError> {
        let len = buf.read_u8(0)? as usize;
        let bytes = buf.read(len, 1)?;
        let s = ByteString::try_from(bytes)?;
        buf.discard(len + 1)?;
        Ok(s)
    }
}

impl Decode for Bytes {
    fn decode(buf: &mut Buffer) -> Result<Self, AmqpParseError> {
        let len = buf.read_u32(0)? as usize;
        buf.read(len, 4)?;
        buf.discard(4)?;
        buf.consume(len)
    }
}

impl Decode for DateTime<Utc> {
    fn decode(buf: &mut Buffer) -> Result<Self, AmqpParseError> {
        let secs = buf.read_u64(0)?;
        if secs > i64::MAX as u64 {
            return Err(AmqpParseError::InvalidTimestamp(secs));
        }
        match Utc.timestamp_opt(secs as i64, 0).single() {
            Some(ts) => {
                buf.discard(8)?;
                Ok(ts)
            }
            None => Err(AmqpParseError::InvalidTimestamp(secs)),
        }
    }
}

impl Decode for Decimal {
    fn decode(buf: &mut Buffer) -> Result<Self, AmqpParseError> {
        let value = buf.read_u32(1)?;
        let scale = buf.consume_u8()?;
        buf.discard(4)?;
        Ok(Decimal { scale, value })
    }
}

impl Decode for FieldTable {
    fn decode(buf: &mut Buffer) -> Result<Self, AmqpParseError> {
        let len = buf.read_u32(0)? as usize;
        buf.read(len, 4)?;
        buf.discard(4)?;
        let mut data = buf.consume_slice(len)?;

        let mut table = FieldTable::default();
        while !data.is_empty() {
            let key = ByteString::decode(&mut data)?;
            let value = FieldValue::decode(&mut data)?;
            table.insert(key, value);
        }
        Ok(table)
    }
}

impl Decode for FieldArray {
    fn decode(buf: &mut Buffer) -> Result<Self, AmqpParseError> {
        let len = buf.read_u32(0)? as usize;
        buf.read(len, 4)?;
        buf.discard(4)?;
        let mut data = buf.consume_slice(len)?;

        let mut array = Vec::new();
        while !data.is_empty() {
            array.push(FieldValue::decode(&mut data)?);
        }
        Ok(array)
    }
}

impl Decode for FieldValue {
    fn decode(buf: &mut Buffer) -> Result<Self, AmqpParseError> {
        let tag = buf.consume_u8()?;
        let value = match tag {
            codec::FIELD_BOOLEAN => FieldValue::Boolean(buf.consume_u8()? != 0),
            codec::FIELD_SHORT_SHORT_INT => FieldValue::ShortShortInt(buf.consume_i8()?),
            codec::FIELD_SHORT_SHORT_UINT => FieldValue::ShortShortUint(buf.consume_u8()?),
            codec::FIELD_SHORT_INT => FieldValue::ShortInt(buf.consume_i16()?),
            codec::FIELD_SHORT_UINT => FieldValue::ShortUint(buf.consume_u16()?),
            codec::FIELD_LONG_INT => FieldValue::LongInt(buf.consume_i32()?),
            codec::FIELD_LONG_UINT => FieldValue::LongUint(buf.consume_u32()?),
            codec::FIELD_LONG_LONG_INT => FieldValue::LongLongInt(buf.consume_i64()?),
            codec::FIELD_LONG_LONG_UINT => FieldValue::LongLongUint(buf.consume_u64()?),
            codec::FIELD_FLOAT => FieldValue::Float(OrderedFloat(buf.consume_f32()?)),
            codec::FIELD_DOUBLE => FieldValue::Double(OrderedFloat(buf.consume_f64()?)),
            codec::FIELD_DECIMAL => FieldValue::Decimal(Decimal::decode(buf)?),
            codec::FIELD_SHORT_STRING => FieldValue::ShortString(ByteString::decode(buf)?),
            codec::FIELD_LONG_STRING => FieldValue::LongString(Bytes::decode(buf)?),
            codec::FIELD_BYTE_ARRAY => FieldValue::ByteArray(Bytes::decode(buf)?),
            codec::FIELD_ARRAY => FieldValue::Array(FieldArray::decode(buf)?),
            codec::FIELD_TIMESTAMP => FieldValue::Timestamp(DateTime::<Utc>::decode(buf)?),
            codec::FIELD_TABLE => FieldValue::Table(FieldTable::decode(buf)?),
            codec::FIELD_VOID => FieldValue::Void,
            _ => return Err(AmqpParseError::InvalidFieldType(tag)),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_string() {
        let mut buf = Buffer::from(&b"\x05hello!"[..]);
        assert_eq!(ByteString::decode(&mut buf).unwrap(), "hello");
        assert_eq!(buf.as_ref(), b"!");
    }

    #[test]
    fn test_short_string_underflow_keeps_buffer() {
        let mut buf = Buffer::from(&b"\x05hel"[..]);
        assert_eq!(
            ByteString::decode(&mut buf),
            Err(AmqpParseError::BufferUnderflow)
        );
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_short_string_invalid_utf8() {
        let mut buf = Buffer::from(&b"\x02\xff\xfe"[..]);
        match ByteString::decode(&mut buf) {
            Err(AmqpParseError::Utf8Error(_)) => (),
            res => panic!("unexpected result: {:?}", res),
        }
    }

    #[test]
    fn test_long_string() {
        let mut buf = Buffer::from(&b"\x00\x00\x00\x03\xff\x00\x01"[..]);
        assert_eq!(Bytes::decode(&mut buf).unwrap(), &b"\xff\x00\x01"[..]);
        assert!(buf.is_empty());

        let mut buf = Buffer::from(&b"\x00\x00\x00\x03\xff"[..]);
        assert_eq!(Bytes::decode(&mut buf), Err(AmqpParseError::BufferUnderflow));
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_field_values() {
        let cases: Vec<(&[u8], FieldValue)> = vec![
            (&b"t\x01"[..], FieldValue::Boolean(true)),
            (&b"t\x00"[..], FieldValue::Boolean(false)),
            (&b"b\xff"[..], FieldValue::ShortShortInt(-1)),
            (&b"B\xff"[..], FieldValue::ShortShortUint(255)),
            (&b"U\xa9\x78"[..], FieldValue::ShortInt(0xA978u16 as i16)),
            (&b"u\xa9\x78"[..], FieldValue::ShortUint(0xA978)),
            (&b"I\xff\xff\xff\xfe"[..], FieldValue::LongInt(-2)),
            (&b"i\xa9\x78\x23\x61"[..], FieldValue::LongUint(0xA978_2361)),
            (&b"L\xff\xff\xff\xff\xff\xff\xff\xfe"[..], FieldValue::LongLongInt(-2)),
            (
                &b"l\x19\x78\x23\x61\x34\x73\x85\x25"[..],
                FieldValue::LongLongUint(0x1978_2361_3473_8525),
            ),
            (&b"f\x3f\xc0\x00\x00"[..], FieldValue::from(1.5f32)),
            (&b"d\x3f\xf8\x00\x00\x00\x00\x00\x00"[..], FieldValue::from(1.5f64)),
            (&b"D\x02\x00\x00\x01\x00"[..], FieldValue::Decimal(Decimal::new(2, 256))),
            (&b"s\x02hi"[..], FieldValue::ShortString("hi".into())),
            (&b"S\x00\x00\x00\x02hi"[..], FieldValue::from("hi")),
            (&b"A\x00\x00\x00\x02t\x01"[..], FieldValue::Array(vec![true.into()])),
            (&b"F\x00\x00\x00\x00"[..], FieldValue::Table(FieldTable::default())),
            (&b"V"[..], FieldValue::Void),
        ];

        for (data, expected) in cases {
            let mut buf = Buffer::from(data);
            assert_eq!(FieldValue::decode(&mut buf).unwrap(), expected);
            assert!(buf.is_empty(), "trailing bytes for {:?}", expected);
        }
    }
}

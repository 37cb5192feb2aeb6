use bytes::Bytes;
use bytestring::ByteString;
use chrono::{DateTime, Utc};

use crate::buffer::Buffer;
use crate::codec::{self, Encode};
use crate::errors::AmqpCodecError;
use crate::types::{Decimal, FieldArray, FieldTable, FieldValue};

impl Encode for u8 {
    fn encoded_size(&self) -> usize {
        1
    }

    fn encode(&self, buf: &mut Buffer) -> Result<(), AmqpCodecError> {
        buf.append_u8(*self);
        Ok(())
    }
}

impl Encode for u16 {
    fn encoded_size(&self) -> usize {
        2
    }

    fn encode(&self, buf: &mut Buffer) -> Result<(), AmqpCodecError> {
        buf.append_u16(*self);
        Ok(())
    }
}

impl Encode for u32 {
    fn encoded_size(&self) -> usize {
        4
    }

    fn encode(&self, buf: &mut Buffer) -> Result<(), AmqpCodecError> {
        buf.append_u32(*self);
        Ok(())
    }
}

impl Encode for u64 {
    fn encoded_size(&self) -> usize {
        8
    }

    fn encode(&self, buf: &mut Buffer) -> Result<(), AmqpCodecError> {
        buf.append_u64(*self);
        Ok(())
    }
}

impl Encode for ByteString {
    fn encoded_size(&self) -> usize {
        1 + self.len()
    }

    fn encode(&self, buf: &mut Buffer) -> Result<(), AmqpCodecError> {
        if self.len() > u8::MAX as usize {
            return Err(AmqpCodecError::ShortStringTooLong(self.len()));
        }
        buf.append_u8(self.len() as u8).append(self.as_bytes());
        Ok(())
    }
}

impl Encode for Bytes {
    fn encoded_size(&self) -> usize {
        4 + self.len()
    }

    fn encode(&self, buf: &mut Buffer) -> Result<(), AmqpCodecError> {
        buf.append_u32(self.len() as u32).append(self.as_ref());
        Ok(())
    }
}

impl Encode for DateTime<Utc> {
    fn encoded_size(&self) -> usize {
        8
    }

    fn encode(&self, buf: &mut Buffer) -> Result<(), AmqpCodecError> {
        let secs = self.timestamp();
        if secs < 0 {
            return Err(AmqpCodecError::NegativeTimestamp(secs));
        }
        buf.append_u64(secs as u64);
        Ok(())
    }
}

impl Encode for Decimal {
    fn encoded_size(&self) -> usize {
        5
    }

    fn encode(&self, buf: &mut Buffer) -> Result<(), AmqpCodecError> {
        buf.append_u8(self.scale).append_u32(self.value);
        Ok(())
    }
}

fn table_content_size(table: &FieldTable) -> usize {
    table
        .iter()
        .map(|(k, v)| k.encoded_size() + v.encoded_size())
        .sum()
}

impl Encode for FieldTable {
    fn encoded_size(&self) -> usize {
        4 + table_content_size(self)
    }

    fn encode(&self, buf: &mut Buffer) -> Result<(), AmqpCodecError> {
        buf.append_u32(table_content_size(self) as u32);
        for (key, value) in self.iter() {
            key.encode(buf)?;
            value.encode(buf)?;
        }
        Ok(())
    }
}

impl Encode for FieldArray {
    fn encoded_size(&self) -> usize {
        4 + self.iter().map(|v| v.encoded_size()).sum::<usize>()
    }

    fn encode(&self, buf: &mut Buffer) -> Result<(), AmqpCodecError> {
        buf.append_u32((self.encoded_size() - 4) as u32);
        for value in self.iter() {
            value.encode(buf)?;
        }
        Ok(())
    }
}

impl Encode for FieldValue {
    fn encoded_size(&self) -> usize {
        1 + match self {
            FieldValue::Boolean(_) => 1,
            FieldValue::ShortShortInt(_) | FieldValue::ShortShortUint(_) => 1,
            FieldValue::ShortInt(_) | FieldValue::ShortUint(_) => 2,
            FieldValue::LongInt(_) | FieldValue::LongUint(_) => 4,
            FieldValue::LongLongInt(_) | FieldValue::LongLongUint(_) => 8,
            FieldValue::Float(_) => 4,
            FieldValue::Double(_) => 8,
            FieldValue::Decimal(v) => v.encoded_size(),
            FieldValue::ShortString(s) => s.encoded_size(),
            FieldValue::LongString(s) | FieldValue::ByteArray(s) => s.encoded_size(),
            FieldValue::Array(v) => v.encoded_size(),
            FieldValue::Timestamp(v) => v.encoded_size(),
            FieldValue::Table(v) => v.encoded_size(),
            FieldValue::Void => 0,
        }
    }

    fn encode(&self, buf: &mut Buffer) -> Result<(), AmqpCodecError> {
        match self {
            FieldValue::Boolean(v) => {
                buf.append_u8(codec::FIELD_BOOLEAN).append_u8(*v as u8);
            }
            FieldValue::ShortShortInt(v) => {
                buf.append_u8(codec::FIELD_SHORT_SHORT_INT).append_i8(*v);
            }
            FieldValue::ShortShortUint(v) => {
                buf.append_u8(codec::FIELD_SHORT_SHORT_UINT).append_u8(*v);
            }
            FieldValue::ShortInt(v) => {
                buf.append_u8(codec::FIELD_SHORT_INT).append_i16(*v);
            }
            FieldValue::ShortUint(v) => {
                buf.append_u8(codec::FIELD_SHORT_UINT).append_u16(*v);
            }
            FieldValue::LongInt(v) => {
                buf.append_u8(codec::FIELD_LONG_INT).append_i32(*v);
            }
            FieldValue::LongUint(v) => {
                buf.append_u8(codec::FIELD_LONG_UINT).append_u32(*v);
            }
            FieldValue::LongLongInt(v) => {
                buf.append_u8(codec::FIELD_LONG_LONG_INT).append_i64(*v);
            }
            FieldValue::LongLongUint(v) => {
                buf.append_u8(codec::FIELD_LONG_LONG_UINT).append_u64(*v);
            }
            FieldValue::Float(v) => {
                buf.append_u8(codec::FIELD_FLOAT).append_f32(v.into_inner());
            }
            FieldValue::Double(v) => {
                buf.append_u8(codec::FIELD_DOUBLE).append_f64(v.into_inner());
            }
            FieldValue::Decimal(v) => {
                buf.append_u8(codec::FIELD_DECIMAL);
                v.encode(buf)?;
            }
            FieldValue::ShortString(v) => {
                buf.append_u8(codec::FIELD_SHORT_STRING);
                v.encode(buf)?;
            }
            FieldValue::LongString(v) => {
                buf.append_u8(codec::FIELD_LONG_STRING);
                v.encode(buf)?;
            }
            FieldValue::ByteArray(v) => {
                buf.append_u8(codec::FIELD_BYTE_ARRAY);
                v.encode(buf)?;
            }
            FieldValue::Array(v) => {
                buf.append_u8(codec::FIELD_ARRAY);
                v.encode(buf)?;
            }
            FieldValue::Timestamp(v) => {
                buf.append_u8(codec::FIELD_TIMESTAMP);
                v.encode(buf)?;
            }
            FieldValue::Table(v) => {
                buf.append_u8(codec::FIELD_TABLE);
                v.encode(buf)?;
            }
            FieldValue::Void => {
                buf.append_u8(codec::FIELD_VOID);
            }
        }
        Ok(())
    }
}

use bytes::Bytes;
use bytestring::ByteString;
use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;

use crate::types::{Decimal, FieldArray, FieldTable};

/// Represents a single field table value.
///
/// Tags follow the AMQP 0-9-1 field type list, plus the `x` byte array
/// extension.
#[derive(Debug, Eq, PartialEq, Clone)]
pub enum FieldValue {
    /// 't'
    Boolean(bool),
    /// 'b'
    ShortShortInt(i8),
    /// 'B'
    ShortShortUint(u8),
    /// 'U'
    ShortInt(i16),
    /// 'u'
    ShortUint(u16),
    /// 'I'
    LongInt(i32),
    /// 'i'
    LongUint(u32),
    /// 'L'
    LongLongInt(i64),
    /// 'l'
    LongLongUint(u64),
    /// 'f'
    Float(OrderedFloat<f32>),
    /// 'd'
    Double(OrderedFloat<f64>),
    /// 'D'
    Decimal(Decimal),
    /// 's', at most 255 bytes.
    ShortString(ByteString),
    /// 'S'. Long strings are not required to be valid utf-8.
    LongString(Bytes),
    /// 'x'
    ByteArray(Bytes),
    /// 'A'
    Array(FieldArray),
    /// 'T', seconds precision.
    Timestamp(DateTime<Utc>),
    /// 'F'
    Table(FieldTable),
    /// 'V'
    Void,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::ShortString(s) => Some(s.as_ref()),
            FieldValue::LongString(s) => std::str::from_utf8(s).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer value that fits into `i64`.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            FieldValue::ShortShortInt(v) => Some(*v as i64),
            FieldValue::ShortShortUint(v) => Some(*v as i64),
            FieldValue::ShortInt(v) => Some(*v as i64),
            FieldValue::ShortUint(v) => Some(*v as i64),
            FieldValue::LongInt(v) => Some(*v as i64),
            FieldValue::LongUint(v) => Some(*v as i64),
            FieldValue::LongLongInt(v) => Some(*v),
            FieldValue::LongLongUint(v) if *v <= i64::MAX as u64 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&FieldTable> {
        match self {
            FieldValue::Table(t) => Some(t),
            _ => None,
        }
    }
}

impl PartialEq<str> for FieldValue {
    fn eq(&self, other: &str) -> bool {
        self.as_str().map(|s| s == other).unwrap_or(false)
    }
}

impl<'a> PartialEq<&'a str> for FieldValue {
    fn eq(&self, other: &&'a str) -> bool {
        self == *other
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::LongString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::LongString(Bytes::from(s))
    }
}

impl From<ByteString> for FieldValue {
    fn from(s: ByteString) -> Self {
        FieldValue::ShortString(s)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<i8> for FieldValue {
    fn from(v: i8) -> Self {
        FieldValue::ShortShortInt(v)
    }
}

impl From<u8> for FieldValue {
    fn from(v: u8) -> Self {
        FieldValue::ShortShortUint(v)
    }
}

impl From<i16> for FieldValue {
    fn from(v: i16) -> Self {
        FieldValue::ShortInt(v)
    }
}

impl From<u16> for FieldValue {
    fn from(v: u16) -> Self {
        FieldValue::ShortUint(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::LongInt(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::LongUint(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::LongLongInt(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::LongLongUint(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(OrderedFloat(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(OrderedFloat(v))
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

impl From<FieldTable> for FieldValue {
    fn from(v: FieldTable) -> Self {
        FieldValue::Table(v)
    }
}

impl From<FieldArray> for FieldValue {
    fn from(v: FieldArray) -> Self {
        FieldValue::Array(v)
    }
}

impl From<Decimal> for FieldValue {
    fn from(v: Decimal) -> Self {
        FieldValue::Decimal(v)
    }
}

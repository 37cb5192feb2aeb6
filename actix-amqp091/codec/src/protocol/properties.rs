use std::convert::TryFrom;

use bytestring::ByteString;

use super::CLASS_BASIC;
use crate::buffer::Buffer;
use crate::codec::{Decode, Encode};
use crate::errors::{AmqpCodecError, AmqpParseError};
use crate::types::{FieldTable, FieldValue, ShortString, Timestamp};

const FLAG_CONTENT_TYPE: u16 = 0x8000;
const FLAG_CONTENT_ENCODING: u16 = 0x4000;
const FLAG_HEADERS: u16 = 0x2000;
const FLAG_DELIVERY_MODE: u16 = 0x1000;
const FLAG_PRIORITY: u16 = 0x0800;
const FLAG_CORRELATION_ID: u16 = 0x0400;
const FLAG_REPLY_TO: u16 = 0x0200;
const FLAG_EXPIRATION: u16 = 0x0100;
const FLAG_MESSAGE_ID: u16 = 0x0080;
const FLAG_TIMESTAMP: u16 = 0x0040;
const FLAG_TYPE: u16 = 0x0020;
const FLAG_USER_ID: u16 = 0x0010;
const FLAG_APP_ID: u16 = 0x0008;
const FLAG_CLUSTER_ID: u16 = 0x0004;

pub const CONTENT_TYPE: &str = "content-type";
pub const CONTENT_ENCODING: &str = "content-encoding";
pub const DELIVERY_MODE: &str = "delivery-mode";
pub const PRIORITY: &str = "priority";
pub const CORRELATION_ID: &str = "correlation-id";
pub const REPLY_TO: &str = "reply-to";
pub const EXPIRATION: &str = "expiration";
pub const MESSAGE_ID: &str = "message-id";
pub const TIMESTAMP: &str = "timestamp";
pub const TYPE: &str = "type";
pub const USER_ID: &str = "user-id";
pub const APP_ID: &str = "app-id";
pub const CLUSTER_ID: &str = "cluster-id";

/// Basic class content properties.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BasicProperties {
    pub content_type: Option<ShortString>,
    pub content_encoding: Option<ShortString>,
    pub headers: Option<FieldTable>,
    pub delivery_mode: Option<u8>,
    pub priority: Option<u8>,
    pub correlation_id: Option<ShortString>,
    pub reply_to: Option<ShortString>,
    pub expiration: Option<ShortString>,
    pub message_id: Option<ShortString>,
    pub timestamp: Option<Timestamp>,
    pub kind: Option<ShortString>,
    pub user_id: Option<ShortString>,
    pub app_id: Option<ShortString>,
    pub cluster_id: Option<ShortString>,
}

fn take_str(table: &mut FieldTable, key: &str) -> Option<ShortString> {
    match table.get(key).and_then(|v| v.as_str()) {
        Some(s) => {
            let s = ByteString::from(s);
            table.remove(key);
            Some(s)
        }
        None => None,
    }
}

fn take_octet(table: &mut FieldTable, key: &str) -> Option<u8> {
    match table
        .get(key)
        .and_then(|v| v.as_long())
        .and_then(|v| u8::try_from(v).ok())
    {
        Some(v) => {
            table.remove(key);
            Some(v)
        }
        None => None,
    }
}

fn take_timestamp(table: &mut FieldTable, key: &str) -> Option<Timestamp> {
    match table.get(key).and_then(|v| v.as_timestamp()) {
        Some(v) => {
            table.remove(key);
            Some(v)
        }
        None => None,
    }
}

impl BasicProperties {
    /// Split a flat header map into named properties and the `headers` table.
    ///
    /// Keys that name a property and hold a value of a compatible type are
    /// moved into that property, everything else stays in `headers`.
    pub fn from_table(mut table: FieldTable) -> Self {
        let mut props = BasicProperties {
            content_type: take_str(&mut table, CONTENT_TYPE),
            content_encoding: take_str(&mut table, CONTENT_ENCODING),
            headers: None,
            delivery_mode: take_octet(&mut table, DELIVERY_MODE),
            priority: take_octet(&mut table, PRIORITY),
            correlation_id: take_str(&mut table, CORRELATION_ID),
            reply_to: take_str(&mut table, REPLY_TO),
            expiration: take_str(&mut table, EXPIRATION),
            message_id: take_str(&mut table, MESSAGE_ID),
            timestamp: take_timestamp(&mut table, TIMESTAMP),
            kind: take_str(&mut table, TYPE),
            user_id: take_str(&mut table, USER_ID),
            app_id: take_str(&mut table, APP_ID),
            cluster_id: take_str(&mut table, CLUSTER_ID),
        };
        if !table.is_empty() {
            props.headers = Some(table);
        }
        props
    }

    /// Flat header map: `headers` entries plus every present property.
    pub fn to_table(&self) -> FieldTable {
        let mut table = self.headers.clone().unwrap_or_default();

        let strings = [
            (CONTENT_TYPE, &self.content_type),
            (CONTENT_ENCODING, &self.content_encoding),
            (CORRELATION_ID, &self.correlation_id),
            (REPLY_TO, &self.reply_to),
            (EXPIRATION, &self.expiration),
            (MESSAGE_ID, &self.message_id),
            (TYPE, &self.kind),
            (USER_ID, &self.user_id),
            (APP_ID, &self.app_id),
            (CLUSTER_ID, &self.cluster_id),
        ];
        for (key, value) in strings.iter() {
            if let Some(value) = value {
                table.insert(
                    ByteString::from_static(*key),
                    FieldValue::ShortString(value.clone()),
                );
            }
        }
        if let Some(v) = self.delivery_mode {
            table.insert(ByteString::from_static(DELIVERY_MODE), v.into());
        }
        if let Some(v) = self.priority {
            table.insert(ByteString::from_static(PRIORITY), v.into());
        }
        if let Some(v) = self.timestamp {
            table.insert(ByteString::from_static(TIMESTAMP), v.into());
        }
        table
    }

    pub fn flags(&self) -> u16 {
        let mut flags = 0;
        let mut set = |present: bool, flag: u16| {
            if present {
                flags |= flag
            }
        };
        set(self.content_type.is_some(), FLAG_CONTENT_TYPE);
        set(self.content_encoding.is_some(), FLAG_CONTENT_ENCODING);
        set(self.headers.is_some(), FLAG_HEADERS);
        set(self.delivery_mode.is_some(), FLAG_DELIVERY_MODE);
        set(self.priority.is_some(), FLAG_PRIORITY);
        set(self.correlation_id.is_some(), FLAG_CORRELATION_ID);
        set(self.reply_to.is_some(), FLAG_REPLY_TO);
        set(self.expiration.is_some(), FLAG_EXPIRATION);
        set(self.message_id.is_some(), FLAG_MESSAGE_ID);
        set(self.timestamp.is_some(), FLAG_TIMESTAMP);
        set(self.kind.is_some(), FLAG_TYPE);
        set(self.user_id.is_some(), FLAG_USER_ID);
        set(self.app_id.is_some(), FLAG_APP_ID);
        set(self.cluster_id.is_some(), FLAG_CLUSTER_ID);
        flags
    }
}

fn opt_size<T: Encode>(value: &Option<T>) -> usize {
    value.as_ref().map(|v| v.encoded_size()).unwrap_or(0)
}

fn opt_encode<T: Encode>(value: &Option<T>, buf: &mut Buffer) -> Result<(), AmqpCodecError> {
    match value {
        Some(v) => v.encode(buf),
        None => Ok(()),
    }
}

fn opt_decode<T: Decode>(flags: u16, flag: u16, buf: &mut Buffer) -> Result<Option<T>, AmqpParseError> {
    if flags & flag != 0 {
        T::decode(buf).map(Some)
    } else {
        Ok(None)
    }
}

impl Encode for BasicProperties {
    fn encoded_size(&self) -> usize {
        2 + opt_size(&self.content_type)
            + opt_size(&self.content_encoding)
            + opt_size(&self.headers)
            + opt_size(&self.delivery_mode)
            + opt_size(&self.priority)
            + opt_size(&self.correlation_id)
            + opt_size(&self.reply_to)
            + opt_size(&self.expiration)
            + opt_size(&self.message_id)
            + opt_size(&self.timestamp)
            + opt_size(&self.kind)
            + opt_size(&self.user_id)
            + opt_size(&self.app_id)
            + opt_size(&self.cluster_id)
    }

    fn encode(&self, buf: &mut Buffer) -> Result<(), AmqpCodecError> {
        buf.append_u16(self.flags());
        opt_encode(&self.content_type, buf)?;
        opt_encode(&self.content_encoding, buf)?;
        opt_encode(&self.headers, buf)?;
        opt_encode(&self.delivery_mode, buf)?;
        opt_encode(&self.priority, buf)?;
        opt_encode(&self.correlation_id, buf)?;
        opt_encode(&self.reply_to, buf)?;
        opt_encode(&self.expiration, buf)?;
        opt_encode(&self.message_id, buf)?;
        opt_encode(&self.timestamp, buf)?;
        opt_encode(&self.kind, buf)?;
        opt_encode(&self.user_id, buf)?;
        opt_encode(&self.app_id, buf)?;
        opt_encode(&self.cluster_id, buf)
    }
}

impl Decode for BasicProperties {
    fn decode(buf: &mut Buffer) -> Result<Self, AmqpParseError> {
        let flags = buf.consume_u16()?;
        Ok(BasicProperties {
            content_type: opt_decode(flags, FLAG_CONTENT_TYPE, buf)?,
            content_encoding: opt_decode(flags, FLAG_CONTENT_ENCODING, buf)?,
            headers: opt_decode(flags, FLAG_HEADERS, buf)?,
            delivery_mode: opt_decode(flags, FLAG_DELIVERY_MODE, buf)?,
            priority: opt_decode(flags, FLAG_PRIORITY, buf)?,
            correlation_id: opt_decode(flags, FLAG_CORRELATION_ID, buf)?,
            reply_to: opt_decode(flags, FLAG_REPLY_TO, buf)?,
            expiration: opt_decode(flags, FLAG_EXPIRATION, buf)?,
            message_id: opt_decode(flags, FLAG_MESSAGE_ID, buf)?,
            timestamp: opt_decode(flags, FLAG_TIMESTAMP, buf)?,
            kind: opt_decode(flags, FLAG_TYPE, buf)?,
            user_id: opt_decode(flags, FLAG_USER_ID, buf)?,
            app_id: opt_decode(flags, FLAG_APP_ID, buf)?,
            cluster_id: opt_decode(flags, FLAG_CLUSTER_ID, buf)?,
        })
    }
}

/// Content header frame payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentHeader {
    pub class_id: u16,
    pub weight: u16,
    pub body_size: u64,
    pub properties: BasicProperties,
}

impl ContentHeader {
    pub fn new(body_size: u64, properties: BasicProperties) -> Self {
        ContentHeader {
            class_id: CLASS_BASIC,
            weight: 0,
            body_size,
            properties,
        }
    }
}

impl Encode for ContentHeader {
    fn encoded_size(&self) -> usize {
        12 + self.properties.encoded_size()
    }

    fn encode(&self, buf: &mut Buffer) -> Result<(), AmqpCodecError> {
        buf.append_u16(self.class_id)
            .append_u16(self.weight)
            .append_u64(self.body_size);
        self.properties.encode(buf)
    }
}

impl Decode for ContentHeader {
    fn decode(buf: &mut Buffer) -> Result<Self, AmqpParseError> {
        let class_id = buf.consume_u16()?;
        let weight = buf.consume_u16()?;
        let body_size = buf.consume_u64()?;
        let properties = BasicProperties::decode(buf)?;
        Ok(ContentHeader {
            class_id,
            weight,
            body_size,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn test_empty_header() {
        let header = ContentHeader::new(2, BasicProperties::default());
        let mut buf = Buffer::new();
        header.encode(&mut buf).unwrap();
        assert_eq!(
            buf.as_ref(),
            b"\x00\x3c\x00\x00\x00\x00\x00\x00\x00\x00\x00\x02\x00\x00"
        );
        assert_eq!(ContentHeader::decode(&mut buf).unwrap(), header);
    }

    #[test]
    fn test_flags_order() {
        let props = BasicProperties {
            content_type: Some("text/html".into()),
            delivery_mode: Some(2),
            cluster_id: Some("c".into()),
            ..Default::default()
        };
        assert_eq!(props.flags(), 0x8000 | 0x1000 | 0x0004);

        let mut buf = Buffer::new();
        props.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), props.encoded_size());
        assert_eq!(buf.as_ref(), b"\x90\x04\x09text/html\x02\x01c");
        assert_eq!(BasicProperties::decode(&mut buf).unwrap(), props);
    }

    #[test]
    fn test_all_properties() {
        let mut headers = FieldTable::default();
        headers.insert("x-custom".into(), FieldValue::from("v"));

        let props = BasicProperties {
            content_type: Some("application/json".into()),
            content_encoding: Some("gzip".into()),
            headers: Some(headers),
            delivery_mode: Some(2),
            priority: Some(9),
            correlation_id: Some("corr".into()),
            reply_to: Some("reply".into()),
            expiration: Some("60000".into()),
            message_id: Some("id".into()),
            timestamp: Some(Utc.timestamp_opt(1_600_000_000, 0).unwrap()),
            kind: Some("kind".into()),
            user_id: Some("guest".into()),
            app_id: Some("app".into()),
            cluster_id: Some("cluster".into()),
        };
        assert_eq!(props.flags(), 0xFFFC);

        let header = ContentHeader::new(1024, props);
        let mut buf = Buffer::new();
        header.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), header.encoded_size());
        assert_eq!(ContentHeader::decode(&mut buf).unwrap(), header);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_table_split() {
        let mut table = FieldTable::default();
        table.insert("content-type".into(), FieldValue::from("text/html"));
        table.insert("delivery-mode".into(), FieldValue::LongLongInt(2));
        table.insert("x-retry".into(), FieldValue::LongInt(3));

        let props = BasicProperties::from_table(table);
        assert_eq!(props.content_type.as_deref(), Some("text/html"));
        assert_eq!(props.delivery_mode, Some(2));
        let headers = props.headers.clone().unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["x-retry"], FieldValue::LongInt(3));

        let flat = props.to_table();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat["content-type"], "text/html");
        assert_eq!(flat["delivery-mode"], FieldValue::ShortShortUint(2));
    }

    #[test]
    fn test_table_split_without_extra_headers() {
        let mut table = FieldTable::default();
        table.insert("content-type".into(), FieldValue::from("text/plain"));
        let props = BasicProperties::from_table(table);
        assert!(props.headers.is_none());
        assert_eq!(props.flags(), 0x8000);
    }
}

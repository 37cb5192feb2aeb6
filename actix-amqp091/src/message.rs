use amqp091_codec::protocol::{BasicDeliver, BasicGetOk, BasicReturn, ContentHeader};
use amqp091_codec::types::{FieldTable, FieldValue};
use bytes::Bytes;
use bytestring::ByteString;

/// Message received from a consumer delivery, `basic.get` or `basic.return`.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Set for consumer deliveries
    pub consumer_tag: Option<ByteString>,
    /// Not set for returned messages
    pub delivery_tag: Option<u64>,
    pub redelivered: bool,
    pub exchange: ByteString,
    pub routing_key: ByteString,
    /// Messages left in the queue, set for `basic.get`
    pub message_count: Option<u32>,
    /// Content properties merged with the `headers` table
    pub headers: FieldTable,
    pub content: Bytes,
}

impl Message {
    pub(crate) fn delivered(deliver: BasicDeliver, header: ContentHeader, content: Bytes) -> Self {
        Message {
            consumer_tag: Some(deliver.consumer_tag),
            delivery_tag: Some(deliver.delivery_tag),
            redelivered: deliver.redelivered,
            exchange: deliver.exchange,
            routing_key: deliver.routing_key,
            message_count: None,
            headers: header.properties.to_table(),
            content,
        }
    }

    pub(crate) fn fetched(get_ok: BasicGetOk, header: ContentHeader, content: Bytes) -> Self {
        Message {
            consumer_tag: None,
            delivery_tag: Some(get_ok.delivery_tag),
            redelivered: get_ok.redelivered,
            exchange: get_ok.exchange,
            routing_key: get_ok.routing_key,
            message_count: Some(get_ok.message_count),
            headers: header.properties.to_table(),
            content,
        }
    }

    pub(crate) fn returned(ret: &BasicReturn, header: ContentHeader, content: Bytes) -> Self {
        Message {
            consumer_tag: None,
            delivery_tag: None,
            redelivered: false,
            exchange: ret.exchange.clone(),
            routing_key: ret.routing_key.clone(),
            message_count: None,
            headers: header.properties.to_table(),
            content,
        }
    }

    pub fn header(&self, name: &str) -> Option<&FieldValue> {
        self.headers.get(name)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use amqp091_codec::protocol::BasicProperties;

    use super::*;

    #[test]
    fn test_headers_merge_properties() {
        let mut headers = FieldTable::default();
        headers.insert("x-trace".into(), FieldValue::from("abc"));
        let header = ContentHeader::new(
            2,
            BasicProperties {
                content_type: Some("text/html".into()),
                headers: Some(headers),
                ..Default::default()
            },
        );
        let deliver = BasicDeliver {
            consumer_tag: "ctag".into(),
            delivery_tag: 3,
            redelivered: false,
            exchange: "".into(),
            routing_key: "q".into(),
        };

        let msg = Message::delivered(deliver, header, Bytes::from_static(b"hi"));
        assert_eq!(msg.delivery_tag, Some(3));
        assert!(msg.has_header("content-type"));
        assert!(msg.has_header("x-trace"));
        assert!(!msg.has_header("priority"));
        assert_eq!(msg.header("content-type").and_then(|v| v.as_str()), Some("text/html"));
    }
}

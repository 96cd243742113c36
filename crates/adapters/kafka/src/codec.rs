//! Kafka 消息编解码
//!
//! `Message` 与 rdkafka 原生消息之间的转换。`id` 映射为记录 key。

use std::collections::HashMap;

use courier_ports::Message;
use rdkafka::message::{Header, Headers, Message as KafkaMessage, OwnedHeaders};

/// 消息头转换为 Kafka headers
pub fn to_kafka_headers(message: &Message) -> OwnedHeaders {
    message
        .headers
        .iter()
        .fold(OwnedHeaders::new_with_capacity(message.headers.len()), |headers, (key, value)| {
            headers.insert(Header {
                key: key.as_str(),
                value: Some(value.as_str()),
            })
        })
}

/// Kafka 消息转换为 `Message`
///
/// 缺失 key 时以 `{topic}-{partition}-{offset}` 作为 id；非 UTF-8 的 header 值被跳过。
pub fn from_kafka<M: KafkaMessage>(record: &M) -> Message {
    let id = match record.key() {
        Some(key) => std::str::from_utf8(key).unwrap_or_default().to_string(),
        None => format!(
            "{}-{}-{}",
            record.topic(),
            record.partition(),
            record.offset()
        ),
    };

    let mut headers = HashMap::new();
    if let Some(kafka_headers) = record.headers() {
        for header in kafka_headers.iter() {
            if let Some(Ok(value)) = header.value.map(std::str::from_utf8) {
                headers.insert(header.key.to_string(), value.to_string());
            }
        }
    }

    Message {
        id,
        topic: record.topic().to_string(),
        payload: record.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        headers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_ports::RETRY_COUNT_HEADER;
    use rdkafka::Timestamp;
    use rdkafka::message::OwnedMessage;

    fn record(key: Option<&[u8]>, headers: Option<OwnedHeaders>) -> OwnedMessage {
        OwnedMessage::new(
            Some(b"{\"order\":7}".to_vec()),
            key.map(<[u8]>::to_vec),
            "orders".to_string(),
            Timestamp::NotAvailable,
            2,
            41,
            headers,
        )
    }

    #[test]
    fn test_outbound_headers() {
        let message = Message::new("orders", Vec::new())
            .with_header("trace-id", "abc")
            .with_retry_count(2);

        let headers = to_kafka_headers(&message);
        assert_eq!(headers.count(), 2);

        let retry = headers
            .iter()
            .find(|h| h.key == RETRY_COUNT_HEADER)
            .and_then(|h| h.value);
        assert_eq!(retry, Some(&b"2"[..]));
    }

    #[test]
    fn test_inbound_uses_key_as_id() {
        let headers = OwnedHeaders::new().insert(Header {
            key: RETRY_COUNT_HEADER,
            value: Some("1"),
        });
        let message = from_kafka(&record(Some(b"order-7"), Some(headers)));

        assert_eq!(message.id, "order-7");
        assert_eq!(message.topic, "orders");
        assert_eq!(message.payload, b"{\"order\":7}");
        assert_eq!(message.retry_count(), 1);
    }

    #[test]
    fn test_inbound_missing_key_falls_back_to_coordinates() {
        let message = from_kafka(&record(None, None));
        assert_eq!(message.id, "orders-2-41");
        assert!(message.headers.is_empty());
    }

    #[test]
    fn test_inbound_skips_non_utf8_headers() {
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "binary",
                value: Some(&[0xff_u8, 0xfe][..]),
            })
            .insert(Header {
                key: "tenant",
                value: Some(&b"acme"[..]),
            });
        let message = from_kafka(&record(Some(b"k"), Some(headers)));

        assert_eq!(message.header("tenant"), Some("acme"));
        assert_eq!(message.header("binary"), None);
    }

    #[test]
    fn test_inbound_non_utf8_key_is_empty() {
        let message = from_kafka(&record(Some(&[0xc3, 0x28]), None));
        assert_eq!(message.id, "");
    }
}

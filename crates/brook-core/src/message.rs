//! Inbound broker messages.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use serde::Serialize;

/// Message headers. Values are raw bytes as delivered by the broker.
pub type Headers = HashMap<String, Bytes>;

/// Identifies the partition a message was read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Numeric partition id.
    Id(i32),
    /// Named partition, for brokers that do not number them.
    Name(String),
}

impl Default for Partition {
    fn default() -> Self {
        Self::Id(0)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<i32> for Partition {
    fn from(id: i32) -> Self {
        Self::Id(id)
    }
}

impl From<String> for Partition {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<&str> for Partition {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// A message as delivered by a broker consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: Partition,
    pub offset: Option<i64>,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Headers,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn with_partition(mut self, partition: impl Into<Partition>) -> Self {
        self.partition = partition.into();
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Serializes `value` as the JSON payload.
    pub fn with_json<T: Serialize>(self, value: &T) -> serde_json::Result<Self> {
        let payload = serde_json::to_vec(value)?;
        Ok(self.with_value(payload))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The coordinates used when reporting completion back to the broker.
    pub fn meta(&self) -> MessageMeta {
        MessageMeta {
            topic: self.topic.clone(),
            partition: self.partition.clone(),
            offset: self.offset,
        }
    }
}

/// Where a message came from: topic, partition and offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageMeta {
    pub topic: String,
    pub partition: Partition,
    pub offset: Option<i64>,
}

impl fmt::Display for MessageMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.topic, self.partition)?;
        if let Some(offset) = self.offset {
            write!(f, "@{offset}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_meta() {
        let msg = InboundMessage::new("orders.created")
            .with_partition(3)
            .with_offset(42)
            .with_key("k1")
            .with_header("trace", "abc");

        assert_eq!(msg.headers["trace"], Bytes::from("abc"));
        let meta = msg.meta();
        assert_eq!(meta.to_string(), "orders.created[3]@42");
    }

    #[test]
    fn test_json_payload() {
        let msg = InboundMessage::new("t")
            .with_json(&serde_json::json!({"id": 7}))
            .unwrap();
        assert_eq!(msg.value.as_deref(), Some(&b"{\"id\":7}"[..]));
    }
}

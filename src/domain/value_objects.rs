use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::BrokerError;

/// Represents a topic name with validation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicName(String);

impl TopicName {
    pub fn new(name: impl Into<String>) -> Result<Self, BrokerError> {
        let name = name.into();
        if name.is_empty() {
            return Err(BrokerError::InvalidArgument(
                "Topic name cannot be empty".to_string(),
            ));
        }
        if name.chars().count() > 255 {
            return Err(BrokerError::InvalidArgument(
                "Topic name too long (max 255 characters)".to_string(),
            ));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(BrokerError::InvalidArgument(
                "Topic name cannot contain whitespace".to_string(),
            ));
        }
        // '/' separates the topic from the partition in a rendered MessageId
        if name.contains('/') {
            return Err(BrokerError::InvalidArgument(
                "Topic name cannot contain '/'".to_string(),
            ));
        }
        Ok(TopicName(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key identifying a partition within a topic.
///
/// The empty key names the default partition every topic starts with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn new(key: impl Into<String>) -> Self {
        PartitionKey(key.into())
    }

    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(key: &str) -> Self {
        PartitionKey(key.to_string())
    }
}

impl From<String> for PartitionKey {
    fn from(key: String) -> Self {
        PartitionKey(key)
    }
}

/// Represents a message offset within a partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Offset(pub u64);

impl Offset {
    pub fn new(value: u64) -> Self {
        Offset(value)
    }

    pub fn next(&self) -> Self {
        Offset(self.0 + 1)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Offset {
    fn from(value: u64) -> Self {
        Offset(value)
    }
}

/// Where a read should land: the latest message, or one exact offset.
///
/// On the wire this is an `i64` where `-1` means latest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetSpec {
    Latest,
    At(Offset),
}

impl OffsetSpec {
    pub const LATEST: i64 = -1;
}

impl TryFrom<i64> for OffsetSpec {
    type Error = BrokerError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            Self::LATEST => Ok(OffsetSpec::Latest),
            v if v >= 0 => Ok(OffsetSpec::At(Offset(v as u64))),
            v => Err(BrokerError::InvalidArgument(format!(
                "Offset must be -1 (latest) or non-negative, got {}",
                v
            ))),
        }
    }
}

impl From<Offset> for OffsetSpec {
    fn from(offset: Offset) -> Self {
        OffsetSpec::At(offset)
    }
}

impl fmt::Display for OffsetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffsetSpec::Latest => write!(f, "latest"),
            OffsetSpec::At(offset) => write!(f, "{}", offset),
        }
    }
}

/// Represents a topic-partition combination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: TopicName,
    pub partition: PartitionKey,
}

impl TopicPartition {
    pub fn new(topic: TopicName, partition: PartitionKey) -> Self {
        Self { topic, partition }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic, self.partition)
    }
}

/// Global identifier of a published message.
///
/// Rendered as `topic/partition@offset`. Callers should treat the rendering
/// as opaque; it is unique per message and orders with the offset inside a
/// partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId {
    pub topic_partition: TopicPartition,
    pub offset: Offset,
}

impl MessageId {
    pub fn new(topic: TopicName, partition: PartitionKey, offset: Offset) -> Self {
        Self {
            topic_partition: TopicPartition::new(topic, partition),
            offset,
        }
    }

    pub fn topic(&self) -> &TopicName {
        &self.topic_partition.topic
    }

    pub fn partition(&self) -> &PartitionKey {
        &self.topic_partition.partition
    }

    pub fn offset(&self) -> Offset {
        self.offset
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.topic_partition, self.offset)
    }
}

impl FromStr for MessageId {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BrokerError::InvalidArgument(format!("Malformed message id '{}'", s));

        let (topic_partition, offset) = s.rsplit_once('@').ok_or_else(invalid)?;
        let (topic, partition) = topic_partition.split_once('/').ok_or_else(invalid)?;
        let offset = offset.parse::<u64>().map_err(|_| invalid())?;

        Ok(MessageId::new(
            TopicName::new(topic)?,
            PartitionKey::new(partition),
            Offset(offset),
        ))
    }
}

/// Unique identifier for a producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProducerId(pub i64);

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "producer-{}", self.0)
    }
}

/// Unique identifier for a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerId(pub i64);

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_name_validation() {
        assert!(TopicName::new("orders").is_ok());
        assert!(matches!(
            TopicName::new(""),
            Err(BrokerError::InvalidArgument(_))
        ));
        assert!(TopicName::new("with space").is_err());
        assert!(TopicName::new("a/b").is_err());
        assert!(TopicName::new("x".repeat(256)).is_err());
        // the limit counts characters, not bytes
        assert!(TopicName::new("é".repeat(255)).is_ok());
        assert!(TopicName::new("é".repeat(256)).is_err());
    }

    #[test]
    fn test_offset_spec_from_wire_value() {
        assert_eq!(OffsetSpec::try_from(-1).unwrap(), OffsetSpec::Latest);
        assert_eq!(OffsetSpec::try_from(7).unwrap(), OffsetSpec::At(Offset(7)));
        assert!(matches!(
            OffsetSpec::try_from(-2),
            Err(BrokerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_message_id_parses_its_rendering() {
        let id = MessageId::new(
            TopicName::new("orders").unwrap(),
            PartitionKey::new("eu@west"),
            Offset(42),
        );
        let rendered = id.to_string();
        assert_eq!(rendered, "orders/eu@west@42");
        assert_eq!(rendered.parse::<MessageId>().unwrap(), id);

        // Default partition renders as an empty segment
        let default = MessageId::new(
            TopicName::new("orders").unwrap(),
            PartitionKey::default(),
            Offset(0),
        );
        assert_eq!(default.to_string(), "orders/@0");
        assert!(default.to_string().parse::<MessageId>().unwrap().partition().is_default());

        assert!("orders".parse::<MessageId>().is_err());
        assert!("orders/p@x".parse::<MessageId>().is_err());
    }
}

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::{
    cursor::PartitionCursor,
    entities::Message,
    errors::Result,
    value_objects::*,
};

/// The storage engine: a registry of topics that hides partition routing.
///
/// Operations that do not create topics fail with `TopicNotFound` for an
/// unknown topic. A durable adapter must keep these contracts unchanged.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Append `content` to `topic`, creating the topic on first use, and
    /// return the identifier of the stored message
    async fn save(
        &self,
        topic: &TopicName,
        content: Bytes,
        key: Option<PartitionKey>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<MessageId>;

    /// The most recently appended message across the topic's partitions
    async fn get(&self, topic: &TopicName) -> Result<Message>;

    /// `Latest` behaves like `get`; an exact offset reads the default partition
    async fn explore(&self, topic: &TopicName, offset: OffsetSpec) -> Result<Message>;

    /// Read from one named partition
    async fn explore_partition(
        &self,
        topic: &TopicName,
        partition: &PartitionKey,
        offset: OffsetSpec,
    ) -> Result<Message>;

    /// Forget history below the latest offset in every partition of the topic
    async fn reset_offset(&self, topic: &TopicName) -> Result<()>;

    /// Provision a topic with the given partitions. Idempotent: an existing
    /// topic only gains the partitions it is missing.
    async fn create_topic(&self, topic: &TopicName, partitions: &[PartitionKey]) -> Result<()>;

    async fn list_topics(&self) -> Result<Vec<TopicName>>;

    /// Partition keys of the topic in their stable order
    async fn partitions(&self, topic: &TopicName) -> Result<Vec<PartitionKey>>;

    /// One cursor per existing partition, each positioned at its high watermark
    async fn open_cursors(&self, topic: &TopicName) -> Result<Vec<PartitionCursor>>;
}

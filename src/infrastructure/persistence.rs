use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::info;
use std::sync::Arc;

use crate::domain::{
    cursor::PartitionCursor,
    entities::{Message, Topic},
    errors::{BrokerError, Result},
    repositories::Storage,
    value_objects::*,
};
use crate::infrastructure::config::StorageConfig;

/// In-memory implementation of the Storage engine.
///
/// The registry map only locks a shard for the duration of a lookup or a
/// create-if-absent; appends then run under the target partition's own lock.
pub struct InMemoryStorage {
    topics: DashMap<TopicName, Arc<Topic>>,
    config: StorageConfig,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::with_config(StorageConfig::default())
    }

    pub fn with_config(config: StorageConfig) -> Self {
        Self {
            topics: DashMap::new(),
            config,
        }
    }

    /// Look up a topic, releasing the registry shard before returning
    pub fn topic(&self, name: &TopicName) -> Result<Arc<Topic>> {
        self.topics
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BrokerError::TopicNotFound(name.clone()))
    }

    fn get_or_create(&self, name: &TopicName) -> Arc<Topic> {
        if let Some(topic) = self.topics.get(name) {
            return topic.value().clone();
        }
        self.topics
            .entry(name.clone())
            .or_insert_with(|| {
                info!(
                    "Creating new topic: {} ({} partitions)",
                    name, self.config.default_partitions
                );
                let keys = StorageConfig::partition_keys(self.config.default_partitions);
                Arc::new(Topic::with_partitions(name.clone(), &keys))
            })
            .value()
            .clone()
    }

    fn latest(topic: &Topic) -> Result<Message> {
        topic.latest().ok_or_else(|| BrokerError::OffsetNotFound {
            topic: topic.name().clone(),
            offset: OffsetSpec::Latest,
        })
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn save(
        &self,
        topic: &TopicName,
        content: Bytes,
        key: Option<PartitionKey>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<MessageId> {
        let topic = self.get_or_create(topic);
        let (partition, offset) = topic.route_and_append(key.as_ref(), content, expires_at);
        Ok(MessageId::new(topic.name().clone(), partition, offset))
    }

    async fn get(&self, topic: &TopicName) -> Result<Message> {
        Self::latest(&*self.topic(topic)?)
    }

    async fn explore(&self, topic: &TopicName, offset: OffsetSpec) -> Result<Message> {
        let topic = self.topic(topic)?;
        match offset {
            OffsetSpec::Latest => Self::latest(&topic),
            OffsetSpec::At(at) => topic
                .default_partition()
                .read_at(at)
                .ok_or_else(|| BrokerError::OffsetNotFound {
                    topic: topic.name().clone(),
                    offset,
                }),
        }
    }

    async fn explore_partition(
        &self,
        topic: &TopicName,
        partition: &PartitionKey,
        offset: OffsetSpec,
    ) -> Result<Message> {
        let topic = self.topic(topic)?;
        let handle = topic
            .partition(partition)
            .ok_or_else(|| BrokerError::PartitionNotFound(topic.name().clone(), partition.clone()))?;

        let message = match offset {
            OffsetSpec::Latest => handle.read_latest(),
            OffsetSpec::At(at) => handle.read_at(at),
        };
        message.ok_or_else(|| BrokerError::OffsetNotFound {
            topic: topic.name().clone(),
            offset,
        })
    }

    async fn reset_offset(&self, topic: &TopicName) -> Result<()> {
        let topic = self.topic(topic)?;
        topic.reset_offset();
        info!("Reset offsets of topic {}", topic.name());
        Ok(())
    }

    async fn create_topic(&self, topic: &TopicName, partitions: &[PartitionKey]) -> Result<()> {
        let topic = self
            .topics
            .entry(topic.clone())
            .or_insert_with(|| {
                info!("Created new topic: {}", topic);
                Arc::new(Topic::new(topic.clone()))
            })
            .value()
            .clone();

        for key in partitions {
            topic.add_partition(key.clone());
        }
        Ok(())
    }

    async fn list_topics(&self) -> Result<Vec<TopicName>> {
        let mut names: Vec<TopicName> = self.topics.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn partitions(&self, topic: &TopicName) -> Result<Vec<PartitionKey>> {
        Ok(self.topic(topic)?.partitions())
    }

    async fn open_cursors(&self, topic: &TopicName) -> Result<Vec<PartitionCursor>> {
        let topic = self.topic(topic)?;
        Ok(topic
            .partition_handles()
            .into_iter()
            .map(PartitionCursor::at_latest)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> TopicName {
        TopicName::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_save_auto_creates_with_configured_partitions() {
        let storage = InMemoryStorage::with_config(StorageConfig {
            default_partitions: 2,
        });

        let id = storage
            .save(&name("fresh"), Bytes::from_static(b"a"), None, None)
            .await
            .unwrap();
        assert_eq!(id.offset(), Offset(0));
        assert_eq!(storage.partitions(&name("fresh")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_topic_is_reported() {
        let storage = InMemoryStorage::new();
        let missing = name("missing");

        assert_eq!(
            storage.get(&missing).await.unwrap_err(),
            BrokerError::TopicNotFound(missing.clone())
        );
        assert!(storage.reset_offset(&missing).await.is_err());
        assert!(storage.open_cursors(&missing).await.is_err());
    }

    #[tokio::test]
    async fn test_explore_unknown_partition() {
        let storage = InMemoryStorage::new();
        storage.create_topic(&name("orders"), &[]).await.unwrap();

        let err = storage
            .explore_partition(&name("orders"), &PartitionKey::new("nope"), OffsetSpec::Latest)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::PartitionNotFound(_, _)));
    }

    #[tokio::test]
    async fn test_create_topic_is_idempotent() {
        let storage = InMemoryStorage::new();
        let orders = name("orders");
        storage.save(&orders, Bytes::from_static(b"a"), None, None).await.unwrap();

        storage
            .create_topic(&orders, &[PartitionKey::new("1")])
            .await
            .unwrap();
        storage
            .create_topic(&orders, &[PartitionKey::new("1")])
            .await
            .unwrap();

        assert_eq!(storage.partitions(&orders).await.unwrap().len(), 2);
        // existing history survives re-provisioning
        assert_eq!(
            storage.explore(&orders, OffsetSpec::At(Offset(0))).await.unwrap().content,
            Bytes::from_static(b"a")
        );
    }
}

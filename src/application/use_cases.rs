use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::dto::*;
use crate::domain::{
    entities::*,
    errors::*,
    repositories::Storage,
    services::*,
    subscription::Subscription,
    value_objects::*,
};

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            partition: message.partition.to_string(),
            offset: message.offset.value(),
            body: message.content,
        }
    }
}

impl From<MessageId> for PublishResponse {
    fn from(id: MessageId) -> Self {
        Self {
            id: id.to_string(),
            partition: id.partition().to_string(),
            offset: id.offset().value(),
        }
    }
}

/// Use case for publishing messages to topics
pub struct PublishUseCase {
    broker: Arc<BrokerService>,
}

impl PublishUseCase {
    pub fn new(broker: Arc<BrokerService>) -> Self {
        Self { broker }
    }

    /// Validate a raw request and publish it
    pub async fn execute(&self, request: PublishRequest) -> Result<PublishResponse> {
        let topic = TopicName::new(request.topic)?;
        if request.ttl_ms < 0 {
            return Err(BrokerError::InvalidArgument(format!(
                "TTL cannot be negative, got {}ms",
                request.ttl_ms
            )));
        }

        let mut options = PublishOptions::default();
        if request.ttl_ms > 0 {
            options = options.with_ttl(Duration::from_millis(request.ttl_ms as u64));
        }
        if let Some(key) = request.key.filter(|k| !k.is_empty()) {
            options = options.with_key(key);
        }
        if let Some(id) = request.producer_id {
            options = options.with_producer(Producer::new(ProducerId(id)));
        }

        debug!("Publishing {} bytes to topic: {}", request.body.len(), topic);
        let id = self.broker.publish(&topic, request.body, options).await?;
        Ok(id.into())
    }
}

/// Use case for opening subscriptions
pub struct SubscribeUseCase {
    broker: Arc<BrokerService>,
}

impl SubscribeUseCase {
    pub fn new(broker: Arc<BrokerService>) -> Self {
        Self { broker }
    }

    pub async fn execute(
        &self,
        request: SubscribeRequest,
        cancel: CancellationToken,
    ) -> Result<Subscription> {
        let topic = TopicName::new(request.topic)?;
        self.broker.subscribe(&topic, cancel).await
    }
}

/// Use case for topic provisioning and offset-based reads
pub struct TopicManagementUseCase {
    storage: Arc<dyn Storage>,
}

impl TopicManagementUseCase {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Create a topic (or add partitions to an existing one)
    pub async fn create_topic(&self, topic: String, partitions: Vec<String>) -> Result<TopicMetadata> {
        let topic = TopicName::new(topic)?;
        let keys: Vec<PartitionKey> = partitions.into_iter().map(PartitionKey::new).collect();

        info!("Creating topic: {} with partitions {:?}", topic, keys);
        self.storage.create_topic(&topic, &keys).await?;
        self.describe(topic.to_string()).await
    }

    pub async fn describe(&self, topic: String) -> Result<TopicMetadata> {
        let topic = TopicName::new(topic)?;
        let partitions = self.storage.partitions(&topic).await?;
        Ok(TopicMetadata {
            name: topic.to_string(),
            partitions: partitions.into_iter().map(|p| p.to_string()).collect(),
        })
    }

    /// List all topics
    pub async fn list_topics(&self) -> Result<Vec<String>> {
        let topics = self.storage.list_topics().await?;
        Ok(topics.into_iter().map(|t| t.to_string()).collect())
    }

    /// The latest message of the topic
    pub async fn get(&self, topic: String) -> Result<MessageResponse> {
        let topic = TopicName::new(topic)?;
        Ok(self.storage.get(&topic).await?.into())
    }

    pub async fn explore(&self, request: ExploreRequest) -> Result<MessageResponse> {
        let topic = TopicName::new(request.topic)?;
        let offset = OffsetSpec::try_from(request.offset)?;

        let message = match request.partition {
            Some(partition) => {
                self.storage
                    .explore_partition(&topic, &PartitionKey::new(partition), offset)
                    .await?
            }
            None => self.storage.explore(&topic, offset).await?,
        };
        Ok(message.into())
    }

    pub async fn reset_offset(&self, topic: String) -> Result<()> {
        let topic = TopicName::new(topic)?;
        info!("Resetting offsets of topic: {}", topic);
        self.storage.reset_offset(&topic).await
    }
}

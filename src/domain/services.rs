use bytes::Bytes;
use chrono::Utc;
use log::{debug, info};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{
    entities::*,
    errors::*,
    repositories::*,
    subscription::{ActiveGuard, Subscription},
    value_objects::*,
};

/// Optional parts of a publish call
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Expiry hint recorded on the message; zero means none
    pub ttl: Option<Duration>,
    /// Route to this partition instead of round-robin
    pub key: Option<PartitionKey>,
    pub producer: Option<Producer>,
}

impl PublishOptions {
    pub fn with_key(mut self, key: impl Into<PartitionKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_producer(mut self, producer: Producer) -> Self {
        self.producer = Some(producer);
        self
    }
}

/// Orchestrates publishing and subscribing on top of a `Storage`.
///
/// Publishing appends exactly once and never retries. Subscribing opens one
/// cursor per partition and hands the caller a `Subscription` that owns them.
pub struct BrokerService {
    storage: Arc<dyn Storage>,
    next_consumer_id: AtomicI64,
    active_subscriptions: Arc<AtomicUsize>,
}

impl BrokerService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            next_consumer_id: AtomicI64::new(1),
            active_subscriptions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish a message to a topic (creates topic if it doesn't exist)
    pub async fn publish(
        &self,
        topic: &TopicName,
        content: Bytes,
        options: PublishOptions,
    ) -> Result<MessageId> {
        let expires_at = match options.ttl.filter(|ttl| !ttl.is_zero()) {
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl)
                    .map_err(|_| BrokerError::InvalidArgument(format!("TTL {:?} is too large", ttl)))?;
                let expires_at = Utc::now().checked_add_signed(ttl).ok_or_else(|| {
                    BrokerError::InvalidArgument(format!("TTL {} overflows the clock", ttl))
                })?;
                Some(expires_at)
            }
            None => None,
        };

        let size = content.len();
        let id = self
            .storage
            .save(topic, content, options.key, expires_at)
            .await?;

        match options.producer {
            Some(producer) => debug!("{} published {} bytes as {}", producer.id, size, id),
            None => debug!("Published {} bytes as {}", size, id),
        }
        Ok(id)
    }

    /// Subscribe to every partition the topic has right now, starting at the
    /// latest offset of each. Partitions created later are not joined.
    pub async fn subscribe(
        &self,
        topic: &TopicName,
        cancel: CancellationToken,
    ) -> Result<Subscription> {
        let cursors = self.storage.open_cursors(topic).await?;
        let consumer = Consumer::new(ConsumerId(
            self.next_consumer_id.fetch_add(1, Ordering::Relaxed),
        ));

        info!(
            "{} subscribed to {} ({} partitions)",
            consumer.id,
            topic,
            cursors.len()
        );

        Ok(Subscription::new(
            consumer,
            topic.clone(),
            cursors,
            cancel,
            ActiveGuard::new(self.active_subscriptions.clone()),
        ))
    }

    /// Subscriptions that have not been dropped yet
    pub fn active_subscriptions(&self) -> usize {
        self.active_subscriptions.load(Ordering::SeqCst)
    }
}

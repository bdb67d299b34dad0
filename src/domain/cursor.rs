use log::warn;
use std::sync::Arc;
use tokio::sync::watch;

use super::entities::{Message, Partition, PartitionRead};
use super::errors::{BrokerError, Result};
use super::value_objects::*;

/// A consumer's read position within one partition.
///
/// Cursors are owned by the subscription they belong to and are never shared.
#[derive(Debug)]
pub struct PartitionCursor {
    partition: Arc<Partition>,
    position: Offset,
    watermark: watch::Receiver<Offset>,
}

impl PartitionCursor {
    /// Position the cursor at `position`
    pub fn at(partition: Arc<Partition>, position: Offset) -> Self {
        let watermark = partition.watch_watermark();
        Self {
            partition,
            position,
            watermark,
        }
    }

    /// Position the cursor at the partition's high watermark, so only messages
    /// appended from now on are delivered
    pub fn at_latest(partition: Arc<Partition>) -> Self {
        let position = partition.high_watermark();
        Self::at(partition, position)
    }

    pub fn position(&self) -> Offset {
        self.position
    }

    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(
            self.partition.topic().clone(),
            self.partition.key().clone(),
        )
    }

    /// Read the message under the cursor and advance past it.
    ///
    /// `Ok(None)` means nothing has been written there yet. A cursor whose
    /// position was reset away fails with `OffsetNotFound`.
    pub fn try_next(&mut self) -> Result<Option<Message>> {
        match self.partition.poll(self.position) {
            PartitionRead::Ready(message) => {
                self.position = message.offset.next();
                Ok(Some(message))
            }
            PartitionRead::Pending => Ok(None),
            PartitionRead::ChasedPast { start } => {
                warn!(
                    "Cursor on {} at offset {} was chased past, partition now starts at {}",
                    self.topic_partition(),
                    self.position,
                    start
                );
                Err(BrokerError::OffsetNotFound {
                    topic: self.partition.topic().clone(),
                    offset: OffsetSpec::At(self.position),
                })
            }
        }
    }

    /// Wait until the partition holds a message at or beyond the cursor.
    ///
    /// Cancel safe: dropping the future does not move the cursor.
    pub async fn wait_for_data(&mut self) {
        let position = self.position;
        // The sender lives in the partition this cursor keeps alive, so the
        // channel cannot close underneath us.
        let _ = self.watermark.wait_for(|next| *next > position).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    fn partition() -> Arc<Partition> {
        Arc::new(Partition::new(
            TopicName::new("orders").unwrap(),
            PartitionKey::default(),
            Arc::new(AtomicU64::new(0)),
        ))
    }

    #[test]
    fn test_cursor_at_latest_skips_history() {
        let partition = partition();
        partition.append(Bytes::from_static(b"old"), None);

        let mut cursor = PartitionCursor::at_latest(partition.clone());
        assert_eq!(cursor.position(), Offset(1));
        assert!(cursor.try_next().unwrap().is_none());

        partition.append(Bytes::from_static(b"new"), None);
        let message = cursor.try_next().unwrap().unwrap();
        assert_eq!(message.content, Bytes::from_static(b"new"));
        assert_eq!(cursor.position(), Offset(2));
    }

    #[test]
    fn test_chased_past_cursor_fails() {
        let partition = partition();
        let mut cursor = PartitionCursor::at(partition.clone(), Offset(0));
        for _ in 0..3 {
            partition.append(Bytes::from_static(b"x"), None);
        }
        partition.reset_offset();

        assert!(matches!(
            cursor.try_next(),
            Err(BrokerError::OffsetNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_wait_for_data_wakes_on_append() {
        let partition = partition();
        let mut cursor = PartitionCursor::at_latest(partition.clone());

        let writer = {
            let partition = partition.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                partition.append(Bytes::from_static(b"late"), None);
            })
        };

        tokio::time::timeout(Duration::from_secs(1), cursor.wait_for_data())
            .await
            .expect("cursor should wake on append");
        assert!(cursor.try_next().unwrap().is_some());
        writer.await.unwrap();
    }
}

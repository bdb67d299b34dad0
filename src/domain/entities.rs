use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use super::queue::Queue;
use super::value_objects::*;

/// A message is the fundamental unit of data that flows through the system
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub offset: Offset,
    pub partition: PartitionKey,
    /// Topic-wide append order, used to pick the latest message across partitions
    pub sequence: u64,
    pub content: Bytes,
    pub published_at: DateTime<Utc>,
    /// Expiry hint from the publisher's TTL. Recorded, not enforced.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Result of reading a partition at a cursor position
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionRead {
    Ready(Message),
    /// Nothing has been written at this offset yet
    Pending,
    /// The offset was reset away; the first readable offset is `start`
    ChasedPast { start: Offset },
}

#[derive(Debug)]
struct PartitionLog {
    /// First offset still held in the queue
    start: Offset,
    /// Next free offset; equals the number of messages ever appended
    next: Offset,
    queue: Queue<Message>,
}

impl PartitionLog {
    fn read(&self, offset: Offset) -> PartitionRead {
        if offset < self.start {
            return PartitionRead::ChasedPast { start: self.start };
        }
        if offset >= self.next {
            return PartitionRead::Pending;
        }
        let index = (offset.value() - self.start.value()) as usize;
        match self.queue.get(index) {
            Some(message) => PartitionRead::Ready(message.clone()),
            None => PartitionRead::Pending,
        }
    }
}

/// A partition is an ordered, append-only sequence of messages within a topic.
///
/// Appends are serialized by the write half of the log lock; readers share the
/// read half and never block each other. Each append publishes the new high
/// watermark so cursors can wait for data instead of polling.
#[derive(Debug)]
pub struct Partition {
    key: PartitionKey,
    topic: TopicName,
    log: RwLock<PartitionLog>,
    sequence: Arc<AtomicU64>,
    watermark: watch::Sender<Offset>,
}

impl Partition {
    /// Create a new empty partition that stamps messages from `sequence`
    pub fn new(topic: TopicName, key: PartitionKey, sequence: Arc<AtomicU64>) -> Self {
        let (watermark, _) = watch::channel(Offset::new(0));
        Self {
            key,
            topic,
            log: RwLock::new(PartitionLog {
                start: Offset::new(0),
                next: Offset::new(0),
                queue: Queue::new(),
            }),
            sequence,
            watermark,
        }
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    pub fn topic(&self) -> &TopicName {
        &self.topic
    }

    /// Append content and return the offset it was assigned
    pub fn append(&self, content: Bytes, expires_at: Option<DateTime<Utc>>) -> Offset {
        let mut log = self.log.write();
        let offset = log.next;
        log.queue.push(Message {
            offset,
            partition: self.key.clone(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            content,
            published_at: Utc::now(),
            expires_at,
        });
        log.next = offset.next();
        self.watermark.send_replace(log.next);
        offset
    }

    pub fn read_at(&self, offset: Offset) -> Option<Message> {
        match self.log.read().read(offset) {
            PartitionRead::Ready(message) => Some(message),
            _ => None,
        }
    }

    pub fn read_latest(&self) -> Option<Message> {
        self.log.read().queue.peek_back().cloned()
    }

    /// Cursor-facing read that tells "not yet written" apart from "reset away"
    pub fn poll(&self, offset: Offset) -> PartitionRead {
        self.log.read().read(offset)
    }

    /// Drop every message below the latest one and return the new start offset
    pub fn reset_offset(&self) -> Offset {
        let mut log = self.log.write();
        let mut evicted = 0usize;
        while log.queue.len() > 1 {
            log.queue.pop();
            evicted += 1;
        }
        let start = log.queue.peek().map(|m| m.offset).unwrap_or(log.next);
        log.start = start;
        debug!(
            "Reset {}/{}: evicted {} messages, start offset now {}",
            self.topic, self.key, evicted, log.start
        );
        log.start
    }

    /// The next free offset
    pub fn high_watermark(&self) -> Offset {
        self.log.read().next
    }

    /// Number of messages currently held
    pub fn len(&self) -> usize {
        self.log.read().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn watch_watermark(&self) -> watch::Receiver<Offset> {
        self.watermark.subscribe()
    }
}

/// A topic represents a named channel for organizing messages
#[derive(Debug)]
pub struct Topic {
    name: TopicName,
    partitions: RwLock<BTreeMap<PartitionKey, Arc<Partition>>>,
    default_partition: Arc<Partition>,
    round_robin: AtomicUsize,
    sequence: Arc<AtomicU64>,
}

impl Topic {
    /// Create a new topic with only the default partition
    pub fn new(name: TopicName) -> Self {
        Self::with_partitions(name, &[])
    }

    /// Create a topic holding the default partition plus `keys`
    pub fn with_partitions(name: TopicName, keys: &[PartitionKey]) -> Self {
        let sequence = Arc::new(AtomicU64::new(0));
        let default_partition = Arc::new(Partition::new(
            name.clone(),
            PartitionKey::default(),
            sequence.clone(),
        ));

        let mut partitions = BTreeMap::new();
        partitions.insert(PartitionKey::default(), default_partition.clone());
        for key in keys {
            partitions.entry(key.clone()).or_insert_with(|| {
                Arc::new(Partition::new(name.clone(), key.clone(), sequence.clone()))
            });
        }

        Self {
            name,
            partitions: RwLock::new(partitions),
            default_partition,
            round_robin: AtomicUsize::new(0),
            sequence,
        }
    }

    pub fn name(&self) -> &TopicName {
        &self.name
    }

    /// Add a partition if it is missing. Returns whether it was created.
    pub fn add_partition(&self, key: PartitionKey) -> bool {
        let mut partitions = self.partitions.write();
        if partitions.contains_key(&key) {
            return false;
        }
        info!("Creating partition '{}' in topic {}", key, self.name);
        let partition = Partition::new(self.name.clone(), key.clone(), self.sequence.clone());
        partitions.insert(key, Arc::new(partition));
        true
    }

    /// The partition under the empty key, present from creation
    pub fn default_partition(&self) -> &Arc<Partition> {
        &self.default_partition
    }

    /// Get a specific partition by key
    pub fn partition(&self, key: &PartitionKey) -> Option<Arc<Partition>> {
        self.partitions.read().get(key).cloned()
    }

    /// Partition keys in their stable (sorted) order; the default partition comes first
    pub fn partitions(&self) -> Vec<PartitionKey> {
        self.partitions.read().keys().cloned().collect()
    }

    pub(crate) fn partition_handles(&self) -> Vec<Arc<Partition>> {
        self.partitions.read().values().cloned().collect()
    }

    /// Route content to a partition and append it.
    ///
    /// A non-empty key goes to the partition owning it, which is created on
    /// first use. No key (or the empty key) rotates over the existing partitions.
    pub fn route_and_append(
        &self,
        key: Option<&PartitionKey>,
        content: Bytes,
        expires_at: Option<DateTime<Utc>>,
    ) -> (PartitionKey, Offset) {
        let partition = match key.filter(|k| !k.is_default()) {
            Some(key) => self.keyed_partition(key),
            None => self.next_round_robin(),
        };
        let offset = partition.append(content, expires_at);
        (partition.key().clone(), offset)
    }

    fn keyed_partition(&self, key: &PartitionKey) -> Arc<Partition> {
        if let Some(partition) = self.partition(key) {
            return partition;
        }
        self.partitions
            .write()
            .entry(key.clone())
            .or_insert_with(|| {
                info!("Creating partition '{}' in topic {}", key, self.name);
                Arc::new(Partition::new(self.name.clone(), key.clone(), self.sequence.clone()))
            })
            .clone()
    }

    fn next_round_robin(&self) -> Arc<Partition> {
        let partitions = self.partitions.read();
        let index = self.round_robin.fetch_add(1, Ordering::Relaxed) % partitions.len();
        partitions
            .values()
            .nth(index)
            .cloned()
            .unwrap_or_else(|| self.default_partition.clone())
    }

    /// The most recently appended message across all partitions
    pub fn latest(&self) -> Option<Message> {
        self.partition_handles()
            .iter()
            .filter_map(|p| p.read_latest())
            .max_by_key(|m| m.sequence)
    }

    /// Reset every partition of the topic
    pub fn reset_offset(&self) {
        for partition in self.partition_handles() {
            partition.reset_offset();
        }
    }
}

/// A producer represents a client that sends messages to topics
#[derive(Debug, Clone)]
pub struct Producer {
    pub id: ProducerId,
}

impl Producer {
    pub fn new(id: ProducerId) -> Self {
        Self { id }
    }
}

/// A consumer represents a client that reads messages from topics
#[derive(Debug, Clone)]
pub struct Consumer {
    pub id: ConsumerId,
}

impl Consumer {
    pub fn new(id: ConsumerId) -> Self {
        Self { id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    fn topic_name() -> TopicName {
        TopicName::new("orders").unwrap()
    }

    fn partition() -> Partition {
        Partition::new(topic_name(), PartitionKey::default(), Arc::new(AtomicU64::new(0)))
    }

    #[test]
    fn test_sequential_appends_read_back_in_order() {
        let partition = partition();
        for i in 0..10u64 {
            let offset = partition.append(Bytes::from(format!("m{}", i)), None);
            assert_eq!(offset, Offset(i));
        }

        for i in 0..10u64 {
            let message = partition.read_at(Offset(i)).unwrap();
            assert_eq!(message.offset, Offset(i));
            assert_eq!(message.content, Bytes::from(format!("m{}", i)));
        }
        assert_eq!(partition.high_watermark(), Offset(10));
        assert!(partition.read_at(Offset(10)).is_none());
    }

    #[test]
    fn test_read_is_idempotent() {
        let partition = partition();
        partition.append(Bytes::from_static(b"a"), None);

        let first = partition.read_at(Offset(0)).unwrap();
        let second = partition.read_at(Offset(0)).unwrap();
        assert_eq!(first.content, second.content);
    }

    #[test]
    fn test_concurrent_appends_get_unique_offsets() {
        let partition = Arc::new(partition());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let partition = partition.clone();
                thread::spawn(move || {
                    (0..250)
                        .map(|_| partition.append(Bytes::from_static(b"x"), None))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for offset in handle.join().unwrap() {
                assert!(seen.insert(offset), "offset {} assigned twice", offset);
            }
        }
        assert_eq!(seen.len(), 2000);
        assert_eq!(partition.high_watermark(), Offset(2000));
    }

    #[test]
    fn test_reset_keeps_only_latest() {
        let partition = partition();
        for _ in 0..3 {
            partition.append(Bytes::from_static(b"x"), None);
        }

        assert_eq!(partition.reset_offset(), Offset(2));
        assert_eq!(partition.poll(Offset(0)), PartitionRead::ChasedPast { start: Offset(2) });
        assert!(partition.read_at(Offset(1)).is_none());
        assert_eq!(partition.read_latest().unwrap().offset, Offset(2));

        // offsets keep growing after a reset
        assert_eq!(partition.append(Bytes::from_static(b"y"), None), Offset(3));
        assert_eq!(partition.poll(Offset(4)), PartitionRead::Pending);
    }

    #[test]
    fn test_reset_of_empty_partition() {
        let partition = partition();
        assert_eq!(partition.reset_offset(), Offset(0));
        assert_eq!(partition.append(Bytes::from_static(b"a"), None), Offset(0));
    }

    #[test]
    fn test_round_robin_alternates_partitions() {
        let topic = Topic::with_partitions(topic_name(), &[PartitionKey::new("1")]);
        let assigned: Vec<_> = (0..4)
            .map(|_| topic.route_and_append(None, Bytes::from_static(b"x"), None).0)
            .collect();

        assert_ne!(assigned[0], assigned[1]);
        assert_eq!(assigned[0], assigned[2]);
        assert_eq!(assigned[1], assigned[3]);
    }

    #[test]
    fn test_keyed_routing_creates_partition_lazily() {
        let topic = Topic::new(topic_name());
        let key = PartitionKey::new("eu");

        let (partition, offset) = topic.route_and_append(Some(&key), Bytes::from_static(b"a"), None);
        assert_eq!(partition, key);
        assert_eq!(offset, Offset(0));
        assert_eq!(topic.partitions(), vec![PartitionKey::default(), key.clone()]);

        let (_, offset) = topic.route_and_append(Some(&key), Bytes::from_static(b"b"), None);
        assert_eq!(offset, Offset(1));
    }

    #[test]
    fn test_latest_spans_partitions() {
        let topic = Topic::new(topic_name());
        topic.route_and_append(None, Bytes::from_static(b"old"), None);
        topic.route_and_append(Some(&PartitionKey::new("k")), Bytes::from_static(b"new"), None);

        assert_eq!(topic.latest().unwrap().content, Bytes::from_static(b"new"));
    }

    #[test]
    fn test_expiry_hint() {
        let partition = partition();
        let now = Utc::now();
        partition.append(Bytes::from_static(b"a"), Some(now));
        partition.append(Bytes::from_static(b"b"), None);

        assert!(partition.read_at(Offset(0)).unwrap().is_expired(now));
        assert!(!partition.read_at(Offset(1)).unwrap().is_expired(now));
    }
}

use futures::future::select_all;
use futures::Stream;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::cursor::PartitionCursor;
use super::entities::{Consumer, Message};
use super::errors::Result;
use super::value_objects::*;

/// Lifecycle of a subscription.
///
/// `Open -> Streaming -> {Cancelled | Failed} -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Partitions resolved, nothing read yet
    Open,
    Streaming,
    /// Ended by the cancellation token; no error is surfaced
    Cancelled,
    /// A cursor hit an unrecoverable storage error, surfaced once
    Failed,
    Closed,
}

/// Counts a live subscription until dropped
#[derive(Debug)]
pub(crate) struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    pub(crate) fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A lazy, unbounded stream of messages from every partition a topic had when
/// the subscription was opened.
///
/// Ready partitions are served in rotation, so delivery order is only
/// guaranteed within a partition. Between messages the subscription waits on
/// the partitions' watermarks and on its cancellation token.
#[derive(Debug)]
pub struct Subscription {
    consumer: Consumer,
    topic: TopicName,
    cursors: Vec<PartitionCursor>,
    next_cursor: usize,
    cancel: CancellationToken,
    state: SubscriptionState,
    _active: ActiveGuard,
}

impl Subscription {
    pub(crate) fn new(
        consumer: Consumer,
        topic: TopicName,
        cursors: Vec<PartitionCursor>,
        cancel: CancellationToken,
        active: ActiveGuard,
    ) -> Self {
        Self {
            consumer,
            topic,
            cursors,
            next_cursor: 0,
            cancel,
            state: SubscriptionState::Open,
            _active: active,
        }
    }

    pub fn consumer(&self) -> &Consumer {
        &self.consumer
    }

    pub fn topic(&self) -> &TopicName {
        &self.topic
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Partitions this subscription reads, one cursor each
    pub fn partitions(&self) -> Vec<PartitionKey> {
        self.cursors
            .iter()
            .map(|c| c.topic_partition().partition)
            .collect()
    }

    /// Next message, or `None` once the stream has ended.
    ///
    /// A failure is yielded once as `Some(Err(_))`; the following call returns
    /// `None`. Cancel safe: dropping the future never loses a message.
    pub async fn next(&mut self) -> Option<Result<Message>> {
        match self.state {
            SubscriptionState::Open => {
                debug!("{} streaming from {}", self.consumer.id, self.topic);
                self.state = SubscriptionState::Streaming;
            }
            SubscriptionState::Streaming => {}
            SubscriptionState::Cancelled | SubscriptionState::Failed | SubscriptionState::Closed => {
                self.state = SubscriptionState::Closed;
                return None;
            }
        }

        loop {
            if self.cancel.is_cancelled() {
                info!("{} cancelled its subscription to {}", self.consumer.id, self.topic);
                self.state = SubscriptionState::Cancelled;
                return None;
            }

            match self.poll_cursors() {
                Ok(Some(message)) => return Some(Ok(message)),
                Ok(None) => {}
                Err(err) => {
                    warn!("Subscription of {} to {} failed: {}", self.consumer.id, self.topic, err);
                    self.state = SubscriptionState::Failed;
                    return Some(Err(err));
                }
            }

            let cancel = &self.cancel;
            if self.cursors.is_empty() {
                cancel.cancelled().await;
                continue;
            }
            let waits = self.cursors.iter_mut().map(|c| Box::pin(c.wait_for_data()));
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = select_all(waits) => {}
            }
        }
    }

    /// Take one message from the first ready cursor, starting after the one
    /// served last
    fn poll_cursors(&mut self) -> Result<Option<Message>> {
        let count = self.cursors.len();
        for step in 0..count {
            let index = (self.next_cursor + step) % count;
            if let Some(message) = self.cursors[index].try_next()? {
                self.next_cursor = (index + 1) % count;
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    /// Adapt into a `Stream`; the stream ends where `next` would return `None`
    pub fn into_stream(self) -> impl Stream<Item = Result<Message>> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .next()
                .await
                .map(|item| (item, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!(
            "Closing subscription of {} to {} ({:?})",
            self.consumer.id, self.topic, self.state
        );
    }
}

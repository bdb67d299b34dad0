use thiserror::Error;

use super::value_objects::*;

pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors surfaced by the storage engine and the broker service.
///
/// Queues and partitions report absence as plain `Option`s; these named
/// kinds only appear once topic and partition identity is known.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("Topic '{0}' not found")]
    TopicNotFound(TopicName),

    #[error("Partition '{1}' does not exist in topic '{0}'")]
    PartitionNotFound(TopicName, PartitionKey),

    #[error("Offset {offset} not found in topic '{topic}'")]
    OffsetNotFound { topic: TopicName, offset: OffsetSpec },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Consumer-initiated end of a subscription. Not a failure.
    #[error("Subscription cancelled")]
    Cancelled,
}

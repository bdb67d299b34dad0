use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Data Transfer Object for publish requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub topic: String,
    pub body: Bytes,
    /// Expiry hint in milliseconds, 0 for none
    pub ttl_ms: i64,
    /// Partition key; absent or empty routes round-robin
    pub key: Option<String>,
    pub producer_id: Option<i64>,
}

impl PublishRequest {
    pub fn new(topic: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            body: body.into(),
            ttl_ms: 0,
            key: None,
            producer_id: None,
        }
    }
}

/// Data Transfer Object for publish responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResponse {
    /// Rendered message id, opaque to clients
    pub id: String,
    pub partition: String,
    pub offset: u64,
}

/// Data Transfer Object for subscribe requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub topic: String,
}

/// A delivered or explored message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub partition: String,
    pub offset: u64,
    pub body: Bytes,
}

/// Data Transfer Object for explore requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploreRequest {
    pub topic: String,
    /// Read a named partition instead of the default one
    pub partition: Option<String>,
    /// -1 for the latest message
    pub offset: i64,
}

/// Data Transfer Object for topic metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMetadata {
    pub name: String,
    pub partitions: Vec<String>,
}

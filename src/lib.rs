//! # Log-Broker
//!
//! An in-memory, partitioned-log message broker.
//!
//! Topics are split into partitions, each an append-only queue addressed by
//! monotonically increasing offsets. Producers publish to a topic (routed by
//! partition key or round-robin); consumers subscribe and receive a lazy,
//! cancellable stream of everything published after they joined.
//!
//! ## Architecture
//!
//! The codebase follows Domain-Driven Design principles with clear separation between:
//! - **Domain Layer**: queue, partition, topic, the `Storage` contract and the broker service
//! - **Application Layer**: use cases that validate raw requests
//! - **Infrastructure Layer**: in-memory storage, wire protocol, TCP server and configuration
//!
//! ## Usage
//!
//! ```rust
//! use bytes::Bytes;
//! use log_broker::domain::services::{BrokerService, PublishOptions};
//! use log_broker::domain::value_objects::TopicName;
//! use log_broker::infrastructure::persistence::InMemoryStorage;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = BrokerService::new(Arc::new(InMemoryStorage::new()));
//!     let topic = TopicName::new("orders")?;
//!
//!     // The first publish creates the topic
//!     broker.publish(&topic, Bytes::from("first"), PublishOptions::default()).await?;
//!
//!     let mut subscription = broker.subscribe(&topic, CancellationToken::new()).await?;
//!     let id = broker
//!         .publish(&topic, Bytes::from("second"), PublishOptions::default())
//!         .await?;
//!     println!("Message stored as {}", id);
//!
//!     let message = subscription.next().await.unwrap()?;
//!     assert_eq!(message.content, Bytes::from("second"));
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::entities::{Message, Partition, Topic};
pub use domain::errors::{BrokerError, Result};
pub use domain::repositories::Storage;
pub use domain::services::{BrokerService, PublishOptions};
pub use domain::subscription::{Subscription, SubscriptionState};
pub use domain::value_objects::{MessageId, Offset, OffsetSpec, PartitionKey, TopicName};
pub use infrastructure::persistence::InMemoryStorage;
pub use infrastructure::server::BrokerServer;

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::domain::value_objects::PartitionKey;

/// Network settings of the broker server
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Frames larger than this close the connection
    pub max_frame_size: usize,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9092,
            max_frame_size: 1024 * 1024,
        }
    }
}

/// Settings of the in-memory storage engine
#[derive(Debug, Clone, Serialize)]
pub struct StorageConfig {
    /// Partitions given to a topic created by its first publish
    pub default_partitions: usize,
}

impl StorageConfig {
    /// Keys for a topic with `count` partitions: the default `""` then `"1"`, `"2"`, ...
    pub fn partition_keys(count: usize) -> Vec<PartitionKey> {
        (0..count.max(1))
            .map(|i| match i {
                0 => PartitionKey::default(),
                i => PartitionKey::new(i.to_string()),
            })
            .collect()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_partitions: 1,
        }
    }
}

/// A topic to provision at startup, written `name` or `name:partitions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicProvision {
    pub name: String,
    pub partitions: usize,
}

impl FromStr for TopicProvision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, partitions) = match s.split_once(':') {
            Some((name, count)) => {
                let count = count
                    .parse::<usize>()
                    .map_err(|_| format!("invalid partition count in '{}'", s))?;
                (name, count)
            }
            None => (s, 1),
        };
        if name.is_empty() {
            return Err(format!("missing topic name in '{}'", s));
        }
        if partitions == 0 {
            return Err(format!("topic '{}' needs at least one partition", name));
        }
        Ok(TopicProvision {
            name: name.to_string(),
            partitions,
        })
    }
}

impl fmt::Display for TopicProvision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.partitions)
    }
}

/// Everything the binary needs to start a broker
#[derive(Debug, Clone, Default, Serialize)]
pub struct BrokerConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub topics: Vec<TopicProvision>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_provision_parsing() {
        assert_eq!(
            "orders:3".parse::<TopicProvision>().unwrap(),
            TopicProvision {
                name: "orders".to_string(),
                partitions: 3
            }
        );
        assert_eq!("events".parse::<TopicProvision>().unwrap().partitions, 1);
        assert!("orders:0".parse::<TopicProvision>().is_err());
        assert!("orders:x".parse::<TopicProvision>().is_err());
        assert!(":2".parse::<TopicProvision>().is_err());
    }

    #[test]
    fn test_partition_keys_start_with_default() {
        let keys = StorageConfig::partition_keys(3);
        assert_eq!(
            keys,
            vec![PartitionKey::default(), PartitionKey::new("1"), PartitionKey::new("2")]
        );
        assert_eq!(StorageConfig::partition_keys(0), vec![PartitionKey::default()]);
    }
}

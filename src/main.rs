use clap::Parser;
use log::{info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use log_broker::application::use_cases::TopicManagementUseCase;
use log_broker::domain::services::BrokerService;
use log_broker::infrastructure::config::{
    BrokerConfig, ServerConfig, StorageConfig, TopicProvision,
};
use log_broker::infrastructure::persistence::InMemoryStorage;
use log_broker::infrastructure::server::BrokerServer;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host to bind the server to
    #[arg(short = 'H', long, env = "BROKER_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the server to
    #[arg(short, long, env = "BROKER_PORT", default_value_t = 9092)]
    port: u16,

    /// Largest request frame accepted, in bytes
    #[arg(long, env = "BROKER_MAX_FRAME_SIZE", default_value_t = 1024 * 1024)]
    max_frame_size: usize,

    /// Partitions given to topics created by their first publish
    #[arg(long, env = "BROKER_DEFAULT_PARTITIONS", default_value_t = 1)]
    default_partitions: usize,

    /// Topics to provision at startup, as `name` or `name:partitions`
    #[arg(long = "topic", env = "BROKER_TOPICS", value_delimiter = ',')]
    topics: Vec<TopicProvision>,
}

impl From<Args> for BrokerConfig {
    fn from(args: Args) -> Self {
        BrokerConfig {
            server: ServerConfig {
                host: args.host,
                port: args.port,
                max_frame_size: args.max_frame_size,
            },
            storage: StorageConfig {
                default_partitions: args.default_partitions.max(1),
            },
            topics: args.topics,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let config = BrokerConfig::from(Args::parse());
    info!("Starting log-broker with config {}", serde_json::to_string(&config)?);

    let storage = Arc::new(InMemoryStorage::with_config(config.storage.clone()));

    let topics = TopicManagementUseCase::new(storage.clone());
    for provision in &config.topics {
        let keys = StorageConfig::partition_keys(provision.partitions)
            .into_iter()
            .map(|k| k.to_string())
            .collect();
        let metadata = topics.create_topic(provision.name.clone(), keys).await?;
        info!(
            "Provisioned topic {} with {} partitions",
            metadata.name,
            metadata.partitions.len()
        );
    }

    let broker = Arc::new(BrokerService::new(storage));
    let server = BrokerServer::new(config.server, broker);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Received Ctrl-C, shutting down");
        signal.cancel();
    });

    server.start(shutdown).await?;

    Ok(())
}

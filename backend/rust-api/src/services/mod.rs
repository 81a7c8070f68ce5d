use crate::config::Config;
use mongodb::{Client as MongoClient, Database};

/// Shared state of the health/metrics endpoints.
pub struct AppState {
    pub config: Config,
    pub mongo: Database,
}

impl AppState {
    pub fn new(config: Config, mongo_client: MongoClient) -> Self {
        let mongo = mongo_client.database(&config.database.mongo_database);
        Self { config, mongo }
    }
}

/// Connects to MongoDB and verifies the connection with a ping.
pub async fn connect_mongo(config: &Config) -> anyhow::Result<MongoClient> {
    use anyhow::Context;

    let client = MongoClient::with_uri_str(&config.database.mongo_uri)
        .await
        .context("Invalid MongoDB URI")?;

    tokio::time::timeout(
        std::time::Duration::from_secs(10),
        client
            .database(&config.database.mongo_database)
            .run_command(mongodb::bson::doc! { "ping": 1 }),
    )
    .await
    .map_err(|_| anyhow::anyhow!("MongoDB ping timeout after 10s"))?
    .context("MongoDB ping failed")?;

    tracing::info!("MongoDB connection established successfully");
    Ok(client)
}

pub mod content_builder;
pub mod email_service;
pub mod notification_dispatcher;
pub mod scheduler;
pub mod templates;
pub mod user_store;

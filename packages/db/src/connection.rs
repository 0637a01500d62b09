//! Store connection management.

use std::sync::Arc;

use broadcast_core::ValidationError;
use thiserror::Error;

use crate::store::{KvStore, MemoryStore};

/// Shared handle to the queue store, injected into every repository.
pub type Store = Arc<dyn KvStore>;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Connection endpoint: `memory://` or `redis://host:port/db`.
    pub endpoint: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "memory://".to_string(),
        }
    }
}

impl StoreConfig {
    /// Create a config for in-memory testing.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a config for a Redis server.
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            endpoint: url.into(),
        }
    }

    fn is_memory(&self) -> bool {
        self.endpoint.is_empty() || self.endpoint.starts_with("memory://")
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Invalid store configuration: {0}")]
    Config(String),
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Wrong value type at key {0}")]
    WrongType(String),
    #[error("Value at {key}.{field} is not an integer")]
    NotAnInteger { key: String, field: String },
    #[error("Corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl DbError {
    pub(crate) fn corrupt(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        DbError::Corrupt {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

/// Open the store described by `config`.
pub async fn connect(config: &StoreConfig) -> Result<Store, DbError> {
    if config.is_memory() {
        tracing::info!("Using in-memory broadcast store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    connect_redis(config).await
}

#[cfg(feature = "redis")]
async fn connect_redis(config: &StoreConfig) -> Result<Store, DbError> {
    tracing::info!("Connecting to Redis: {}", redacted(&config.endpoint));
    let store = crate::store::RedisStore::connect(&config.endpoint).await?;
    tracing::info!("Connected to Redis");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(config: &StoreConfig) -> Result<Store, DbError> {
    Err(DbError::Config(format!(
        "endpoint {} needs the `redis` feature",
        config.endpoint
    )))
}

/// Hide credentials in a connection URL before logging it.
fn redacted(endpoint: &str) -> String {
    match (endpoint.find("://"), endpoint.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &endpoint[..scheme_end], &endpoint[at..])
        }
        _ => endpoint.to_string(),
    }
}

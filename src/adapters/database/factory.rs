//! Store factory
//!
//! This module provides factory functions to create stores based on configuration.

use crate::adapters::database::traits::{EncodingStore, RelationalStore};
use crate::adapters::file::JsonEncodingStore;
use crate::adapters::memory::MemoryStore;
use crate::adapters::postgresql::adapter::PostgreSQLAdapter;
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::config::schema::{ArborConfig, DatabaseTarget, EncodingStoreKind};
use crate::domain::errors::ConfigError;
use crate::domain::Result;
use std::sync::Arc;

/// The relational store and the encoding metadata store of one process
#[derive(Clone)]
pub struct Stores {
    pub relational: Arc<dyn RelationalStore>,
    pub encoding: Arc<dyn EncodingStore>,
}

/// Create the relational store and encoding store from configuration
///
/// With `metadata_store = "database"` both share the same backend (and, for
/// PostgreSQL, the same connection pool).
///
/// # Errors
///
/// Returns an error if the store cannot be created or, for PostgreSQL
/// metadata, the metadata table cannot be created.
pub async fn create_stores(config: &ArborConfig) -> Result<Stores> {
    match config.database_target {
        DatabaseTarget::PostgreSQL => {
            let pg_config = config.postgresql.as_ref().ok_or_else(|| {
                ConfigError::Invalid("postgresql configuration is required".to_string())
            })?;

            tracing::info!("Creating PostgreSQL store");
            let client = Arc::new(PostgreSQLClient::new(pg_config.clone())?);
            let adapter = Arc::new(PostgreSQLAdapter::new_with_arc(client.clone()));

            let encoding: Arc<dyn EncodingStore> = match config.encoding.metadata_store {
                EncodingStoreKind::Database => {
                    client.ensure_metadata_schema().await?;
                    adapter.clone()
                }
                EncodingStoreKind::File => {
                    Arc::new(JsonEncodingStore::new(&config.encoding.metadata_path))
                }
            };

            Ok(Stores {
                relational: adapter,
                encoding,
            })
        }
        DatabaseTarget::Memory => {
            let store = match &config.memory.seed_path {
                Some(path) => MemoryStore::from_seed_file(path)?,
                None => MemoryStore::new(),
            };
            tracing::info!("Creating in-memory store");
            Ok(memory_stores(
                Arc::new(store),
                &config.encoding.metadata_store,
                &config.encoding.metadata_path,
            ))
        }
    }
}

fn memory_stores(store: Arc<MemoryStore>, kind: &EncodingStoreKind, metadata_path: &str) -> Stores {
    let encoding: Arc<dyn EncodingStore> = match kind {
        EncodingStoreKind::Database => store.clone(),
        EncodingStoreKind::File => Arc::new(JsonEncodingStore::new(metadata_path)),
    };
    Stores {
        relational: store,
        encoding,
    }
}

impl Stores {
    /// Both roles served by one in-memory store
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        memory_stores(store, &EncodingStoreKind::Database, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_str;

    #[tokio::test]
    async fn test_memory_target() {
        let config = load_config_str("database_target = \"memory\"").unwrap();
        let stores = create_stores(&config).await.unwrap();
        assert_eq!(stores.relational.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_memory_seed_missing() {
        let mut config = load_config_str("database_target = \"memory\"").unwrap();
        config.memory.seed_path = Some("/nonexistent/seed.json".to_string());
        assert!(create_stores(&config).await.is_err());
    }
}

//! Read-through cache of schema artifacts
//!
//! Each table identifier gets its own async lock so concurrent jobs on the
//! same table load the artifact once, while different tables load in
//! parallel.

use super::node::SchemaNode;
use crate::domain::errors::ConfigError;
use crate::domain::ids::TableName;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct CachedSchema {
    node: Arc<SchemaNode>,
    loaded_at: Instant,
}

type Slot = Arc<tokio::sync::Mutex<Option<CachedSchema>>>;

/// Loads `<config_dir>/<table_id>.toml` (or `.json`) with a TTL cache
#[derive(Debug)]
pub struct SchemaCatalog {
    config_dir: PathBuf,
    ttl: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl SchemaCatalog {
    /// Creates a catalog over a directory of artifacts
    pub fn new(config_dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            config_dir: config_dir.into(),
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Directory artifacts are read from
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Returns the schema for a table, loading it on first use or after expiry
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Missing`] if neither artifact exists
    /// - [`ConfigError::Unreadable`] if the file can't be read or parsed
    /// - [`ConfigError::Invalid`] if the tree violates a schema invariant
    pub async fn load(&self, table_id: &str) -> Result<Arc<SchemaNode>, ConfigError> {
        // Identifiers become file names, so they get the table-name rules
        TableName::new(table_id).map_err(ConfigError::Invalid)?;

        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(table_id.to_string()).or_default().clone()
        };

        let mut cached = slot.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.loaded_at.elapsed() < self.ttl {
                return Ok(entry.node.clone());
            }
        }

        let node = Arc::new(self.read_artifact(table_id).await?);
        tracing::debug!(
            table = table_id,
            tables = node.walk().len(),
            "Schema artifact loaded"
        );
        *cached = Some(CachedSchema {
            node: node.clone(),
            loaded_at: Instant::now(),
        });
        Ok(node)
    }

    /// Drops one cached schema, or all of them
    pub fn invalidate(&self, table_id: Option<&str>) {
        let mut slots = self.slots.lock();
        match table_id {
            Some(id) => {
                slots.remove(id);
            }
            None => slots.clear(),
        }
    }

    /// Identifiers of every artifact in the config directory
    pub async fn list(&self) -> Result<Vec<String>, ConfigError> {
        let mut entries = tokio::fs::read_dir(&self.config_dir).await.map_err(|e| {
            ConfigError::Unreadable(format!("{}: {e}", self.config_dir.display()))
        })?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ConfigError::Unreadable(e.to_string()))?
        {
            let path = entry.path();
            let is_artifact = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("toml" | "json")
            );
            if let (true, Some(stem)) = (is_artifact, path.file_stem().and_then(|s| s.to_str())) {
                if !ids.iter().any(|id| id == stem) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn read_artifact(&self, table_id: &str) -> Result<SchemaNode, ConfigError> {
        let toml_path = self.config_dir.join(format!("{table_id}.toml"));
        if let Some(contents) = read_optional(&toml_path).await? {
            return SchemaNode::from_toml_str(&contents);
        }

        let json_path = self.config_dir.join(format!("{table_id}.json"));
        if let Some(contents) = read_optional(&json_path).await? {
            return SchemaNode::from_json_str(&contents);
        }

        Err(ConfigError::Missing(table_id.to_string()))
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::Unreadable(format!("{}: {e}", path.display()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ITEM: &str = r#"
table_name = "item"
root_tag = "items"
item_tag = "item"
sql = "SELECT * FROM item"
"#;

    fn catalog_with(dir: &TempDir, ttl: Duration) -> SchemaCatalog {
        std::fs::write(dir.path().join("item.toml"), ITEM).unwrap();
        SchemaCatalog::new(dir.path(), ttl)
    }

    #[tokio::test]
    async fn test_load_caches_within_ttl() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog_with(&dir, Duration::from_secs(300));

        let first = catalog.load("item").await.unwrap();
        std::fs::write(dir.path().join("item.toml"), ITEM.replace("items", "goods")).unwrap();
        let second = catalog.load("item").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        catalog.invalidate(Some("item"));
        let third = catalog.load("item").await.unwrap();
        assert_eq!(third.root_tag.as_deref(), Some("goods"));
    }

    #[tokio::test]
    async fn test_zero_ttl_always_reloads() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog_with(&dir, Duration::ZERO);
        let first = catalog.load("item").await.unwrap();
        let second = catalog.load("item").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let catalog = SchemaCatalog::new(dir.path(), Duration::from_secs(60));
        assert_eq!(
            catalog.load("npc").await.unwrap_err(),
            ConfigError::Missing("npc".to_string())
        );
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let catalog = SchemaCatalog::new(dir.path(), Duration::from_secs(60));
        assert!(matches!(
            catalog.load("../etc/passwd").await,
            Err(ConfigError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_json_fallback_and_list() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog_with(&dir, Duration::from_secs(60));
        std::fs::write(
            dir.path().join("npc.json"),
            r#"{"table_name":"npc","root_tag":"npcs","item_tag":"npc","sql":"SELECT * FROM npc"}"#,
        )
        .unwrap();

        assert_eq!(catalog.load("npc").await.unwrap().table.as_str(), "npc");
        assert_eq!(catalog.list().await.unwrap(), vec!["item", "npc"]);
    }
}

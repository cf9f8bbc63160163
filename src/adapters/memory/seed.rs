//! JSON seed files for the in-memory store
//!
//! ```json
//! {
//!   "tables": {
//!     "item": {
//!       "columns": [{"name": "id"}, {"name": "name", "capacity": 32}],
//!       "rows": [{"id": 1, "name": "sword"}]
//!     }
//!   }
//! }
//! ```

use super::store::{MemoryColumn, MemoryStore};
use crate::domain::errors::ConfigError;
use crate::domain::row::Row;
use crate::domain::Result;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct SeedFile {
    tables: IndexMap<String, SeedTable>,
}

#[derive(Debug, Deserialize)]
struct SeedTable {
    columns: Vec<SeedColumn>,
    #[serde(default)]
    rows: Vec<IndexMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct SeedColumn {
    name: String,
    #[serde(default)]
    capacity: Option<usize>,
}

fn cell(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl MemoryStore {
    /// Builds a store from seed text
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the JSON is malformed, or a store
    /// error if a row doesn't fit its table.
    pub fn from_seed_str(contents: &str) -> Result<Self> {
        let seed: SeedFile = serde_json::from_str(contents)
            .map_err(|e| ConfigError::Unreadable(format!("memory seed: {e}")))?;
        let store = MemoryStore::new();
        for (name, table) in seed.tables {
            store.create_table(
                &name,
                table
                    .columns
                    .into_iter()
                    .map(|c| MemoryColumn {
                        name: c.name,
                        capacity: c.capacity,
                    })
                    .collect(),
            );
            store.seed_rows(
                &name,
                table
                    .rows
                    .into_iter()
                    .map(|row| Row::from_pairs(row.into_iter().map(|(k, v)| (k, cell(v))))),
            )?;
        }
        Ok(store)
    }

    /// Builds a store from a seed file
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or parsed.
    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Unreadable(format!("memory seed {}: {e}", path.display()))
        })?;
        let store = Self::from_seed_str(&contents)?;
        tracing::info!(path = %path.display(), "Memory store seeded");
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_values_become_text() {
        let store = MemoryStore::from_seed_str(
            r#"{"tables": {"item": {
                "columns": [{"name": "id"}, {"name": "name", "capacity": 4}, {"name": "note"}],
                "rows": [{"id": 1, "name": "bow", "note": null}]
            }}}"#,
        )
        .unwrap();
        let rows = store.rows("item");
        assert_eq!(rows[0].value("id"), Some("1"));
        assert_eq!(rows[0].get("note"), Some(&None));
        assert_eq!(store.capacity("item", "name"), Some(4));
    }

    #[test]
    fn test_seed_errors() {
        assert!(MemoryStore::from_seed_str("{").is_err());
        let too_long = r#"{"tables": {"t": {"columns": [{"name": "a", "capacity": 1}], "rows": [{"a": "xy"}]}}}"#;
        assert!(MemoryStore::from_seed_str(too_long).is_err());
    }
}

//! JSON file encoding metadata store
//!
//! Keeps every [`EncodingRecord`] in one pretty-printed JSON array. Writes go
//! to a temporary file in the same directory and are renamed into place.

use crate::adapters::database::traits::EncodingStore;
use crate::core::encoding::EncodingRecord;
use crate::domain::errors::ArborError;
use crate::domain::ids::TableName;
use crate::domain::Result;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Encoding metadata persisted to a JSON file
pub struct JsonEncodingStore {
    path: PathBuf,
    // serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonEncodingStore {
    /// Creates a store backed by `path`; the file is created on first save
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<EncodingRecord>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(Vec::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, records: &[EncodingRecord]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let json = serde_json::to_vec_pretty(records)?;
        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        file.write_all(&json)?;
        file.persist(&self.path)
            .map_err(|e| ArborError::Io(format!("{}: {}", self.path.display(), e.error)))?;
        Ok(())
    }
}

#[async_trait]
impl EncodingStore for JsonEncodingStore {
    async fn load(&self, table: &TableName, variant: &str) -> Result<Option<EncodingRecord>> {
        let records = self.read_all().await?;
        Ok(records
            .into_iter()
            .find(|r| &r.table == table && r.variant == variant))
    }

    async fn save(&self, record: &EncodingRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        match records
            .iter_mut()
            .find(|r| r.table == record.table && r.variant == record.variant)
        {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        self.write_all(&records)?;
        tracing::debug!(
            path = %self.path.display(),
            table = %record.table,
            variant = %record.variant,
            "Encoding metadata written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encoding::Charset;

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonEncodingStore::new(dir.path().join("meta").join("encodings.json"));
        let item = TableName::new("item").unwrap();

        assert!(store.load(&item, "default").await.unwrap().is_none());

        let first = EncodingRecord::new(item.clone(), "default", Charset::Utf8, false);
        store.save(&first).await.unwrap();
        let second = EncodingRecord::new(item.clone(), "default", Charset::Utf16Be, true);
        store.save(&second).await.unwrap();
        let other = EncodingRecord::new(item.clone(), "map1", Charset::Utf16Le, true);
        store.save(&other).await.unwrap();

        assert_eq!(store.load(&item, "default").await.unwrap(), Some(second));
        assert_eq!(store.load(&item, "map1").await.unwrap(), Some(other));

        let on_disk: Vec<EncodingRecord> =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.json");
        std::fs::write(&path, "not json").unwrap();
        let store = JsonEncodingStore::new(path);
        let item = TableName::new("item").unwrap();
        assert!(store.load(&item, "default").await.is_err());
    }
}

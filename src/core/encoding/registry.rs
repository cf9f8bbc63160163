//! Read-through cache over the encoding metadata store

use super::charset::Charset;
use super::detect::detect;
use super::record::EncodingRecord;
use crate::adapters::database::traits::EncodingStore;
use crate::domain::ids::{TableName, Variant};
use crate::domain::Result;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Where a resolved encoding came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingSource {
    /// Metadata recorded by an earlier import
    Stored,
    /// Detected from the previous output file
    PriorArtifact,
    /// Configured default
    Default,
}

/// Encoding chosen for an export
#[derive(Debug, Clone)]
pub struct ResolvedEncoding {
    pub record: EncodingRecord,
    pub source: EncodingSource,
}

type Slot = Arc<Mutex<Option<EncodingRecord>>>;

/// Encoding metadata registry
///
/// Constructed once per process and shared by `Arc`. Each (table, variant)
/// key has its own async lock so concurrent jobs on different tables never
/// wait on each other.
pub struct EncodingRegistry {
    store: Arc<dyn EncodingStore>,
    default_charset: Charset,
    default_bom: bool,
    slots: parking_lot::Mutex<HashMap<(String, String), Slot>>,
}

impl EncodingRegistry {
    /// Creates a registry over a store with the fallback encoding
    pub fn new(store: Arc<dyn EncodingStore>, default_charset: Charset, default_bom: bool) -> Self {
        Self {
            store,
            default_charset,
            default_bom,
            slots: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, table: &TableName, variant: &str) -> Slot {
        self.slots
            .lock()
            .entry((table.as_str().to_string(), variant.to_string()))
            .or_default()
            .clone()
    }

    /// Stored record for a key, loading it on first use
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store fails.
    pub async fn stored(
        &self,
        table: &TableName,
        variant: Option<&Variant>,
    ) -> Result<Option<EncodingRecord>> {
        let key = Variant::key_of(variant);
        let slot = self.slot(table, key);
        let mut cached = slot.lock().await;
        if cached.is_none() {
            *cached = self.store.load(table, key).await?;
        }
        Ok(cached.clone())
    }

    /// Resolves the encoding for an export
    ///
    /// Stored metadata wins, then detection over the previous output file,
    /// then the configured default.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store fails.
    pub async fn resolve(
        &self,
        table: &TableName,
        variant: Option<&Variant>,
        prior_artifact: Option<&Path>,
    ) -> Result<ResolvedEncoding> {
        if let Some(record) = self.stored(table, variant).await? {
            return Ok(ResolvedEncoding {
                record,
                source: EncodingSource::Stored,
            });
        }

        let key = Variant::key_of(variant);
        if let Some(path) = prior_artifact {
            match tokio::fs::read(path).await {
                Ok(bytes) if !bytes.is_empty() => {
                    let detection = detect(&bytes);
                    tracing::debug!(
                        table = %table,
                        path = %path.display(),
                        charset = %detection.charset,
                        confidence = detection.confidence,
                        "Encoding taken from previous output"
                    );
                    return Ok(ResolvedEncoding {
                        record: EncodingRecord::from_detection(table.clone(), key, &detection),
                        source: EncodingSource::PriorArtifact,
                    });
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Cannot read previous output"
                    );
                }
            }
        }

        Ok(ResolvedEncoding {
            record: EncodingRecord::new(table.clone(), key, self.default_charset, self.default_bom),
            source: EncodingSource::Default,
        })
    }

    /// Persists a record and refreshes the cache
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store fails; the cache is left as it was.
    pub async fn record(&self, record: EncodingRecord) -> Result<()> {
        let slot = self.slot(&record.table, &record.variant);
        let mut cached = slot.lock().await;
        self.store.save(&record).await?;
        tracing::info!(
            table = %record.table,
            variant = %record.variant,
            charset = %record.charset,
            has_bom = record.has_bom,
            confidence = record.confidence,
            "Encoding metadata recorded"
        );
        *cached = Some(record);
        Ok(())
    }

    /// Drops cached entries for one table, or all of them
    pub fn invalidate(&self, table: Option<&TableName>) {
        let mut slots = self.slots.lock();
        match table {
            Some(table) => slots.retain(|(name, _), _| name != table.as_str()),
            None => slots.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::core::encoding::record::encode_document;

    fn item() -> TableName {
        TableName::new("item").unwrap()
    }

    fn registry(store: Arc<MemoryStore>) -> EncodingRegistry {
        EncodingRegistry::new(store, Charset::Utf16Le, true)
    }

    #[tokio::test]
    async fn test_default_when_nothing_known() {
        let registry = registry(Arc::new(MemoryStore::new()));
        let resolved = registry.resolve(&item(), None, None).await.unwrap();
        assert_eq!(resolved.source, EncodingSource::Default);
        assert_eq!(resolved.record.charset, Charset::Utf16Le);
        assert!(resolved.record.has_bom);
        assert_eq!(resolved.record.variant, "default");
    }

    #[tokio::test]
    async fn test_stored_record_wins() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(store.clone());
        let variant = Variant::new("210010000").unwrap();
        let record = EncodingRecord::new(item(), "210010000", Charset::Utf8, false);
        registry.record(record.clone()).await.unwrap();

        let resolved = registry.resolve(&item(), Some(&variant), None).await.unwrap();
        assert_eq!(resolved.source, EncodingSource::Stored);
        assert_eq!(resolved.record, record);

        // other variants are independent
        let other = registry.resolve(&item(), None, None).await.unwrap();
        assert_eq!(other.source, EncodingSource::Default);
    }

    #[tokio::test]
    async fn test_prior_artifact_detection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item.xml");
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-16\"?><items/>";
        let bytes = encode_document(xml, Charset::Utf16Be, true).unwrap();
        std::fs::write(&path, bytes).unwrap();

        let registry = registry(Arc::new(MemoryStore::new()));
        let resolved = registry.resolve(&item(), None, Some(&path)).await.unwrap();
        assert_eq!(resolved.source, EncodingSource::PriorArtifact);
        assert_eq!(resolved.record.charset, Charset::Utf16Be);
        assert!(resolved.record.has_bom);

        let missing = dir.path().join("absent.xml");
        let resolved = registry.resolve(&item(), None, Some(&missing)).await.unwrap();
        assert_eq!(resolved.source, EncodingSource::Default);
    }

    #[tokio::test]
    async fn test_invalidate_reloads_from_store() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(store.clone());
        assert!(registry.stored(&item(), None).await.unwrap().is_none());

        store
            .save(&EncodingRecord::new(item(), "default", Charset::Utf8, true))
            .await
            .unwrap();
        registry.invalidate(Some(&item()));

        let stored = registry.stored(&item(), None).await.unwrap().unwrap();
        assert_eq!(stored.charset, Charset::Utf8);
    }
}

//! Shared fixtures for the integration tests

#![allow(dead_code)]

use arbor::adapters::database::Stores;
use arbor::adapters::memory::{MemoryColumn, MemoryStore};
use arbor::config::{load_config_str, ArborConfig};
use arbor::core::export::{ExportCoordinator, ExportJob, ExportSummary};
use arbor::core::import::{ImportCoordinator, ImportJob, ImportSummary};
use arbor::core::services::Services;
use arbor::domain::Row;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

pub const ITEM_SCHEMA: &str = r#"
table_name = "item"
root_tag = "items"
root_attr = "version=1"
item_tag = "item"
sql = "SELECT * FROM item ORDER BY id"

[[list]]
table = "item_tag"
tag = "tag"
association = "id>item_id"
path = "tags"
sql = "SELECT * FROM item_tag ORDER BY seq"
"#;

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub store: Arc<MemoryStore>,
    pub services: Services,
}

impl Fixture {
    /// Fixture with the `item`/`item_tag` tree and empty tables
    pub fn new() -> Self {
        Self::build(None, |_| {})
    }

    /// Fixture with a compliance rules file and a config hook
    pub fn build(rules: Option<&str>, adjust: impl FnOnce(&mut ArborConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let schemas = dir.path().join("schemas");
        std::fs::create_dir_all(&schemas).unwrap();
        std::fs::write(schemas.join("item.toml"), ITEM_SCHEMA).unwrap();

        let store = Arc::new(MemoryStore::new());
        store.create_table(
            "item",
            vec![
                MemoryColumn::text("name"),
                MemoryColumn::text("id"),
                MemoryColumn::text("price"),
                MemoryColumn::varchar("note", 64),
                MemoryColumn::text("secret"),
            ],
        );
        store.create_text_table("item_tag", &["item_id", "seq", "value"]);

        let mut config = load_config_str("database_target = \"memory\"").unwrap();
        config.schema.config_dir = schemas.to_string_lossy().to_string();
        config.export.output_dir = dir.path().join("out").to_string_lossy().to_string();
        config.compliance.rules_path = rules.map(|contents| {
            let path = dir.path().join("compliance.toml");
            std::fs::write(&path, contents).unwrap();
            path.to_string_lossy().to_string()
        });
        adjust(&mut config);

        let services = Services::with_stores(config, Stores::in_memory(store.clone())).unwrap();
        Self { dir, store, services }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub async fn export(&self, job: ExportJob) -> ExportSummary {
        let (_tx, rx) = watch::channel(false);
        ExportCoordinator::new(&self.services, rx).run(job).await
    }

    pub async fn render(&self) -> Vec<u8> {
        let (_tx, rx) = watch::channel(false);
        ExportCoordinator::new(&self.services, rx)
            .render(&ExportJob::new("item"))
            .await
            .unwrap()
    }

    pub async fn import(&self, input: &Path) -> ImportSummary {
        self.import_job(ImportJob::new("item", input)).await
    }

    pub async fn import_job(&self, job: ImportJob) -> ImportSummary {
        let (_tx, rx) = watch::channel(false);
        ImportCoordinator::new(&self.services, rx).run(job).await
    }
}

pub fn row(pairs: &[(&str, Option<&str>)]) -> Row {
    Row::from_pairs(pairs.iter().map(|(k, v)| (*k, v.map(str::to_string))))
}

/// Three items, one with a NULL price and an empty note, and three tags
pub fn seed_items(store: &MemoryStore) {
    store
        .seed_rows(
            "item",
            vec![
                row(&[
                    ("name", Some("Sword")),
                    ("id", Some("1")),
                    ("price", Some("100")),
                    ("note", Some("sharp")),
                    ("secret", Some("s1")),
                ]),
                row(&[
                    ("name", Some("Shield")),
                    ("id", Some("2")),
                    ("price", None),
                    ("note", Some("")),
                    ("secret", Some("s2")),
                ]),
                row(&[
                    ("name", Some("Bow")),
                    ("id", Some("3")),
                    ("price", Some("75")),
                    ("note", None),
                    ("secret", None),
                ]),
            ],
        )
        .unwrap();
    store
        .seed_rows(
            "item_tag",
            vec![
                row(&[("item_id", Some("1")), ("seq", Some("1")), ("value", Some("melee"))]),
                row(&[("item_id", Some("1")), ("seq", Some("2")), ("value", Some("steel"))]),
                row(&[("item_id", Some("3")), ("seq", Some("3")), ("value", Some("ranged"))]),
            ],
        )
        .unwrap();
}

/// Decodes and parses exported bytes
pub fn parse(bytes: &[u8]) -> arbor::domain::XmlElement {
    let detection = arbor::core::encoding::detect(bytes);
    let text = arbor::core::encoding::decode(bytes, &detection).unwrap();
    arbor::domain::document::parse_document(&text).unwrap()
}

//! External system integrations for Arbor.
//!
//! This module provides adapters for the stores the pipelines talk to:
//!
//! - [`database`] - Store traits and the configuration-driven factory
//! - [`postgresql`] - PostgreSQL implementation
//! - [`memory`] - In-memory implementation for tests and dry runs
//! - [`file`] - JSON file encoding metadata store
//!
//! # Design Pattern
//!
//! Adapters isolate driver types behind the traits in [`database`], so the
//! pipelines can be exercised against [`memory::MemoryStore`]:
//!
//! ```rust
//! use arbor::adapters::database::RelationalStore;
//! use arbor::adapters::memory::MemoryStore;
//! use arbor::domain::Row;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! store.create_text_table("item", &["id", "name"]);
//! store.seed_rows("item", vec![Row::from_pairs([("id", Some("1".to_string()))])])?;
//!
//! assert_eq!(store.count_rows("SELECT * FROM item").await?, 1);
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod file;
pub mod memory;
pub mod postgresql;

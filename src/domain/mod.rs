//! Domain models and types for Arbor.
//!
//! This module contains the types both pipeline directions share. Nothing in
//! here performs I/O against a store.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Validated identifiers** ([`TableName`], [`Variant`])
//! - **Relational rows** ([`Row`], [`RowBatch`]) and materialized records ([`Record`])
//! - **The XML element tree** ([`XmlElement`])
//! - **Error types** ([`ArborError`], [`ConfigError`], [`ParseError`], [`StoreError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, ArborError>`]:
//!
//! ```rust
//! use arbor::domain::{Result, TableName};
//!
//! fn example() -> Result<()> {
//!     let schema = arbor::schema::SchemaNode::from_toml_str(
//!         "table_name = \"item\"\nroot_tag = \"items\"\nsql = \"SELECT * FROM item\"",
//!     )?;
//!     assert_eq!(schema.table, TableName::new("item").unwrap());
//!     Ok(())
//! }
//! # example().unwrap();
//! ```

pub mod context;
pub mod document;
pub mod errors;
pub mod ids;
pub mod result;
pub mod row;

// Re-export commonly used types for convenience
pub use document::XmlElement;
pub use errors::{
    ArborError, ConfigError, ParseError, Severity, StoreError, ValidationFailure, ValidationIssue,
};
pub use ids::{TableName, Variant};
pub use result::Result;
pub use row::{Record, RecordNode, Row, RowBatch};

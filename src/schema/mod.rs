//! Schema model: how one root table and its child tables map onto a document
//!
//! A schema is loaded from a per-table artifact (see [`SchemaArtifact`]) and
//! shared immutably through an `Arc` for the duration of a job.
//!
//! # Example
//!
//! ```rust
//! use arbor::schema::{all_table_names, SchemaNode};
//!
//! let schema = SchemaNode::from_toml_str(r#"
//! table_name = "item"
//! root_tag = "items"
//! item_tag = "item"
//! sql = "SELECT * FROM item"
//!
//! [[list]]
//! table = "item_tag"
//! tag = "tag"
//! association = "id>item_id"
//! "#).unwrap();
//!
//! assert_eq!(all_table_names(&schema).len(), 2);
//! ```

pub mod artifact;
pub mod catalog;
pub mod node;

pub use artifact::{MappingArtifact, SchemaArtifact};
pub use catalog::SchemaCatalog;
pub use node::{all_table_names, Association, FieldMapping, SchemaNode};

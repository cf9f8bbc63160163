// Arbor - Relational tables to nested XML and back
// Copyright (c) 2025 Arbor Contributors
// Licensed under the MIT License

//! # Arbor - relational tables to nested XML and back
//!
//! Arbor exports a tree of relational tables into a single nested XML
//! document and imports such a document back into the tables, driven by a
//! declarative schema artifact per root table.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Exporting** a root table and its child tables page by page, concurrently,
//!   into one well-formed document
//! - **Importing** a document transactionally: every table of the tree is
//!   replaced or none is
//! - **Preserving encodings**: the charset and BOM detected on import are
//!   reused on the next export
//! - **Filtering** fields through a blacklist and value corrections
//! - **Comparing** documents for round-trip equivalence
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Pipelines, state machine, registries, verification
//! - [`schema`] - Schema artifacts and the resolved schema tree
//! - [`adapters`] - Relational stores (PostgreSQL, in-memory) and file storage
//! - [`domain`] - Rows, XML elements, identifiers and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use arbor::config::load_config;
//! use arbor::core::import::{ImportCoordinator, ImportJob};
//! use arbor::core::services::Services;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("arbor.toml")?;
//!     let services = Services::connect(config).await?;
//!
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     let summary = ImportCoordinator::new(&services, shutdown_rx)
//!         .run(ImportJob::new("item", "items.xml"))
//!         .await;
//!
//!     println!("Imported {} rows", summary.total_rows());
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Arbor uses the [`domain::ArborError`] type for all errors:
//!
//! ```rust,no_run
//! use arbor::domain::ArborError;
//!
//! fn example() -> Result<(), ArborError> {
//!     let config = arbor::config::load_config("arbor.toml")?;
//!     println!("{}", config.schema.config_dir);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
pub mod schema;

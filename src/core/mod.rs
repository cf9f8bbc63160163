//! Core business logic for Arbor.
//!
//! # Modules
//!
//! - [`export`] - Paginated, concurrent table-to-document export
//! - [`import`] - Transactional document-to-table import
//! - [`state`] - Import state machine
//! - [`registry`] - Field order cache and compliance rules
//! - [`compliance`] - Blacklist and correction filter
//! - [`encoding`] - Charset detection, encoding metadata and re-encoding
//! - [`verification`] - Round-trip comparison and checksums
//! - [`locks`] - Per-table read/write locks
//! - [`services`] - Shared registries and stores of one process
//!
//! # Example
//!
//! ```rust,no_run
//! use arbor::config::load_config;
//! use arbor::core::export::{ExportCoordinator, ExportJob};
//! use arbor::core::services::Services;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("arbor.toml")?;
//! let services = Services::connect(config).await?;
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let coordinator = ExportCoordinator::new(&services, shutdown_rx);
//!
//! let summary = coordinator.run(ExportJob::new("item")).await;
//! println!("Rows: {}", summary.total_rows());
//! # Ok(())
//! # }
//! ```

pub mod compliance;
pub mod encoding;
pub mod export;
pub mod import;
pub mod locks;
pub mod registry;
pub mod services;
pub mod state;
pub mod verification;

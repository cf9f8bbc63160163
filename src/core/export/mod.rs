//! Export pipeline: relational rows to a nested XML document
//!
//! - [`builder`] - record materialization and rendering
//! - [`page`] - one page of root rows, written to a scratch fragment
//! - [`coordinator`] - planning, concurrent pages, merge and atomic write
//! - [`summary`] - counts, encoding, checksum and failure of a job

pub mod builder;
pub mod coordinator;
pub mod page;
pub mod summary;

pub use builder::{Prefetch, RecordBuilder, RenderOptions, SourceRow};
pub use coordinator::{ExportCoordinator, ExportJob};
pub use summary::ExportSummary;

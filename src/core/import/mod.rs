//! Import pipeline: a nested XML document back into relational rows
//!
//! - [`walker`] - document elements to per-table rows
//! - [`validate`] - column and value checks before any write
//! - [`coordinator`] - state machine, locking and the write transaction
//! - [`summary`] - final state, counts and bounded issue lists

pub mod coordinator;
pub mod summary;
pub mod validate;
pub mod walker;

pub use coordinator::{ImportCoordinator, ImportJob};
pub use summary::ImportSummary;
pub use walker::{DocumentWalker, WalkOptions, WalkOutcome};

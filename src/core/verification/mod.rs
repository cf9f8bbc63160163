//! Round-trip verification
//!
//! Compares an original document with its regenerated counterpart and
//! checksums written output. Results are advisory: they are logged and
//! attached to job summaries, never used to fail a job.

pub mod checksum;
pub mod report;
pub mod verify;

pub use checksum::calculate_checksum_bytes;
pub use report::{ComparisonReport, ValueDiff};
pub use verify::{compare, compare_documents};

//! Export summary and reporting
//!
//! This module defines structures for tracking and reporting export results.

use crate::core::compliance::FilterTotals;
use crate::core::encoding::{EncodingRecord, EncodingSource};
use crate::core::verification::ComparisonReport;
use crate::domain::errors::ArborError;
use crate::domain::ids::Variant;
use indexmap::IndexMap;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Summary of an export operation
#[derive(Debug)]
pub struct ExportSummary {
    /// Job identifier, also used in log fields
    pub job_id: Uuid,

    /// Schema identifier of the exported root table
    pub table: String,

    /// Variant substituted into the queries
    pub variant: Option<Variant>,

    /// Root rows reported by the count query
    pub root_rows: u64,

    /// Pages planned
    pub pages_total: u64,

    /// Pages finished before the job ended
    pub pages_completed: u64,

    /// Rows written per table, in tree order
    pub rows_per_table: IndexMap<String, usize>,

    /// Fields removed and values corrected by the compliance filter
    pub filtered: FilterTotals,

    /// Encoding the document was written with, and where it came from
    pub encoding: Option<(EncodingRecord, EncodingSource)>,

    /// Final document path (only set once the file is in place)
    pub output_path: Option<PathBuf>,

    /// Size of the encoded document
    pub bytes_written: usize,

    /// SHA-256 of the written bytes
    pub checksum: Option<String>,

    /// Duration of the export
    pub duration: Duration,

    /// The error that stopped the job
    pub failure: Option<ArborError>,

    /// Comparison against a reference document, when one was requested
    pub comparison: Option<ComparisonReport>,
}

impl ExportSummary {
    /// Create a new empty export summary
    pub fn new(job_id: Uuid, table: impl Into<String>, variant: Option<Variant>) -> Self {
        Self {
            job_id,
            table: table.into(),
            variant,
            root_rows: 0,
            pages_total: 0,
            pages_completed: 0,
            rows_per_table: IndexMap::new(),
            filtered: FilterTotals::default(),
            encoding: None,
            output_path: None,
            bytes_written: 0,
            checksum: None,
            duration: Duration::from_secs(0),
            failure: None,
            comparison: None,
        }
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Adds per-table row counts
    pub fn add_rows(&mut self, rows: &IndexMap<String, usize>) {
        for (table, count) in rows {
            *self.rows_per_table.entry(table.clone()).or_default() += count;
        }
    }

    /// Adds filter totals
    pub fn add_filtered(&mut self, totals: FilterTotals) {
        self.filtered.removed += totals.removed;
        self.filtered.corrected += totals.corrected;
    }

    /// Total rows written across all tables
    pub fn total_rows(&self) -> usize {
        self.rows_per_table.values().sum()
    }

    /// Check if the export was successful
    pub fn is_successful(&self) -> bool {
        self.failure.is_none()
    }

    /// Whether a shutdown signal stopped the job
    pub fn interrupted(&self) -> bool {
        matches!(self.failure.as_ref().map(ArborError::root), Some(ArborError::Cancelled))
    }

    /// Whether an attached comparison found divergences
    pub fn diverged(&self) -> bool {
        self.comparison.as_ref().is_some_and(|c| !c.matched())
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            job_id = %self.job_id,
            table = %self.table,
            root_rows = self.root_rows,
            total_rows = self.total_rows(),
            pages = self.pages_completed,
            pages_total = self.pages_total,
            removed = self.filtered.removed,
            corrected = self.filtered.corrected,
            bytes = self.bytes_written,
            duration_secs = self.duration.as_secs(),
            "Export finished"
        );

        if let Some((record, source)) = &self.encoding {
            tracing::info!(
                charset = %record.charset,
                has_bom = record.has_bom,
                source = ?source,
                "Export encoding"
            );
        }

        if let Some(error) = &self.failure {
            tracing::warn!(
                error = %error,
                kind = error.kind(),
                "Export failed; no document was written"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> ExportSummary {
        ExportSummary::new(Uuid::new_v4(), "item", None)
    }

    #[test]
    fn test_export_summary_creation() {
        let summary = summary();
        assert_eq!(summary.total_rows(), 0);
        assert_eq!(summary.duration, Duration::from_secs(0));
        assert!(summary.is_successful());
        assert!(!summary.interrupted());
    }

    #[test]
    fn test_export_summary_with_duration() {
        let summary = summary().with_duration(Duration::from_secs(120));
        assert_eq!(summary.duration, Duration::from_secs(120));
    }

    #[test]
    fn test_rows_accumulate_in_first_seen_order() {
        let mut summary = summary();
        let mut page = IndexMap::new();
        page.insert("item".to_string(), 2);
        page.insert("item_tag".to_string(), 5);
        summary.add_rows(&page);
        summary.add_rows(&page);

        assert_eq!(summary.total_rows(), 14);
        let tables: Vec<_> = summary.rows_per_table.keys().cloned().collect();
        assert_eq!(tables, vec!["item", "item_tag"]);
    }

    #[test]
    fn test_cancellation_is_interruption() {
        let mut summary = summary();
        summary.failure = Some(ArborError::Context {
            context: "Page 3".to_string(),
            source: Box::new(ArborError::Cancelled),
        });
        assert!(!summary.is_successful());
        assert!(summary.interrupted());
    }
}

//! Import summary and reporting

use crate::core::encoding::EncodingRecord;
use crate::core::state::{ImportState, StateTracker};
use crate::core::verification::ComparisonReport;
use crate::domain::errors::{ArborError, ValidationIssue};
use crate::domain::ids::Variant;
use indexmap::IndexMap;
use std::time::Duration;
use uuid::Uuid;

/// Summary of an import operation
#[derive(Debug)]
pub struct ImportSummary {
    pub job_id: Uuid,

    /// Schema identifier of the imported root table
    pub table: String,

    pub variant: Option<Variant>,

    /// State machine position and history
    pub tracker: StateTracker,

    /// Validation only; nothing was written
    pub dry_run: bool,

    /// Rows inserted per table (rows that would be, on a dry run)
    pub rows_per_table: IndexMap<String, usize>,

    /// Rows deleted before the insert
    pub rows_deleted: u64,

    /// Blacklisted fields dropped during the walk
    pub dropped_fields: usize,

    /// Columns widened before the transaction
    pub widened_columns: usize,

    /// First N warnings
    pub warnings: Vec<ValidationIssue>,

    /// First N blocking issues
    pub errors: Vec<ValidationIssue>,

    /// Issues beyond the reporting bound
    pub suppressed: usize,

    /// Encoding detected in the input document
    pub encoding: Option<EncodingRecord>,

    /// Round-trip comparison against a fresh export
    pub comparison: Option<ComparisonReport>,

    pub duration: Duration,

    /// The error that stopped the job, cause preserved
    pub failure: Option<ArborError>,

    max_reported: usize,
}

impl ImportSummary {
    pub fn new(
        job_id: Uuid,
        table: impl Into<String>,
        variant: Option<Variant>,
        max_reported: usize,
    ) -> Self {
        Self {
            job_id,
            table: table.into(),
            variant,
            tracker: StateTracker::new(),
            dry_run: false,
            rows_per_table: IndexMap::new(),
            rows_deleted: 0,
            dropped_fields: 0,
            widened_columns: 0,
            warnings: Vec::new(),
            errors: Vec::new(),
            suppressed: 0,
            encoding: None,
            comparison: None,
            duration: Duration::from_secs(0),
            failure: None,
            max_reported,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Current state
    pub fn state(&self) -> ImportState {
        self.tracker.state()
    }

    /// Records issues, keeping at most the configured number of each kind
    pub fn add_issues(&mut self, issues: impl IntoIterator<Item = ValidationIssue>) {
        for issue in issues {
            let bucket = if issue.is_blocking() {
                &mut self.errors
            } else {
                &mut self.warnings
            };
            if bucket.len() < self.max_reported {
                bucket.push(issue);
            } else {
                self.suppressed += 1;
            }
        }
    }

    /// Stops the job with `error`
    pub fn fail(&mut self, error: ArborError) {
        self.tracker.fail();
        self.failure = Some(error);
    }

    pub fn total_rows(&self) -> usize {
        self.rows_per_table.values().sum()
    }

    /// Committed, or a dry run that passed validation
    pub fn is_successful(&self) -> bool {
        self.failure.is_none() && self.state() == ImportState::Committed
    }

    /// Successful but with warnings or a diverging round trip
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty() || self.comparison.as_ref().is_some_and(|c| !c.matched())
    }

    pub fn interrupted(&self) -> bool {
        matches!(self.failure.as_ref().map(ArborError::root), Some(ArborError::Cancelled))
    }

    pub fn log_summary(&self) {
        tracing::info!(
            job_id = %self.job_id,
            table = %self.table,
            state = %self.state(),
            dry_run = self.dry_run,
            total_rows = self.total_rows(),
            deleted = self.rows_deleted,
            dropped_fields = self.dropped_fields,
            widened = self.widened_columns,
            warnings = self.warnings.len(),
            errors = self.errors.len(),
            suppressed = self.suppressed,
            duration_secs = self.duration.as_secs(),
            "Import finished"
        );

        for (table, count) in &self.rows_per_table {
            tracing::debug!(table = %table, rows = count, "Rows imported");
        }

        for issue in &self.errors {
            tracing::warn!(issue = %issue, "Validation error");
        }

        if let Some(error) = &self.failure {
            tracing::warn!(
                error = %error,
                kind = error.kind(),
                state = %self.state(),
                "Import failed; store left unchanged"
            );
        }
    }
}

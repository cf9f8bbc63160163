//! Compliance filter
//!
//! On export, rows pass through the blacklist and correction rules before
//! they are materialized; every removal and rewrite is listed per row so it
//! can be audited. On import only validation rules run, and they only warn.

use crate::core::registry::FieldRegistry;
use crate::domain::errors::ValidationIssue;
use crate::domain::row::Row;
use std::sync::Arc;

/// Outcome of filtering one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterResult {
    /// The row after blacklist and corrections
    pub row: Row,

    /// Blacklisted fields that were dropped
    pub removed: Vec<String>,

    /// Fields whose value a correction rule changed
    pub corrected: Vec<String>,
}

impl FilterResult {
    /// Whether the row left the filter unchanged
    pub fn is_untouched(&self) -> bool {
        self.removed.is_empty() && self.corrected.is_empty()
    }
}

/// Counts of what a filter pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterTotals {
    pub removed: usize,
    pub corrected: usize,
}

impl FilterTotals {
    /// Totals over a batch of results
    pub fn of(results: &[FilterResult]) -> Self {
        results.iter().fold(Self::default(), |acc, r| Self {
            removed: acc.removed + r.removed.len(),
            corrected: acc.corrected + r.corrected.len(),
        })
    }
}

/// Export-time blacklist and correction, import-time validation
#[derive(Clone)]
pub struct ComplianceFilter {
    registry: Arc<FieldRegistry>,
    enabled: bool,
}

impl ComplianceFilter {
    /// Creates a filter over the registry's rules
    ///
    /// A disabled filter passes rows through untouched.
    pub fn new(registry: Arc<FieldRegistry>, enabled: bool) -> Self {
        Self { registry, enabled }
    }

    /// Whether rules are applied
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Filters one row
    pub fn filter_row(&self, table: &str, row: Row) -> FilterResult {
        if !self.enabled {
            return FilterResult {
                row,
                removed: Vec::new(),
                corrected: Vec::new(),
            };
        }

        let mut removed = Vec::new();
        let mut corrected = Vec::new();
        let mut filtered = Row::new();
        for (field, value) in row.iter() {
            if self.registry.should_filter(table, field) {
                removed.push(field.to_string());
                continue;
            }
            let value = value.map(|v| {
                let fixed = self.registry.correct(table, field, v);
                if fixed != v {
                    corrected.push(field.to_string());
                }
                fixed
            });
            filtered.insert(field, value);
        }

        FilterResult {
            row: filtered,
            removed,
            corrected,
        }
    }

    /// Filters a batch of rows from one table
    pub fn filter_batch(&self, table: &str, rows: Vec<Row>) -> Vec<FilterResult> {
        let results: Vec<FilterResult> = rows
            .into_iter()
            .map(|row| self.filter_row(table, row))
            .collect();
        let totals = FilterTotals::of(&results);
        if totals != FilterTotals::default() {
            tracing::debug!(
                table = table,
                rows = results.len(),
                removed = totals.removed,
                corrected = totals.corrected,
                "Compliance filter applied"
            );
        }
        results
    }

    /// Validation-only pass used on import
    ///
    /// Every issue has warning severity; `None` values are not checked.
    pub fn check_batch(&self, table: &str, rows: &[Row]) -> Vec<ValidationIssue> {
        if !self.enabled {
            return Vec::new();
        }
        rows.iter()
            .enumerate()
            .flat_map(|(index, row)| {
                row.iter().filter_map(move |(field, value)| {
                    let message = self.registry.validate_value(table, field, value?)?;
                    Some(
                        ValidationIssue::warning(table, message)
                            .with_field(field)
                            .with_row(index),
                    )
                })
            })
            .collect()
    }
}

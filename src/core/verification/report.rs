//! Comparison report structures
//!
//! This module defines the structures for reporting round-trip comparison results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A value that differs between the two documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueDiff {
    /// Element path, `@name` for attributes
    pub path: String,

    /// Value in the original (`None` = NULL)
    pub original: Option<String>,

    /// Value in the regenerated document (`None` = NULL)
    pub regenerated: Option<String>,
}

/// Structural comparison of an original and a regenerated document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// When the comparison was performed
    pub compared_at: DateTime<Utc>,

    /// Number of element pairs compared
    pub elements_compared: usize,

    /// Paths present only in the original
    pub missing: Vec<String>,

    /// Paths present only in the regenerated document
    pub extra: Vec<String>,

    /// Values that differ
    pub value_diffs: Vec<ValueDiff>,

    /// Values that differ only in surrounding whitespace
    pub textual_diffs: Vec<ValueDiff>,

    /// Duration of the comparison in milliseconds
    pub duration_ms: u64,
}

impl ComparisonReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self {
            compared_at: Utc::now(),
            elements_compared: 0,
            missing: Vec::new(),
            extra: Vec::new(),
            value_diffs: Vec::new(),
            textual_diffs: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Round-trip equivalence: nothing missing, extra or different
    ///
    /// Textual differences don't count.
    pub fn matched(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && self.value_diffs.is_empty()
    }

    /// Number of divergences, textual ones excluded
    pub fn divergence_count(&self) -> usize {
        self.missing.len() + self.extra.len() + self.value_diffs.len()
    }

    /// Set the duration of the comparison
    pub fn set_duration(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }

    /// Format the report as a human-readable string, listing up to `limit` entries per section
    pub fn format_summary(&self, limit: usize) -> String {
        let mut summary = String::new();
        summary.push_str("Round-trip comparison\n");
        summary.push_str(&format!("  Compared at: {}\n", self.compared_at));
        summary.push_str(&format!("  Duration: {} ms\n", self.duration_ms));
        summary.push_str(&format!("  Elements compared: {}\n", self.elements_compared));
        summary.push_str(&format!(
            "  Result: {}\n",
            if self.matched() { "MATCHED" } else { "DIVERGED" }
        ));
        summary.push_str(&format!("  Missing: {}\n", self.missing.len()));
        summary.push_str(&format!("  Extra: {}\n", self.extra.len()));
        summary.push_str(&format!("  Value differences: {}\n", self.value_diffs.len()));
        summary.push_str(&format!("  Whitespace-only differences: {}\n", self.textual_diffs.len()));

        let show = |title: &str, entries: Vec<String>, summary: &mut String| {
            if entries.is_empty() {
                return;
            }
            summary.push_str(&format!("\n{title}:\n"));
            for entry in entries.iter().take(limit) {
                summary.push_str(&format!("  - {entry}\n"));
            }
            if entries.len() > limit {
                summary.push_str(&format!("  ... and {} more\n", entries.len() - limit));
            }
        };
        let render = |diff: &ValueDiff| {
            format!(
                "{}: {} -> {}",
                diff.path,
                diff.original.as_deref().unwrap_or("NULL"),
                diff.regenerated.as_deref().unwrap_or("NULL")
            )
        };

        show("Missing", self.missing.clone(), &mut summary);
        show("Extra", self.extra.clone(), &mut summary);
        show("Value differences", self.value_diffs.iter().map(render).collect(), &mut summary);
        summary
    }
}

impl Default for ComparisonReport {
    fn default() -> Self {
        Self::new()
    }
}

//! Domain error types
//!
//! This module defines the error hierarchy for Arbor. All errors are
//! domain-specific and don't expose third-party types.

use std::fmt;
use thiserror::Error;

/// Main Arbor error type
///
/// This is the primary error type used throughout the application.
/// It wraps the specific error families and provides context for error handling.
#[derive(Debug, Error)]
pub enum ArborError {
    /// Schema artifact or application configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed document or encoding mismatch
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Blocking validation problems, aggregated across a whole batch
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationFailure),

    /// Relational store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Export process errors
    #[error("Export error: {0}")]
    Export(String),

    /// The job was aborted by a shutdown signal
    #[error("Operation cancelled")]
    Cancelled,

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// An error wrapped with the operation that produced it
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ArborError>,
    },
}

impl ArborError {
    /// Short category name used in summaries and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ArborError::Config(_) => "config",
            ArborError::Parse(_) => "parse",
            ArborError::Validation(_) => "validation",
            ArborError::Store(_) => "store",
            ArborError::Export(_) => "export",
            ArborError::Cancelled => "cancelled",
            ArborError::Serialization(_) => "serialization",
            ArborError::Io(_) => "io",
            ArborError::Context { source, .. } => source.kind(),
        }
    }

    /// Innermost error, with every layer of context removed
    pub fn root(&self) -> &ArborError {
        match self {
            ArborError::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Schema artifact and configuration errors
///
/// These are fatal and abort a job before any I/O against the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No configuration resolves for the identifier
    #[error("No configuration found for '{0}'")]
    Missing(String),

    /// Required fields are absent or inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The artifact could not be parsed
    #[error("Unreadable configuration: {0}")]
    Unreadable(String),
}

/// Document parsing errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// XML is not well formed
    #[error("Malformed document at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    /// Bytes cannot be decoded with the detected or declared charset
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The document contains no root element
    #[error("Document is empty")]
    Empty,

    /// Root element does not match the schema's root tag
    #[error("Unexpected root element '{found}', expected '{expected}'")]
    UnexpectedRoot { expected: String, found: String },
}

/// Relational store errors
///
/// These don't expose driver types; messages carry the driver's text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Failed to connect or to obtain a pooled connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A row violated a store constraint
    #[error("Constraint violation on {table}: {message}")]
    ConstraintViolation { table: String, message: String },

    /// A value exceeded the column width mid-batch
    #[error("Value too long for {table}.{column} (capacity {capacity}, got {length})")]
    ColumnTooNarrow {
        table: String,
        column: String,
        capacity: usize,
        length: usize,
    },

    /// Unknown table referenced by a job
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Transaction control (begin/commit/rollback) failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}

/// Severity of a validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Blocks the transaction
    Error,
    /// Logged and surfaced, never blocks
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Blocking or advisory
    pub severity: Severity,

    /// Table the issue was found in
    pub table: String,

    /// Field the issue concerns, if any
    pub field: Option<String>,

    /// Row position within the table's batch, if any
    pub row: Option<usize>,

    /// Human-readable description
    pub message: String,
}

impl ValidationIssue {
    /// Creates a blocking issue
    pub fn error(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            table: table.into(),
            field: None,
            row: None,
            message: message.into(),
        }
    }

    /// Creates an advisory issue
    pub fn warning(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            table: table.into(),
            field: None,
            row: None,
            message: message.into(),
        }
    }

    /// Sets the field
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Sets the row position
    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    /// Whether this issue blocks the transaction
    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.table)?;
        if let Some(row) = self.row {
            write!(f, "#{row}")?;
        }
        if let Some(field) = &self.field {
            write!(f, ".{field}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Aggregated blocking validation issues
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Every blocking issue found in the batch
    pub issues: Vec<ValidationIssue>,
}

impl ValidationFailure {
    /// Wraps a list of issues
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} blocking issue(s)", self.issues.len())?;
        if let Some(first) = self.issues.first() {
            write!(f, ", first: {first}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

// Conversion from std::io::Error
impl From<std::io::Error> for ArborError {
    fn from(err: std::io::Error) -> Self {
        ArborError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for ArborError {
    fn from(err: serde_json::Error) -> Self {
        ArborError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for ArborError {
    fn from(err: toml::de::Error) -> Self {
        ArborError::Config(ConfigError::Unreadable(format!("TOML parse error: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arbor_error_display() {
        let err = ArborError::Config(ConfigError::Missing("item".to_string()));
        assert_eq!(
            err.to_string(),
            "Configuration error: No configuration found for 'item'"
        );
    }

    #[test]
    fn test_store_error_conversion() {
        let store_err = StoreError::QueryFailed("syntax error".to_string());
        let arbor_err: ArborError = store_err.into();
        assert!(matches!(arbor_err, ArborError::Store(_)));
        assert_eq!(arbor_err.kind(), "store");
    }

    #[test]
    fn test_validation_issue_display() {
        let issue = ValidationIssue::error("item_tag", "missing association key")
            .with_field("item_id")
            .with_row(3);
        assert_eq!(
            issue.to_string(),
            "[error] item_tag#3.item_id: missing association key"
        );
        assert!(issue.is_blocking());
    }

    #[test]
    fn test_validation_failure_display() {
        let failure = ValidationFailure::new(vec![
            ValidationIssue::error("item", "first"),
            ValidationIssue::error("item", "second"),
        ]);
        let text = failure.to_string();
        assert!(text.starts_with("2 blocking issue(s)"));
        assert!(text.contains("first"));
    }

    #[test]
    fn test_warning_is_not_blocking() {
        let issue = ValidationIssue::warning("item", "price above typical range");
        assert!(!issue.is_blocking());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let arbor_err: ArborError = io_err.into();
        assert!(matches!(arbor_err, ArborError::Io(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let arbor_err: ArborError = toml_err.into();
        assert!(matches!(arbor_err, ArborError::Config(_)));
        assert!(arbor_err.to_string().contains("TOML parse error"));
    }
}

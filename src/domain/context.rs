//! Error context extension trait
//!
//! Adds `.context()` and `.with_context()` to any `Result` whose error
//! converts into [`ArborError`], keeping the typed error underneath so
//! callers can still match on [`ArborError::root`].
//!
//! # Examples
//!
//! ```rust
//! use arbor::domain::Result;
//! use arbor::domain::context::ResultExt;
//!
//! fn read_document(path: &str) -> Result<Vec<u8>> {
//!     std::fs::read(path).with_context(|| format!("Failed to read document: {path}"))
//! }
//! ```

use crate::domain::errors::ArborError;
use crate::domain::result::Result;

/// Extension trait for adding context to `Result` types
pub trait ResultExt<T> {
    /// Add context to an error (evaluated eagerly)
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static;

    /// Add context to an error, computing it only on failure
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<ArborError>,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| ArborError::Context {
            context: context.to_string(),
            source: Box::new(e.into()),
        })
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| ArborError::Context {
            context: f().to_string(),
            source: Box::new(e.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{ParseError, StoreError};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_context_wraps_message() {
        let result: Result<()> = Err(StoreError::QueryFailed("syntax error".to_string()).into());
        let err = result.context("Failed to fetch page 3").unwrap_err();

        let msg = err.to_string();
        assert!(msg.starts_with("Failed to fetch page 3"));
        assert!(msg.contains("syntax error"));
        assert_eq!(err.kind(), "store");
        assert!(matches!(err.root(), ArborError::Store(_)));
    }

    #[test]
    fn test_with_context_is_lazy() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();

        let result: Result<i32> = Ok(7);
        let value = result.with_context(|| {
            flag.store(true, Ordering::SeqCst);
            "never"
        });

        assert_eq!(value.unwrap(), 7);
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_context_chaining_keeps_root() {
        let result: std::result::Result<(), ParseError> = Err(ParseError::Empty);
        let err = result
            .context("Failed to parse document")
            .context("Import of item failed")
            .unwrap_err();

        assert!(matches!(err.root(), ArborError::Parse(ParseError::Empty)));
        let msg = err.to_string();
        assert!(msg.contains("Import of item failed"));
        assert!(msg.contains("Failed to parse document"));
        assert!(msg.contains("Document is empty"));
    }

    #[test]
    fn test_context_from_io_error() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = result.context("Failed to write output").unwrap_err();
        assert_eq!(err.kind(), "io");
    }
}

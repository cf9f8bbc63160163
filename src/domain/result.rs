//! Result type alias for Arbor
//!
//! This module provides a convenient Result type alias that uses ArborError
//! as the error type.

use super::errors::ArborError;

/// Result type alias for Arbor operations
///
/// # Examples
///
/// ```
/// use arbor::domain::result::Result;
/// use arbor::domain::errors::{ArborError, ConfigError};
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(ArborError::Config(ConfigError::Invalid("root_tag missing".to_string())))
/// }
/// ```
pub type Result<T> = std::result::Result<T, ArborError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ArborError;

    #[test]
    fn test_result_err() {
        let result: Result<i32> = Err(ArborError::Cancelled);
        assert!(result.is_err());
    }

    #[test]
    fn test_result_with_question_mark() -> Result<()> {
        fn inner() -> Result<i32> {
            Ok(42)
        }

        let value = inner()?;
        assert_eq!(value, 42);
        Ok(())
    }
}

//! Logging and observability
//!
//! Structured `tracing` logging: console output plus an optional rolling JSON
//! file. The macros below keep the field names of recurring pipeline events
//! consistent across export and import.
//!
//! # Example
//!
//! ```no_run
//! use arbor::logging::init_logging;
//! use arbor::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(table = "item", "Application started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a pipeline job
///
/// # Example
///
/// ```
/// use arbor::log_job_start;
///
/// let job_id = "5f0c";
/// log_job_start!(job_id, "item", "export");
/// ```
#[macro_export]
macro_rules! log_job_start {
    ($job_id:expr, $table:expr, $direction:expr) => {
        tracing::info!(
            job_id = %$job_id,
            table = %$table,
            direction = $direction,
            "Starting job"
        );
    };
}

/// Log the completion of a pipeline job
///
/// # Example
///
/// ```
/// use arbor::log_job_complete;
/// use std::time::Duration;
///
/// log_job_complete!("5f0c", "item", 42, Duration::from_secs(3));
/// ```
#[macro_export]
macro_rules! log_job_complete {
    ($job_id:expr, $table:expr, $rows:expr, $duration:expr) => {
        tracing::info!(
            job_id = %$job_id,
            table = %$table,
            rows = $rows,
            duration_ms = $duration.as_millis() as u64,
            "Job completed"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```
/// use arbor::log_error_with_context;
/// use arbor::domain::ArborError;
///
/// let error = ArborError::Cancelled;
/// log_error_with_context!(&error, "Export of item aborted");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            kind = $error.kind(),
            context = $context,
            "Error occurred"
        );
    };
}

/// Log an insert batch
///
/// # Example
///
/// ```
/// use arbor::log_batch_processing;
///
/// log_batch_processing!("item_tag", 500, 1200);
/// ```
#[macro_export]
macro_rules! log_batch_processing {
    ($table:expr, $current:expr, $total:expr) => {
        tracing::debug!(
            table = %$table,
            current = $current,
            total = $total,
            progress_pct = (($current as f64 / ($total as f64).max(1.0)) * 100.0) as u64,
            "Processing batch"
        );
    };
}

/// Log export page progress
///
/// # Example
///
/// ```
/// use arbor::log_page_progress;
///
/// log_page_progress!("item", 3, 10);
/// ```
#[macro_export]
macro_rules! log_page_progress {
    ($table:expr, $done:expr, $total:expr) => {
        tracing::info!(
            table = %$table,
            pages_done = $done,
            pages_total = $total,
            progress_pct = (($done as f64 / ($total as f64).max(1.0)) * 100.0) as u64,
            "Export progress"
        );
    };
}

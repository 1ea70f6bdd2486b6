//! Retry utilities: backoff builders and retryable error classification.
//!
//! Uses `backon` for exponential backoff with jitter. Transient storage
//! failures are retried internally a bounded number of times before
//! surfacing; business-rule and validation failures never retry.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::interfaces::StorageError;

/// Standard backoff for transient storage failures.
///
/// - Min delay: 10ms
/// - Max delay: 500ms
/// - Jitter enabled
pub fn storage_backoff(max_attempts: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_millis(500))
        .with_max_times(max_attempts)
        .with_jitter()
}

/// Determines if a storage error is retryable.
///
/// Retryable:
/// - `Unavailable`: transient durability failure
/// - `Database`: connection/lock contention at the driver level
///
/// Non-retryable:
/// - `Corrupt` / `Serde`: a stored record is bad; retrying cannot help.
pub fn is_retryable(error: &StorageError) -> bool {
    match error {
        StorageError::Unavailable(_) => true,
        #[cfg(feature = "sqlite")]
        StorageError::Database(_) => true,
        StorageError::Corrupt(_) => false,
        StorageError::Serde(_) => false,
    }
}

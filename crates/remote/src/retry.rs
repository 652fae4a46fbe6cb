//! Retry logic with exponential backoff for transient remote errors.

use crate::error::{Error, Result};
use std::thread;
use std::time::Duration;

/// Backoff settings for one kind of remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a retry config with the default delay cap.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// The kind of remote call being made. Each kind gets its own retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Listing, lookups, downloads, quota
    Read,
    /// Folder creation, deletes, moves
    Mutate,
    /// Uploads (not idempotent, so retried sparingly)
    Upload,
}

/// Retry budgets per call kind.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Budget for [`CallKind::Read`]
    pub read: RetryConfig,
    /// Budget for [`CallKind::Mutate`]
    pub mutate: RetryConfig,
    /// Budget for [`CallKind::Upload`]
    pub upload: RetryConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            read: RetryConfig {
                max_attempts: 4,
                ..Default::default()
            },
            mutate: RetryConfig::default(),
            upload: RetryConfig {
                max_attempts: 2,
                ..Default::default()
            },
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt per call.
    pub fn no_retry() -> Self {
        Self {
            read: RetryConfig::no_retry(),
            mutate: RetryConfig::no_retry(),
            upload: RetryConfig::no_retry(),
        }
    }

    /// The same config for every call kind.
    pub fn uniform(config: RetryConfig) -> Self {
        Self {
            read: config.clone(),
            mutate: config.clone(),
            upload: config,
        }
    }

    /// Budget for a call kind.
    pub fn for_kind(&self, kind: CallKind) -> &RetryConfig {
        match kind {
            CallKind::Read => &self.read,
            CallKind::Mutate => &self.mutate,
            CallKind::Upload => &self.upload,
        }
    }
}

/// Callback trait for retry progress notifications.
pub trait RetryCallback {
    /// Called when an operation is being retried.
    ///
    /// # Arguments
    /// * `what` - Short description of the call (e.g. `list forex_raw`)
    /// * `attempt` - Current attempt number (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The error that triggered the retry
    /// * `delay` - Time until next attempt
    fn on_retry(&self, what: &str, attempt: u32, max_attempts: u32, error: &Error, delay: Duration);
}

/// Callback that reports retries through the `log` facade.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(
        &self,
        what: &str,
        attempt: u32,
        max_attempts: u32,
        error: &Error,
        delay: Duration,
    ) {
        log::warn!(
            "{} failed (attempt {}/{}): {}. Retrying in {:.1}s",
            what,
            attempt,
            max_attempts,
            error,
            delay.as_secs_f64()
        );
    }
}

/// Execute an operation with retry logic.
///
/// Retries the operation if it returns a retryable error, using exponential
/// backoff between attempts. Non-retryable errors are returned immediately.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    what: &str,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut last_error: Option<Error> = None;

    for attempt in 0..config.max_attempts {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() {
                    return Err(e);
                }

                if attempt + 1 >= config.max_attempts {
                    last_error = Some(e);
                    break;
                }

                let delay = config.delay_for_attempt(attempt);
                if let Some(cb) = callback {
                    cb.on_retry(what, attempt + 1, config.max_attempts, &e, delay);
                }

                thread::sleep(delay);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::Other(format!("{what}: retry exhausted"))))
}

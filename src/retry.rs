//! Retry decoration with pluggable callback hooks
//!
//! This module wraps fallible async operations in a bounded retry loop:
//!
//! - A [`RetryConfig`] declares which [`ErrorKind`]s are worth retrying, how
//!   many attempts are allowed and how long to wait between them
//! - A [`CallbackHandler`] observes every attempt outcome
//! - [`with_retry`] runs an operation under a config, and [`retry_handler`]
//!   packages the operation into a reusable [`Retrying`] value
//!
//! Attempts are strictly sequential: attempt N+1 never starts before attempt
//! N's outcome, including its callback, has been handled.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{ErrorKind, QaError, Result};

/// Configuration for a retried operation
///
/// # Examples
///
/// ```
/// use qakit::error::ErrorKind;
/// use qakit::retry::RetryConfig;
/// use std::time::Duration;
///
/// let config = RetryConfig::new([ErrorKind::Connect, ErrorKind::Ssh], 3, Duration::ZERO).unwrap();
/// assert_eq!(config.max_attempts(), 3);
///
/// // Zero attempts is rejected up front
/// assert!(RetryConfig::new([ErrorKind::Ssh], 0, Duration::ZERO).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    retryable_errors: HashSet<ErrorKind>,
    max_attempts: u32,
    interval: Duration,
}

impl RetryConfig {
    /// Builds a config, failing with a configuration error when `max_attempts` is zero
    pub fn new(
        retryable_errors: impl IntoIterator<Item = ErrorKind>,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<Self> {
        if max_attempts == 0 {
            return Err(QaError::config("max_attempts must be at least 1"));
        }

        Ok(Self {
            retryable_errors: retryable_errors.into_iter().collect(),
            max_attempts,
            interval,
        })
    }

    /// Same as [`RetryConfig::new`] with the interval given in (fractional) seconds
    pub fn with_interval_secs(
        retryable_errors: impl IntoIterator<Item = ErrorKind>,
        max_attempts: u32,
        interval_secs: f64,
    ) -> Result<Self> {
        Self::new(retryable_errors, max_attempts, interval_from_secs(interval_secs)?)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_retryable(&self, error: &QaError) -> bool {
        self.retryable_errors.contains(&error.kind())
    }

    /// Decides what happens after `attempt` (1-indexed) failed with `error`
    pub fn decide(&self, error: &QaError, attempt: u32) -> RetryDecision {
        if !self.is_retryable(error) {
            RetryDecision::Abort
        } else if attempt < self.max_attempts {
            RetryDecision::RetryAfter(self.interval)
        } else {
            RetryDecision::Exhausted
        }
    }
}

/// Converts a seconds value into a [`Duration`], rejecting negative and non-finite input
pub fn interval_from_secs(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(QaError::config(format!(
            "retry interval must be a non-negative number of seconds, got {}",
            secs
        )));
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Outcome of [`RetryConfig::decide`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Error kind is not retryable; surface it without notifying the callback
    Abort,
    /// Wait for the given interval, then try again
    RetryAfter(Duration),
    /// Attempt budget spent; surface the most recent error
    Exhausted,
}

/// Observer invoked after every attempt outcome
///
/// Both methods default to no-ops, so implementors only override what they
/// care about.
///
/// ```
/// use qakit::error::QaError;
/// use qakit::retry::CallbackHandler;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// #[derive(Default)]
/// struct FailureCounter(AtomicU32);
///
/// impl<T> CallbackHandler<T> for FailureCounter {
///     fn on_failure(&self, _error: &QaError) {
///         self.0.fetch_add(1, Ordering::SeqCst);
///     }
/// }
/// ```
pub trait CallbackHandler<T>: Send + Sync {
    /// Called once, with the result of the attempt that succeeded
    fn on_success(&self, result: &T) {
        let _ = result;
    }

    /// Called once per failed attempt whose error kind is retryable
    fn on_failure(&self, error: &QaError) {
        let _ = error;
    }
}

/// Callback that does nothing; the default for every decorated call
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallback;

impl<T> CallbackHandler<T> for NoopCallback {}

/// Callback that logs attempt outcomes through `tracing`
#[derive(Debug, Clone)]
pub struct TracingCallback {
    operation: String,
}

impl TracingCallback {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl<T> CallbackHandler<T> for TracingCallback {
    fn on_success(&self, _result: &T) {
        debug!(operation = %self.operation, "attempt succeeded");
    }

    fn on_failure(&self, error: &QaError) {
        warn!(operation = %self.operation, error = %error, "attempt failed");
    }
}

impl<T, C: CallbackHandler<T> + ?Sized> CallbackHandler<T> for Arc<C> {
    fn on_success(&self, result: &T) {
        (**self).on_success(result)
    }

    fn on_failure(&self, error: &QaError) {
        (**self).on_failure(error)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the attempt budget is spent
///
/// # Arguments
/// * `operation` - Produces a fresh future for every attempt
/// * `config` - Retryable kinds, attempt budget and interval
/// * `callback` - Notified after each attempt outcome
///
/// # Returns
/// * The first successful result, or the error of the last attempt made
///
/// # Examples
///
/// ```
/// use qakit::error::{ErrorKind, QaError};
/// use qakit::retry::{with_retry, NoopCallback, RetryConfig};
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// # async fn example() -> qakit::error::Result<()> {
/// let config = RetryConfig::new([ErrorKind::Ssh], 3, Duration::ZERO)?;
/// let calls = AtomicU32::new(0);
///
/// let value = with_retry(
///     || async {
///         if calls.fetch_add(1, Ordering::SeqCst) == 0 {
///             Err(QaError::Ssh("flaky".into()))
///         } else {
///             Ok(7)
///         }
///     },
///     &config,
///     &NoopCallback,
/// )
/// .await?;
///
/// assert_eq!(value, 7);
/// # Ok(())
/// # }
/// ```
pub async fn with_retry<F, Fut, T, C>(operation: F, config: &RetryConfig, callback: &C) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
    C: CallbackHandler<T> + ?Sized,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                callback.on_success(&value);
                return Ok(value);
            }
            Err(err) => {
                if !config.is_retryable(&err) {
                    debug!("Error kind {:?} is not retryable: {}", err.kind(), err);
                    return Err(err);
                }

                callback.on_failure(&err);
                attempt += 1;

                match config.decide(&err, attempt) {
                    RetryDecision::RetryAfter(delay) => {
                        debug!(
                            "Retry attempt {}/{} after {}ms delay: {}",
                            attempt,
                            config.max_attempts,
                            delay.as_millis(),
                            err
                        );
                        if !delay.is_zero() {
                            sleep(delay).await;
                        }
                    }
                    RetryDecision::Exhausted | RetryDecision::Abort => {
                        warn!("Giving up after {} attempts: {}", attempt, err);
                        return Err(err);
                    }
                }
            }
        }
    }
}

/// An operation bundled with its retry config and callback
///
/// `call()` has the same shape as the wrapped operation: no arguments, a
/// future resolving to `Result<T>`.
pub struct Retrying<F, T> {
    operation: F,
    config: RetryConfig,
    callback: Arc<dyn CallbackHandler<T>>,
}

impl<F, Fut, T> Retrying<F, T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    pub async fn call(&self) -> Result<T> {
        with_retry(&self.operation, &self.config, self.callback.as_ref()).await
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

/// Wraps `operation` so that every `call()` is retried per `config`
///
/// ```
/// use qakit::error::{ErrorKind, QaError};
/// use qakit::retry::{retry_handler, NoopCallback, RetryConfig};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> qakit::error::Result<()> {
/// let config = RetryConfig::new([ErrorKind::Connect], 2, Duration::ZERO)?;
/// let ping = retry_handler(config, Arc::new(NoopCallback), || async { Ok::<_, QaError>("pong") });
/// assert_eq!(ping.call().await?, "pong");
/// # Ok(())
/// # }
/// ```
pub fn retry_handler<F, Fut, T>(
    config: RetryConfig,
    callback: Arc<dyn CallbackHandler<T>>,
    operation: F,
) -> Retrying<F, T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    Retrying {
        operation,
        config,
        callback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide() {
        let config = RetryConfig::new([ErrorKind::Ssh], 2, Duration::from_millis(5)).unwrap();
        let ssh = QaError::Ssh("x".into());
        let filter = QaError::Filter("x".into());

        assert_eq!(config.decide(&ssh, 1), RetryDecision::RetryAfter(Duration::from_millis(5)));
        assert_eq!(config.decide(&ssh, 2), RetryDecision::Exhausted);
        assert_eq!(config.decide(&filter, 1), RetryDecision::Abort);
    }

    #[test]
    fn test_interval_from_secs() {
        assert_eq!(interval_from_secs(0.0).unwrap(), Duration::ZERO);
        assert_eq!(interval_from_secs(1.5).unwrap(), Duration::from_millis(1500));
        assert!(interval_from_secs(-1.0).unwrap_err().is_configuration());
        assert!(interval_from_secs(f64::NAN).is_err());
    }
}

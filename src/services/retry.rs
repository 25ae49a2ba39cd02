//! Retry Logic with Exponential Backoff
//!
//! Bounded retries for calls to the extraction service. Only errors that
//! report themselves as retryable are attempted again.

use crate::error::ExtractionError;
use std::fmt::Display;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Errors that can tell whether another attempt might succeed
pub trait Retryable: Display {
    fn is_retryable(&self) -> bool;

    /// HTTP status behind the failure, when there was one
    fn status(&self) -> Option<u16> {
        None
    }
}

impl Retryable for ExtractionError {
    /// Transport errors, throttling and server faults are worth another attempt
    fn is_retryable(&self) -> bool {
        match self {
            ExtractionError::Request(e) => e.is_timeout() || e.is_connect(),
            ExtractionError::Status { status, .. } => *status == 429 || *status >= 500,
            ExtractionError::Malformed(_) => false,
        }
    }

    fn status(&self) -> Option<u16> {
        match self {
            ExtractionError::Status { status, .. } => Some(*status),
            ExtractionError::Request(e) => e.status().map(|s| s.as_u16()),
            ExtractionError::Malformed(_) => None,
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Backoff multiplier
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 250,
            max_delay_ms: 5000,
            backoff_factor: 2.0,
        }
    }
}

/// Call `call` until it succeeds, fails with a permanent error, or has been
/// retried `max_retries` times.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, operation: &str, mut call: F) -> Result<T, E>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_delay = Duration::from_millis(config.max_delay_ms);
    let mut delay = Duration::from_millis(config.initial_delay_ms).min(max_delay);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            debug!("[Retry] {} failed permanently: {}", operation, err);
            return Err(err);
        }

        if attempt > config.max_retries {
            match err.status() {
                Some(status) => warn!(
                    "[Retry] {} gave up after {} attempts, last status {}: {}",
                    operation, attempt, status, err
                ),
                None => warn!("[Retry] {} gave up after {} attempts: {}", operation, attempt, err),
            }
            return Err(err);
        }

        debug!(
            "[Retry] {} attempt {} of {} failed ({}), next try in {:?}",
            operation,
            attempt,
            config.max_retries + 1,
            err,
            delay
        );
        sleep(delay).await;
        delay = delay.mul_f64(config.backoff_factor.max(1.0)).min(max_delay);
    }
}

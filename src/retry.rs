//! Retry and backoff around a single network operation.
//!
//! Classification maps a [`TransportError`] onto an [`ErrorKind`]; the
//! [`RetryPolicy`] turns (attempt, kind) into a decision; [`run_with_retry`]
//! drives an async operation until it succeeds or the policy gives up.

use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

use crate::error::{FetchError, TransportError};

/// Status codes treated as transient, both by the transport and by the retry loop.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out.
    Timeout,
    /// Connection refused/reset, DNS failure.
    Connection,
    /// Generic transient failure, including 429/5xx responses.
    Transient,
    /// Malformed URL shape; retrying cannot help.
    InvalidUrl,
    /// Anything else that should not be retried (e.g. 404).
    Fatal,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::Connection | ErrorKind::Transient
        )
    }
}

pub fn classify_status(status: u16) -> ErrorKind {
    if RETRYABLE_STATUSES.contains(&status) {
        ErrorKind::Transient
    } else {
        ErrorKind::Fatal
    }
}

pub fn classify(e: &TransportError) -> ErrorKind {
    match e {
        TransportError::Timeout(_) => ErrorKind::Timeout,
        TransportError::Connect(_) => ErrorKind::Connection,
        TransportError::InvalidUrl(_) => ErrorKind::InvalidUrl,
        TransportError::Status(code) => classify_status(*code),
        TransportError::Other(_) => ErrorKind::Transient,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Exponential backoff: attempt `k` (1-based) waits `min(base * 2^(k-1), max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; at most `retries + 1` attempts are made.
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt.
    pub fn none() -> Self {
        Self {
            retries: 0,
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(exp).min(self.max_delay)
    }

    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts() || !kind.is_retryable() {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.backoff(attempt))
    }
}

/// Run `op` until it succeeds or the policy stops retrying; the last error is
/// wrapped in a [`FetchError`] for `url`.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    url: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => match policy.decide(attempt, classify(&e)) {
                RetryDecision::NoRetry => {
                    if attempt > 1 {
                        error!(url, attempts = attempt, "giving up: {}", e);
                    }
                    return Err(FetchError {
                        url: url.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        url,
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        "attempt failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            },
        }
    }
}

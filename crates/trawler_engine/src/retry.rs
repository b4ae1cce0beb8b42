use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use trawler_logging::trawl_warn;

use crate::{CrawlError, FailureKind};

/// Exponential backoff between whole-operation attempts.
///
/// The delay before attempt `n + 1` is `min(sleep * sleep_scale^(n - 1), max_sleep)`,
/// moved by a uniform offset in `[-jitter, +jitter]` and never below zero.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub sleep: Duration,
    pub sleep_scale: f64,
    pub max_sleep: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            sleep: Duration::from_millis(500),
            sleep_scale: 1.5,
            max_sleep: Duration::from_secs(300),
            jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    pub fn delay_for<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.sleep.as_secs_f64() * self.sleep_scale.max(1.0).powi(exponent);
        let base = scaled.min(self.max_sleep.as_secs_f64());

        let jitter = self.jitter.as_secs_f64();
        let offset = if jitter > 0.0 {
            rng.random_range(-jitter..=jitter)
        } else {
            0.0
        };
        Duration::try_from_secs_f64((base + offset).max(0.0)).unwrap_or(self.max_sleep)
    }
}

/// Errors that say whether trying again could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for CrawlError {
    fn is_retryable(&self) -> bool {
        match self {
            CrawlError::Fetch { source, .. } => !matches!(
                source.kind,
                FailureKind::Cancelled | FailureKind::Client | FailureKind::InvalidUrl
            ),
            CrawlError::Decode { .. } => true,
            CrawlError::InvalidUrl { .. } | CrawlError::QueueClosed { .. } => false,
        }
    }
}

/// Runs `op(attempt)` until it succeeds, fails with a non-retryable error, or
/// the policy runs out of attempts.
///
/// Cancelling `cancel` ends the wait between attempts and returns the last
/// error.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempt >= attempts || !err.is_retryable() || cancel.is_cancelled() {
            return Err(err);
        }

        let delay = policy.delay_for(attempt, &mut rand::rng());
        trawl_warn!(
            "attempt {}/{} failed: {}; retrying in {:?}",
            attempt,
            attempts,
            err,
            delay
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(err),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

//! Retry policy for optimistic store transactions.
//!
//! Every stock-moving operation runs as one transaction. When the commit
//! finds that another request changed a document first, the whole operation
//! is re-run from a fresh read.

use crate::error::{ShopError, ShopResult};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// No delay between retries.
    None,
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff with base and max.
    Exponential {
        /// Initial delay.
        base: Duration,
        /// Maximum delay.
        max: Duration,
    },
}

impl BackoffStrategy {
    /// Calculate delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(d) => *d,
            Self::Exponential { base, max } => {
                let multiplier = 2u64.saturating_pow(attempt);
                let delay =
                    Duration::from_millis((base.as_millis() as u64).saturating_mul(multiplier));
                std::cmp::min(delay, *max)
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(5),
            max: Duration::from_millis(100),
        }
    }
}

/// How often to re-run a transaction that lost a version race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Add up to 50% random jitter to each delay.
    pub jitter: bool,
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: BackoffStrategy::default(),
            jitter: true,
        }
    }

    /// Run once, never retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffStrategy::None,
            jitter: false,
        }
    }

    /// Set backoff strategy.
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Check if another attempt is allowed after `attempt` (0-indexed) failed.
    pub fn should_retry(&self, err: &ShopError, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts && err.is_conflict()
    }

    fn delay(&self, attempt: u32) -> Duration {
        let delay = self.backoff.delay_for_attempt(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0..=delay.as_micros() as u64 / 2);
        delay + Duration::from_micros(extra)
    }

    /// Run `op` until it succeeds, fails with a non-conflict error, or the
    /// attempts run out.
    ///
    /// `op` must start a fresh transaction on every call.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut op: F) -> ShopResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ShopResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err, attempt) => {
                    let delay = self.delay(attempt);
                    tracing::debug!(operation, attempt, ?delay, "Transaction conflict, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_conflict() => {
                    tracing::warn!(operation, attempts = attempt + 1, "Conflict retries exhausted");
                    return Err(ShopError::Contended {
                        operation,
                        attempts: attempt + 1,
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

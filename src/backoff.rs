//! Deterministic exponential backoff shared by element interaction,
//! recognition calls and batch item processing.
//!
//! The delay before retry `n` (0-based) is `min(min_delay * factor^n, max_delay)`.
//! No jitter is applied so that delay sequences are reproducible.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy. `retries` counts *additional* attempts after the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub retries: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            min_delay_ms: 250,
            max_delay_ms: 2_000,
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, min_delay_ms: u64, max_delay_ms: u64, factor: f64) -> Self {
        Self {
            retries,
            min_delay_ms,
            max_delay_ms,
            factor,
        }
    }

    /// A policy that tries exactly once.
    pub fn none() -> Self {
        Self {
            retries: 0,
            ..Self::default()
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay to wait after failed attempt `retry_index` (0-based).
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let exp = self.factor.powi(retry_index.min(i32::MAX as u32) as i32);
        let raw = self.min_delay_ms as f64 * exp;
        let capped = if raw.is_finite() {
            raw.min(self.max_delay_ms as f64)
        } else {
            self.max_delay_ms as f64
        };
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Every delay this policy will wait, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.retries).map(move |i| self.delay_for(i))
    }

    /// Deserialize a possibly partial policy table, taking missing keys from
    /// `base` rather than from [`RetryPolicy::default`].
    pub fn deserialize_over<'de, D>(deserializer: D, base: RetryPolicy) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let partial = PartialRetryPolicy::deserialize(deserializer)?;
        Ok(Self {
            retries: partial.retries.unwrap_or(base.retries),
            min_delay_ms: partial.min_delay_ms.unwrap_or(base.min_delay_ms),
            max_delay_ms: partial.max_delay_ms.unwrap_or(base.max_delay_ms),
            factor: partial.factor.unwrap_or(base.factor),
        })
    }
}

#[derive(Deserialize)]
struct PartialRetryPolicy {
    retries: Option<u32>,
    min_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    factor: Option<f64>,
}

/// Passed to the failure callback before each backoff wait.
#[derive(Debug)]
pub struct FailedAttempt<'a, E> {
    /// 1-based number of the attempt that just failed.
    pub attempt: u32,
    pub error: &'a E,
    pub remaining: u32,
    pub delay: Duration,
}

/// Run `op` until it succeeds or the policy is exhausted, returning the last
/// error in the latter case. `op` receives the 0-based attempt index.
///
/// `on_failed_attempt` fires only when another attempt will follow.
pub async fn retry_with_backoff<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    mut op: F,
    mut on_failed_attempt: C,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: FnMut(&FailedAttempt<'_, E>),
{
    let mut attempt = 0u32;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= policy.retries {
                    return Err(error);
                }
                let delay = policy.delay_for(attempt);
                on_failed_attempt(&FailedAttempt {
                    attempt: attempt + 1,
                    error: &error,
                    remaining: policy.retries - attempt,
                    delay,
                });
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// [`retry_with_backoff`] with a `tracing` warning per failed attempt.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, what: &str, op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_backoff(policy, op, |failed| {
        tracing::warn!(
            what,
            attempt = failed.attempt,
            remaining = failed.remaining,
            delay_ms = failed.delay.as_millis() as u64,
            error = %failed.error,
            "attempt failed, backing off"
        );
    })
    .await
}

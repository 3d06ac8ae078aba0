// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry policies.
//!
//! Two flavours live here:
//!
//! - [`HttpRetryPolicy`]: the per-request policy of the HTTP resilience layer.
//!   Linear backoff (`backoff_base * (attempt_index + 1)`) for retryable
//!   failures, `Retry-After`-aware waits for 429, per-attempt timeout.
//! - [`retry()`] with [`RetryConfig`]: exponential retry for store connections
//!   and schema setup.
//!
//! # Example
//!
//! ```
//! use connector_sync::resilience::retry::{HttpRetryPolicy, is_retryable_status};
//! use std::time::Duration;
//!
//! let policy = HttpRetryPolicy::default();
//! assert_eq!(policy.max_retries, 2);
//! assert_eq!(policy.linear_delay(1), Duration::from_millis(1000));
//! assert!(is_retryable_status(429));
//! assert!(!is_retryable_status(404));
//! ```

use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

const RATE_LIMIT_FLOOR: Duration = Duration::from_secs(1);
const RATE_LIMIT_CEILING: Duration = Duration::from_secs(120);

/// 408, 425, 429 and every 5xx.
#[must_use]
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429) || (500..=599).contains(&status)
}

/// Parse a `Retry-After` header: delta-seconds or an HTTP date.
///
/// Dates in the past yield a zero wait. Delta-seconds beyond the rate-limit
/// ceiling are capped to it. Unparseable values yield `None`.
#[must_use]
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds).min(RATE_LIMIT_CEILING));
    }
    // Integers too wide for u64 land here too.
    if let Ok(seconds) = value.parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            return Some(Duration::from_secs_f64(seconds.min(RATE_LIMIT_CEILING.as_secs_f64())));
        }
        return None;
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// Per-request retry behaviour of the HTTP resilience layer.
#[derive(Debug, Clone)]
pub struct HttpRetryPolicy {
    /// Extra attempts beyond the first
    pub max_retries: u32,
    /// Unit of the linear backoff and of the 429 exponential fallback
    pub backoff_base: Duration,
    /// Independent timeout for each attempt
    pub attempt_timeout: Duration,
}

impl Default for HttpRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(15),
        }
    }
}

impl HttpRetryPolicy {
    /// Total attempts for one logical call.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait after a non-429 retryable failure of attempt `attempt_index` (0-based).
    #[must_use]
    pub fn linear_delay(&self, attempt_index: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt_index.saturating_add(1))
    }

    /// Wait after a 429 on attempt `attempt_index`, clamped to [1s, 120s].
    #[must_use]
    pub fn rate_limit_delay(&self, attempt_index: u32, retry_after: Option<Duration>) -> Duration {
        let wait = retry_after.unwrap_or_else(|| {
            let factor = 1u32.checked_shl(attempt_index.min(16)).unwrap_or(u32::MAX);
            self.backoff_base
                .saturating_mul(factor)
                .min(RATE_LIMIT_CEILING)
        });
        wait.clamp(RATE_LIMIT_FLOOR, RATE_LIMIT_CEILING)
    }

    /// Fast policy for tests (tiny waits, short timeout)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_millis(10),
            attempt_timeout: Duration::from_millis(200),
        }
    }
}

/// Exponential retry configuration for store connections.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub max_retries: usize,
}

impl RetryConfig {
    /// Fail fast on startup: 5 attempts, ~5 seconds total.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Quick retry for individual queries.
    #[must_use]
    pub fn query() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }
}

pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!(operation = operation_name, retries = attempts, "Operation succeeded after retries");
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;
                if attempts >= config.max_retries {
                    return Err(err);
                }
                warn!(
                    operation = operation_name,
                    attempt = attempts,
                    max = config.max_retries,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
                delay = delay.mul_f64(config.factor).min(config.max_delay);
            }
        }
    }
}

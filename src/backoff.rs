// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connector-level retry scheduling and error fingerprinting.
//!
//! Pure functions, no I/O. Two concerns live here:
//!
//! - **Backoff**: how long a failed operation waits before the retry batch picks
//!   it up again. Exponential, `base * 2^(attempt - 1)`, with the exponent capped at
//!   10 and the result capped at `cap_seconds` (6 hours by default).
//! - **Dedupe keys**: a SHA-1 fingerprint of `(connector, mode, operation,
//!   source_ref, error_kind)` so repeated failures of the same logical operation
//!   collapse into one evolving error row.
//!
//! # Example
//!
//! ```
//! use connector_sync::backoff::{next_backoff_seconds, DEFAULT_BACKOFF_CAP_SECONDS};
//!
//! let delays: Vec<u64> = (1..=5)
//!     .map(|attempt| next_backoff_seconds(attempt, 30, DEFAULT_BACKOFF_CAP_SECONDS))
//!     .collect();
//! assert_eq!(delays, vec![30, 60, 120, 240, 480]);
//! ```

use chrono::{DateTime, Duration, Utc};
use sha1::{Digest, Sha1};

/// Default ceiling for connector retry delays: 6 hours.
pub const DEFAULT_BACKOFF_CAP_SECONDS: u64 = 21_600;

const MAX_BACKOFF_POWER: u32 = 10;
const DEDUPE_SEPARATOR: &str = "|";

/// `base * 2^clamp(attempt - 1, 0, 10)`, capped at `cap_seconds`.
///
/// Attempt 0 and attempt 1 both yield `base`.
#[must_use]
pub fn next_backoff_seconds(attempt: u32, base_seconds: u64, cap_seconds: u64) -> u64 {
    let power = attempt.saturating_sub(1).min(MAX_BACKOFF_POWER);
    base_seconds.saturating_mul(1u64 << power).min(cap_seconds)
}

/// UTC instant arithmetic. Saturates at the representable range.
#[must_use]
pub fn add_seconds(date: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
    // chrono's Duration holds milliseconds in an i64
    let bounded = seconds.clamp(-(i64::MAX / 1000), i64::MAX / 1000);
    date.checked_add_signed(Duration::seconds(bounded))
        .unwrap_or(if bounded >= 0 {
            DateTime::<Utc>::MAX_UTC
        } else {
            DateTime::<Utc>::MIN_UTC
        })
}

/// Backoff parameters for one connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_seconds: u64,
    pub cap_seconds: u64,
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(base_seconds: u64) -> Self {
        Self {
            base_seconds,
            cap_seconds: DEFAULT_BACKOFF_CAP_SECONDS,
        }
    }

    #[must_use]
    pub fn with_cap(mut self, cap_seconds: u64) -> Self {
        self.cap_seconds = cap_seconds;
        self
    }

    #[must_use]
    pub fn delay_seconds(&self, attempt: u32) -> u64 {
        next_backoff_seconds(attempt, self.base_seconds, self.cap_seconds)
    }

    /// When an operation that has now failed `attempt` times becomes due again.
    #[must_use]
    pub fn next_retry_at(&self, now: DateTime<Utc>, attempt: u32) -> DateTime<Utc> {
        let delay = i64::try_from(self.delay_seconds(attempt)).unwrap_or(i64::MAX);
        add_seconds(now, delay)
    }
}

/// Inputs to the error fingerprint. Absent fields fingerprint as empty strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupeFields<'a> {
    pub connector: Option<&'a str>,
    pub mode: Option<&'a str>,
    pub operation: Option<&'a str>,
    pub source_ref: Option<&'a str>,
    pub error_kind: Option<&'a str>,
}

/// 40-char lowercase hex SHA-1 of the separator-joined fields.
#[must_use]
pub fn dedupe_key_for_error(fields: &DedupeFields<'_>) -> String {
    let joined = [
        fields.connector,
        fields.mode,
        fields.operation,
        fields.source_ref,
        fields.error_kind,
    ]
    .iter()
    .map(|field| field.unwrap_or(""))
    .collect::<Vec<_>>()
    .join(DEDUPE_SEPARATOR);

    hex::encode(Sha1::digest(joined.as_bytes()))
}

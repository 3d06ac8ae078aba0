// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for connector-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The parent daemon is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `connector_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `connector`: zendesk, linear, jira, hubspot
//! - `host`: destination host of an HTTP call
//! - `status` / `outcome`: what happened

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record the end of a sync cycle (`ok` or `failed`)
pub fn record_sync_cycle(connector: &str, status: &str) {
    counter!(
        "connector_sync_cycles_total",
        "connector" => connector.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record sync cycle duration
pub fn record_sync_duration(connector: &str, duration: Duration) {
    histogram!(
        "connector_sync_cycle_seconds",
        "connector" => connector.to_string()
    )
    .record(duration.as_secs_f64());
}

/// A failure was written to (or folded into) an error row
pub fn record_error_recorded(connector: &str, error_kind: &str) {
    counter!(
        "connector_sync_errors_recorded_total",
        "connector" => connector.to_string(),
        "kind" => error_kind.to_string()
    )
    .increment(1);
}

/// An error row was resolved by a successful retry
pub fn record_error_resolved(connector: &str) {
    counter!(
        "connector_sync_errors_resolved_total",
        "connector" => connector.to_string()
    )
    .increment(1);
}

/// An error row hit its attempt budget and was given up on
pub fn record_error_abandoned(connector: &str) {
    counter!(
        "connector_sync_errors_abandoned_total",
        "connector" => connector.to_string()
    )
    .increment(1);
}

/// Record one retry batch
pub fn record_retry_batch(due: usize, succeeded: usize, failed: usize, deferred: usize) {
    histogram!("connector_sync_retry_batch_due").record(due as f64);
    counter!("connector_sync_retries_total", "status" => "succeeded").increment(succeeded as u64);
    counter!("connector_sync_retries_total", "status" => "failed").increment(failed as u64);
    counter!("connector_sync_retries_total", "status" => "deferred").increment(deferred as u64);
}

/// Record one HTTP attempt outcome (completed, retryable_status, timeout, transport_error, rejected)
pub fn record_http_attempt(host: &str, outcome: &str) {
    counter!(
        "connector_sync_http_attempts_total",
        "host" => host.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record circuit breaker state change (0 = closed, 1 = half-open, 2 = open)
pub fn set_circuit_state(host: &str, state: u8) {
    gauge!(
        "connector_sync_circuit_breaker_state",
        "host" => host.to_string()
    )
    .set(state as f64);
}

/// Record a logical call outcome as seen by a breaker (success, failure, rejected)
pub fn record_circuit_call(host: &str, outcome: &str) {
    counter!(
        "connector_sync_circuit_breaker_calls_total",
        "host" => host.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a record-store failure
pub fn record_store_error(operation: &str) {
    counter!(
        "connector_sync_store_errors_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// A timing guard that records cycle duration on drop
pub struct CycleTimer {
    connector: String,
    start: Instant,
}

impl CycleTimer {
    /// Start a new cycle timer
    pub fn new(connector: &str) -> Self {
        Self {
            connector: connector.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for CycleTimer {
    fn drop(&mut self) {
        record_sync_duration(&self.connector, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // No recorder installed: these verify the calls don't panic.

    #[test]
    fn test_sync_cycle_metrics() {
        record_sync_cycle("linear", "ok");
        record_sync_cycle("zendesk", "failed");
        record_sync_duration("linear", Duration::from_millis(250));
    }

    #[test]
    fn test_error_lifecycle_metrics() {
        record_error_recorded("hubspot", "http_503");
        record_error_resolved("hubspot");
        record_error_abandoned("jira");
        record_retry_batch(10, 6, 3, 1);
        record_store_error("select_due_errors");
    }

    #[test]
    fn test_circuit_breaker_metrics() {
        set_circuit_state("api.linear.app", 0);
        set_circuit_state("acme.zendesk.com", 2);
        record_circuit_call("api.linear.app", "success");
        record_circuit_call("acme.zendesk.com", "rejected");
        record_http_attempt("acme.zendesk.com", "timeout");
    }

    #[test]
    fn test_cycle_timer() {
        {
            let _timer = CycleTimer::new("linear");
            std::thread::sleep(Duration::from_micros(10));
        }
    }
}

//! Public types for the sync orchestrator.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::connector::ConnectorMode;
use crate::models::{ConnectorId, SyncStatus};

/// Per-call options of [`super::SyncOrchestrator::run_connector_sync()`].
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Defaults to `sync`
    pub operation: Option<String>,
    pub source_ref: Option<String>,
    /// Passed to the runner untouched
    pub options: Value,
}

/// Result of a successful cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    pub connector: ConnectorId,
    pub mode: ConnectorMode,
    pub status: SyncStatus,
    pub counters: BTreeMap<String, i64>,
    pub cursor: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryOptions {
    /// Defaults to the configured batch limit; clamped to `[1, ceiling]`
    pub limit: Option<usize>,
}

/// What happened to one due error row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryOutcome {
    /// Runner succeeded; row resolved
    Succeeded,
    /// Runner failed; row rescheduled
    Failed,
    /// Runner failed for the last allowed time; row resolved as abandoned
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetriedError {
    pub id: String,
    pub connector: ConnectorId,
    pub operation: String,
    pub source_ref: Option<String>,
    /// Failures recorded on the row after this retry
    pub attempt: u32,
    pub outcome: RetryOutcome,
    pub error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Summary of one retry batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrySummary {
    /// Rows returned by the due selection
    pub due: usize,
    pub succeeded: usize,
    /// Includes abandoned rows
    pub failed: usize,
    pub abandoned: usize,
    /// Left untouched because their connector's circuit opened earlier in the batch
    pub deferred: usize,
    pub retried: Vec<RetriedError>,
}

#[derive(Debug, Clone, Default)]
pub struct ListErrorsQuery {
    /// `open`/`unresolved`, `resolved`, `abandoned`, `all`; trimmed, case-insensitive
    pub status: Option<String>,
    pub limit: Option<usize>,
}

/// `requested` (or `default`) clamped to `[1, ceiling]`.
#[must_use]
pub fn clamp_limit(requested: Option<usize>, default: usize, ceiling: usize) -> usize {
    requested.unwrap_or(default).clamp(1, ceiling.max(1))
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Persisted records owned by the orchestrator.
//!
//! - [`ConnectorSyncState`]: one row per (tenant scope, connector), updated in
//!   place at the start and end of every cycle, never deleted.
//! - [`ConnectorErrorRecord`]: one row per distinct failure fingerprint. Repeat
//!   failures bump `attempt` on the same row; resolution marks it, never deletes.
//! - [`SyncEvent`]: append-only audit trail of error resolutions/abandonments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::backoff::{dedupe_key_for_error, DedupeFields};
use crate::connector::ConnectorMode;
use crate::error::{truncate_message, SyncError};

/// Upper bound on persisted error messages, in characters.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 1000;

/// Opaque tenant identifier every persisted row is scoped by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantScope(String);

impl TenantScope {
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantScope {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The known set of connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorId {
    /// Support ticketing
    Zendesk,
    /// Issue tracker
    Linear,
    /// Issue tracker
    Jira,
    /// CRM
    Hubspot,
}

impl ConnectorId {
    pub const ALL: [ConnectorId; 4] = [Self::Zendesk, Self::Linear, Self::Jira, Self::Hubspot];

    /// Case-insensitive, whitespace-tolerant lookup. `None` outside the known set.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "zendesk" => Some(Self::Zendesk),
            "linear" => Some(Self::Linear),
            "jira" => Some(Self::Jira),
            "hubspot" => Some(Self::Hubspot),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zendesk => "zendesk",
            Self::Linear => "linear",
            Self::Jira => "jira",
            Self::Hubspot => "hubspot",
        }
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-connector cycle status: `idle → running → {ok, failed}`, and back to
/// `running` on the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Running,
    Ok,
    Failed,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Ok => "ok",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "ok" => Some(Self::Ok),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Legal transitions. A crashed process can leave a row `running`, so a new
    /// cycle may start from any state; only a running cycle can end.
    #[must_use]
    pub fn can_transition_to(&self, next: SyncStatus) -> bool {
        matches!(
            (self, next),
            (_, Self::Running) | (Self::Running, Self::Ok | Self::Failed)
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync state of one connector within one tenant scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorSyncState {
    pub scope: TenantScope,
    pub connector: ConnectorId,
    pub status: SyncStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Opaque incremental-pull position, owned by the runner
    pub cursor: Option<Value>,
    /// Counters reported by the last successful cycle
    pub counters: BTreeMap<String, i64>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectorSyncState {
    #[must_use]
    pub fn new(scope: TenantScope, connector: ConnectorId, now: DateTime<Utc>) -> Self {
        Self {
            scope,
            connector,
            status: SyncStatus::Idle,
            started_at: None,
            last_synced_at: None,
            last_error: None,
            cursor: None,
            counters: BTreeMap::new(),
            updated_at: now,
        }
    }

    fn transition(&mut self, next: SyncStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal sync status transition {} -> {}",
            self.status,
            next
        );
        self.status = next;
    }

    pub fn begin(&mut self, now: DateTime<Utc>) {
        self.transition(SyncStatus::Running);
        self.started_at = Some(now);
        self.updated_at = now;
    }

    /// Successful end of cycle. A `None` cursor keeps the previous one.
    pub fn complete(&mut self, counters: BTreeMap<String, i64>, cursor: Option<Value>, now: DateTime<Utc>) {
        self.transition(SyncStatus::Ok);
        self.last_synced_at = Some(now);
        self.last_error = None;
        self.counters = counters;
        if cursor.is_some() {
            self.cursor = cursor;
        }
        self.updated_at = now;
    }

    pub fn fail(&mut self, message: &str, now: DateTime<Utc>) {
        self.transition(SyncStatus::Failed);
        self.last_error = Some(truncate_message(message, MAX_ERROR_MESSAGE_CHARS));
        self.updated_at = now;
    }
}

/// How a resolved error row ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Succeeded,
    Abandoned,
}

impl Resolution {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Abandoned => "abandoned",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "succeeded" => Some(Self::Succeeded),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

/// A failure about to be folded into the error table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDraft {
    pub connector: ConnectorId,
    pub mode: ConnectorMode,
    pub operation: String,
    pub source_ref: Option<String>,
    /// Stable error code, e.g. `http_503` or `circuit_open`
    pub error_kind: String,
    pub message: String,
}

impl ErrorDraft {
    pub fn from_error(
        connector: ConnectorId,
        mode: ConnectorMode,
        operation: impl Into<String>,
        source_ref: Option<String>,
        error: &SyncError,
    ) -> Self {
        Self {
            connector,
            mode,
            operation: operation.into(),
            source_ref,
            error_kind: error.code().into_owned(),
            message: truncate_message(&error.to_string(), MAX_ERROR_MESSAGE_CHARS),
        }
    }

    #[must_use]
    pub fn dedupe_key(&self) -> String {
        let mode = self.mode.to_string();
        dedupe_key_for_error(&DedupeFields {
            connector: Some(self.connector.as_str()),
            mode: Some(&mode),
            operation: Some(&self.operation),
            source_ref: self.source_ref.as_deref(),
            error_kind: Some(&self.error_kind),
        })
    }
}

/// One distinct failure fingerprint within a tenant scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorErrorRecord {
    pub id: String,
    pub scope: TenantScope,
    pub connector: ConnectorId,
    pub mode: ConnectorMode,
    pub operation: String,
    pub source_ref: Option<String>,
    pub error_kind: String,
    pub dedupe_key: String,
    /// Failures seen for this fingerprint since it was (re)opened, starting at 1
    pub attempt: u32,
    pub next_retry_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<Resolution>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectorErrorRecord {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.next_retry_at <= now
    }
}

/// Status filter for error listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorStatusFilter {
    /// Unresolved rows
    Open,
    /// Any resolved row, succeeded or abandoned
    Resolved,
    /// Rows given up on
    Abandoned,
    #[default]
    All,
}

impl ErrorStatusFilter {
    /// Trimmed, lower-cased. Empty or absent means `All`.
    pub fn parse(value: Option<&str>) -> Result<Self, SyncError> {
        let normalized = value.map(|v| v.trim().to_ascii_lowercase()).unwrap_or_default();
        match normalized.as_str() {
            "" | "all" => Ok(Self::All),
            "open" | "unresolved" => Ok(Self::Open),
            "resolved" => Ok(Self::Resolved),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(SyncError::InvalidInput(format!("unknown error status filter {other:?}"))),
        }
    }

    #[must_use]
    pub fn matches(&self, record: &ConnectorErrorRecord) -> bool {
        match self {
            Self::Open => record.is_open(),
            Self::Resolved => !record.is_open(),
            Self::Abandoned => record.resolution == Some(Resolution::Abandoned),
            Self::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncEventType {
    #[serde(rename = "connector_error_resolved")]
    ErrorResolved,
    #[serde(rename = "connector_error_abandoned")]
    ErrorAbandoned,
}

impl SyncEventType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ErrorResolved => "connector_error_resolved",
            Self::ErrorAbandoned => "connector_error_abandoned",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "connector_error_resolved" => Some(Self::ErrorResolved),
            "connector_error_abandoned" => Some(Self::ErrorAbandoned),
            _ => None,
        }
    }
}

/// Append-only audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub id: String,
    pub scope: TenantScope,
    pub connector: ConnectorId,
    pub event_type: SyncEventType,
    pub dedupe_key: Option<String>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl SyncEvent {
    pub fn for_error(
        event_type: SyncEventType,
        record: &ConnectorErrorRecord,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            scope: record.scope.clone(),
            connector: record.connector,
            event_type,
            dedupe_key: Some(record.dedupe_key.clone()),
            payload,
            created_at: now,
        }
    }
}

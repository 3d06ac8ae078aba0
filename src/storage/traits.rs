use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::backoff::BackoffPolicy;
use crate::models::{
    ConnectorErrorRecord, ConnectorId, ConnectorSyncState, ErrorDraft, ErrorStatusFilter,
    Resolution, SyncEvent, TenantScope,
};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Record store for sync state, error rows and events.
///
/// Only the orchestrator writes through this trait. Every row is scoped by
/// tenant; error rows are unique per `(scope, dedupe_key)`.
#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn get_sync_state(
        &self,
        scope: &TenantScope,
        connector: ConnectorId,
    ) -> Result<Option<ConnectorSyncState>, StorageError>;

    /// Single-row upsert keyed by `(scope, connector)`; last write wins.
    async fn upsert_sync_state(&self, state: &ConnectorSyncState) -> Result<(), StorageError>;

    async fn list_sync_states(&self, scope: &TenantScope) -> Result<Vec<ConnectorSyncState>, StorageError>;

    /// Insert-or-increment by dedupe key. See [`fold_error`] for the rules.
    async fn record_error(
        &self,
        scope: &TenantScope,
        draft: &ErrorDraft,
        backoff: BackoffPolicy,
        now: DateTime<Utc>,
    ) -> Result<ConnectorErrorRecord, StorageError>;

    /// Unresolved rows with `next_retry_at <= now`, oldest due first.
    async fn select_due_errors(
        &self,
        scope: &TenantScope,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ConnectorErrorRecord>, StorageError>;

    /// Record another failed retry of an open row.
    async fn reschedule_error(
        &self,
        id: &str,
        attempt: u32,
        next_retry_at: DateTime<Utc>,
        last_error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    async fn mark_resolved(
        &self,
        id: &str,
        resolution: Resolution,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Most recently updated first.
    async fn list_errors(
        &self,
        scope: &TenantScope,
        filter: ErrorStatusFilter,
        limit: usize,
    ) -> Result<Vec<ConnectorErrorRecord>, StorageError>;

    async fn record_event(&self, event: &SyncEvent) -> Result<(), StorageError>;
}

/// Fold a new failure into the existing row for its fingerprint, if any.
///
/// - no row: new row, `attempt = 1`
/// - open row: `attempt + 1`
/// - resolved row: re-opened with `attempt = 1`
///
/// `next_retry_at` is always recomputed from the resulting attempt.
#[must_use]
pub fn fold_error(
    existing: Option<ConnectorErrorRecord>,
    scope: &TenantScope,
    draft: &ErrorDraft,
    backoff: BackoffPolicy,
    now: DateTime<Utc>,
) -> ConnectorErrorRecord {
    match existing {
        Some(mut row) => {
            row.attempt = if row.is_open() { row.attempt.saturating_add(1) } else { 1 };
            row.resolved_at = None;
            row.resolution = None;
            row.error_kind = draft.error_kind.clone();
            row.last_error = Some(draft.message.clone());
            row.next_retry_at = backoff.next_retry_at(now, row.attempt);
            row.updated_at = now;
            row
        }
        None => ConnectorErrorRecord {
            id: uuid::Uuid::new_v4().to_string(),
            scope: scope.clone(),
            connector: draft.connector,
            mode: draft.mode,
            operation: draft.operation.clone(),
            source_ref: draft.source_ref.clone(),
            error_kind: draft.error_kind.clone(),
            dedupe_key: draft.dedupe_key(),
            attempt: 1,
            next_retry_at: backoff.next_retry_at(now, 1),
            last_error: Some(draft.message.clone()),
            resolved_at: None,
            resolution: None,
            created_at: now,
            updated_at: now,
        },
    }
}

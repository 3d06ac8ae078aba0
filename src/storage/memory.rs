use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::traits::{fold_error, StorageError, SyncStore};
use crate::backoff::BackoffPolicy;
use crate::models::{
    ConnectorErrorRecord, ConnectorId, ConnectorSyncState, ErrorDraft, ErrorStatusFilter,
    Resolution, SyncEvent, TenantScope,
};

/// In-process store for tests, single-node deployments and dry runs.
pub struct InMemoryStore {
    states: DashMap<(TenantScope, ConnectorId), ConnectorSyncState>,
    errors: DashMap<String, ConnectorErrorRecord>,
    /// `(scope, dedupe_key)` → error id
    dedupe_index: DashMap<(TenantScope, String), String>,
    events: RwLock<Vec<SyncEvent>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
            errors: DashMap::new(),
            dedupe_index: DashMap::new(),
            events: RwLock::new(Vec::new()),
        }
    }

    /// Error row count across all scopes
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn error(&self, id: &str) -> Option<ConnectorErrorRecord> {
        self.errors.get(id).map(|r| r.value().clone())
    }

    /// Snapshot of the event log, in append order
    #[must_use]
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.read().clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncStore for InMemoryStore {
    async fn get_sync_state(
        &self,
        scope: &TenantScope,
        connector: ConnectorId,
    ) -> Result<Option<ConnectorSyncState>, StorageError> {
        Ok(self
            .states
            .get(&(scope.clone(), connector))
            .map(|r| r.value().clone()))
    }

    async fn upsert_sync_state(&self, state: &ConnectorSyncState) -> Result<(), StorageError> {
        self.states
            .insert((state.scope.clone(), state.connector), state.clone());
        Ok(())
    }

    async fn list_sync_states(&self, scope: &TenantScope) -> Result<Vec<ConnectorSyncState>, StorageError> {
        let mut states: Vec<_> = self
            .states
            .iter()
            .filter(|entry| &entry.key().0 == scope)
            .map(|entry| entry.value().clone())
            .collect();
        states.sort_by_key(|s| s.connector);
        Ok(states)
    }

    async fn record_error(
        &self,
        scope: &TenantScope,
        draft: &ErrorDraft,
        backoff: BackoffPolicy,
        now: DateTime<Utc>,
    ) -> Result<ConnectorErrorRecord, StorageError> {
        // Holding the index entry serializes concurrent failures of one fingerprint
        let entry = self.dedupe_index.entry((scope.clone(), draft.dedupe_key()));
        let existing = match &entry {
            Entry::Occupied(occupied) => self.errors.get(occupied.get()).map(|r| r.value().clone()),
            Entry::Vacant(_) => None,
        };

        let row = fold_error(existing, scope, draft, backoff, now);
        self.errors.insert(row.id.clone(), row.clone());
        if let Entry::Vacant(vacant) = entry {
            vacant.insert(row.id.clone());
        }
        Ok(row)
    }

    async fn select_due_errors(
        &self,
        scope: &TenantScope,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ConnectorErrorRecord>, StorageError> {
        let mut due: Vec<_> = self
            .errors
            .iter()
            .filter(|entry| &entry.value().scope == scope && entry.value().is_due(now))
            .map(|entry| entry.value().clone())
            .collect();
        due.sort_by(|a, b| {
            a.next_retry_at
                .cmp(&b.next_retry_at)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        due.truncate(limit);
        Ok(due)
    }

    async fn reschedule_error(
        &self,
        id: &str,
        attempt: u32,
        next_retry_at: DateTime<Utc>,
        last_error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut row = self.errors.get_mut(id).ok_or_else(|| StorageError::NotFound {
            entity: "connector_error",
            id: id.to_string(),
        })?;
        row.attempt = attempt;
        row.next_retry_at = next_retry_at;
        if let Some(message) = last_error {
            row.last_error = Some(message.to_string());
        }
        row.updated_at = now;
        Ok(())
    }

    async fn mark_resolved(
        &self,
        id: &str,
        resolution: Resolution,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut row = self.errors.get_mut(id).ok_or_else(|| StorageError::NotFound {
            entity: "connector_error",
            id: id.to_string(),
        })?;
        row.resolved_at = Some(at);
        row.resolution = Some(resolution);
        row.updated_at = at;
        Ok(())
    }

    async fn list_errors(
        &self,
        scope: &TenantScope,
        filter: ErrorStatusFilter,
        limit: usize,
    ) -> Result<Vec<ConnectorErrorRecord>, StorageError> {
        let mut rows: Vec<_> = self
            .errors
            .iter()
            .filter(|entry| &entry.value().scope == scope && filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn record_event(&self, event: &SyncEvent) -> Result<(), StorageError> {
        self.events.write().push(event.clone());
        Ok(())
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Read-only projections and lookups.

use std::sync::Arc;
use tracing::instrument;

use super::types::{clamp_limit, ListErrorsQuery};
use super::SyncOrchestrator;
use crate::connector::SyncRunner;
use crate::error::SyncResult;
use crate::models::{ConnectorErrorRecord, ConnectorSyncState, ErrorStatusFilter, TenantScope};

impl SyncOrchestrator {
    /// Sync state of every connector that has run in `scope`.
    #[instrument(skip(self), fields(scope = %scope))]
    pub async fn list_connector_sync_state(&self, scope: &TenantScope) -> SyncResult<Vec<ConnectorSyncState>> {
        Ok(self.store.list_sync_states(scope).await?)
    }

    /// Error rows of `scope`, most recently updated first.
    ///
    /// Unknown status filters fail with `invalid_input`.
    #[instrument(skip(self, query), fields(scope = %scope, status = ?query.status))]
    pub async fn list_connector_errors(
        &self,
        scope: &TenantScope,
        query: ListErrorsQuery,
    ) -> SyncResult<Vec<ConnectorErrorRecord>> {
        let filter = ErrorStatusFilter::parse(query.status.as_deref())?;
        let limit = clamp_limit(query.limit, self.config.list_limit_default, self.config.list_limit_max);
        Ok(self.store.list_errors(scope, filter, limit).await?)
    }

    /// The registered HTTP runner for `connector`, if any.
    #[must_use]
    pub fn get_http_runner(&self, connector: &str) -> Option<Arc<dyn SyncRunner>> {
        self.registry.get_http_runner(connector)
    }

    /// Effective mode for `connector`: per-connector override, then the global
    /// override, then `http`. Not validated.
    #[must_use]
    pub fn resolve_mode(&self, connector: &str) -> String {
        self.config.mode_for(connector)
    }
}

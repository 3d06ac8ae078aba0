// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync orchestrator.
//!
//! The [`SyncOrchestrator`] is the only writer of sync state and error rows. It
//! ties together:
//! - the connector registry (what to call)
//! - configuration (which mode, which backoff base)
//! - the record store (where bookkeeping goes)
//! - a clock (when things are due)
//!
//! # Cycle
//!
//! ```text
//! run_connector_sync(scope, "linear")
//!   │ unknown name ──────────────────────────▶ unsupported_connector (no store call)
//!   ▼
//! state: running ──▶ resolve mode ──▶ pull
//!                                       ├─ ok ───▶ state: ok (counters, cursor, last_synced_at)
//!                                       └─ err ──▶ state: failed (bounded message)
//!                                                  + error row if transient / circuit_open
//!                                                  ──▶ error re-raised
//! ```
//!
//! Retry batches ([`SyncOrchestrator::retry_connector_errors()`]) re-run due
//! error rows; listings are read-only projections.

mod listing;
mod retry_batch;
mod types;

pub use types::{
    clamp_limit, ListErrorsQuery, RetriedError, RetryOptions, RetryOutcome, RetrySummary,
    SyncOptions, SyncOutcome,
};

use futures_util::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::connector::{ConnectorMode, ConnectorRegistry, PullReport, SyncContext, DEFAULT_OPERATION};
use crate::error::{SyncError, SyncResult};
use crate::models::{ConnectorId, ConnectorSyncState, ErrorDraft, TenantScope};
use crate::resilience::circuit_breaker::CircuitRegistry;
use crate::resilience::http::ResilientHttpClient;
use crate::storage::traits::SyncStore;

/// Runs sync cycles and retry batches for every connector of every tenant.
///
/// `Send + Sync`; share it behind an `Arc` between the scheduler's tasks.
pub struct SyncOrchestrator {
    pub(super) store: Arc<dyn SyncStore>,
    pub(super) registry: ConnectorRegistry,
    pub(super) config: SyncConfig,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) http: Arc<ResilientHttpClient>,
}

/// One pull, as the orchestrator sees it.
pub(super) struct PullRequest<'a> {
    pub scope: &'a TenantScope,
    pub connector: ConnectorId,
    pub mode: &'a str,
    pub operation: &'a str,
    pub source_ref: Option<String>,
    pub cursor: Option<Value>,
    pub attempt: u32,
    pub options: Value,
}

impl SyncOrchestrator {
    /// Orchestrator with a wall clock and an HTTP client whose breakers follow `config.http`.
    pub fn new(store: Arc<dyn SyncStore>, registry: ConnectorRegistry, config: SyncConfig) -> Self {
        let circuits = Arc::new(CircuitRegistry::new(config.http.circuit_config()));
        let http = Arc::new(ResilientHttpClient::with_policy(circuits, config.http.retry_policy()));
        Self {
            store,
            registry,
            config,
            clock: Arc::new(SystemClock),
            http,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an HTTP client (and its breakers) with other orchestrators.
    #[must_use]
    pub fn with_http_client(mut self, http: Arc<ResilientHttpClient>) -> Self {
        self.http = http;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn http_client(&self) -> &Arc<ResilientHttpClient> {
        &self.http
    }

    /// Run one sync cycle for `connector` within `scope`.
    ///
    /// Unknown connector names fail with `unsupported_connector` before the
    /// store is touched. Every other failure is persisted as a `failed` state
    /// (and, if transient or circuit-open, an error row) and then returned.
    #[instrument(skip(self, options), fields(scope = %scope, connector = %connector))]
    pub async fn run_connector_sync(
        &self,
        scope: &TenantScope,
        connector: &str,
        options: SyncOptions,
    ) -> SyncResult<SyncOutcome> {
        let id = ConnectorId::parse(connector).ok_or_else(|| SyncError::UnsupportedConnector {
            name: connector.to_string(),
        })?;

        let started = self.clock.now();
        let mut state = self
            .store
            .get_sync_state(scope, id)
            .await?
            .unwrap_or_else(|| ConnectorSyncState::new(scope.clone(), id, started));
        state.begin(started);
        self.store.upsert_sync_state(&state).await?;

        let _timer = crate::metrics::CycleTimer::new(id.as_str());
        let mode = self.config.mode_for(id.as_str());
        let operation = options.operation.as_deref().unwrap_or(DEFAULT_OPERATION).to_string();

        let result = self
            .pull(PullRequest {
                scope,
                connector: id,
                mode: &mode,
                operation: &operation,
                source_ref: options.source_ref.clone(),
                cursor: state.cursor.clone(),
                attempt: 0,
                options: options.options,
            })
            .await;

        match result {
            Ok((mode, report)) => {
                state.complete(report.counters.clone(), report.cursor.clone(), self.clock.now());
                self.store.upsert_sync_state(&state).await?;
                crate::metrics::record_sync_cycle(id.as_str(), "ok");
                info!(mode = %mode, counters = ?report.counters, "Connector sync completed");

                Ok(SyncOutcome {
                    connector: id,
                    mode,
                    status: state.status,
                    counters: report.counters,
                    cursor: state.cursor.clone(),
                })
            }
            Err(err) => {
                crate::metrics::record_sync_cycle(id.as_str(), "failed");
                let failed_mode = ConnectorMode::parse(&mode).ok();
                self.record_cycle_failure(&mut state, failed_mode, &operation, options.source_ref, &err)
                    .await;
                Err(err)
            }
        }
    }

    /// Run cycles for several connectors concurrently.
    ///
    /// One connector's failure never affects another's; results come back in
    /// input order.
    pub async fn run_connector_syncs(
        &self,
        scope: &TenantScope,
        connectors: &[&str],
        options: SyncOptions,
    ) -> Vec<(String, SyncResult<SyncOutcome>)> {
        let cycles = connectors.iter().map(|name| {
            let options = options.clone();
            async move {
                let result = self.run_connector_sync(scope, name, options).await;
                (name.to_string(), result)
            }
        });
        join_all(cycles).await
    }

    /// Resolve the connector for `request.mode` and pull.
    pub(super) async fn pull(&self, request: PullRequest<'_>) -> SyncResult<(ConnectorMode, PullReport)> {
        let connector = self.registry.resolve(request.connector, request.mode)?;
        let mode = connector.mode();
        let ctx = SyncContext {
            scope: request.scope.clone(),
            connector: connector.name().to_string(),
            mode,
            operation: request.operation.to_string(),
            source_ref: request.source_ref,
            cursor: request.cursor,
            attempt: request.attempt,
            options: request.options,
            http: Arc::clone(&self.http),
        };
        let report = connector.pull(ctx).await?;
        Ok((mode, report))
    }

    /// Persist a failed cycle. Store failures here are logged, never raised:
    /// the caller gets the cycle's own error.
    async fn record_cycle_failure(
        &self,
        state: &mut ConnectorSyncState,
        mode: Option<ConnectorMode>,
        operation: &str,
        source_ref: Option<String>,
        err: &SyncError,
    ) {
        let now = self.clock.now();
        let connector = state.connector;
        state.fail(&err.to_string(), now);
        if let Err(store_err) = self.store.upsert_sync_state(state).await {
            crate::metrics::record_store_error("upsert_sync_state");
            error!(connector = %connector, error = %store_err, "Failed to persist failed sync state");
        }

        let Some(mode) = mode.filter(|_| err.is_retryable()) else {
            warn!(connector = %connector, code = %err.code(), error = %err, "Connector sync failed");
            return;
        };

        let draft = ErrorDraft::from_error(connector, mode, operation, source_ref, err);
        match self
            .store
            .record_error(&state.scope, &draft, self.config.backoff_for(connector), now)
            .await
        {
            Ok(row) => {
                crate::metrics::record_error_recorded(connector.as_str(), &draft.error_kind);
                warn!(
                    connector = %connector,
                    code = %err.code(),
                    attempt = row.attempt,
                    next_retry_at = %row.next_retry_at,
                    error = %err,
                    "Connector sync failed, retry scheduled"
                );
            }
            Err(store_err) => {
                crate::metrics::record_store_error("record_error");
                error!(
                    connector = %connector,
                    error = %err,
                    store_error = %store_err,
                    "Failed to record connector error"
                );
            }
        }
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry batch: re-run due error rows.
//!
//! Each due row is re-invoked with its own mode, operation and source ref.
//! Success resolves the row; failure bumps `attempt` and reschedules it, until
//! `max_attempts` is reached and the row is abandoned. A `circuit_open` failure
//! defers the rest of that connector's rows for the current batch.

use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

use super::types::{clamp_limit, RetriedError, RetryOptions, RetryOutcome, RetrySummary};
use super::{PullRequest, SyncOrchestrator};
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::models::{ConnectorErrorRecord, Resolution, SyncEvent, SyncEventType, TenantScope};

impl SyncOrchestrator {
    /// Re-run due, unresolved error rows of `scope`, in store order.
    ///
    /// Store failures abort the batch; runner failures never do.
    #[instrument(skip(self, options), fields(scope = %scope))]
    pub async fn retry_connector_errors(
        &self,
        scope: &TenantScope,
        options: RetryOptions,
    ) -> SyncResult<RetrySummary> {
        let limit = clamp_limit(
            options.limit,
            self.config.retry_batch_limit,
            self.config.retry_batch_ceiling,
        );
        let due = self.store.select_due_errors(scope, self.clock.now(), limit).await?;

        let mut summary = RetrySummary {
            due: due.len(),
            ..Default::default()
        };
        let mut circuit_open = HashSet::new();

        for row in due {
            if circuit_open.contains(&row.connector) {
                debug!(id = %row.id, connector = %row.connector, "Deferring retry, circuit open");
                summary.deferred += 1;
                continue;
            }

            let result = self
                .pull(PullRequest {
                    scope,
                    connector: row.connector,
                    mode: row.mode.as_str(),
                    operation: &row.operation,
                    source_ref: row.source_ref.clone(),
                    cursor: None,
                    attempt: row.attempt,
                    options: json!({}),
                })
                .await;

            let retried = match result {
                Ok(_) => {
                    self.resolve_succeeded(&row).await?;
                    summary.succeeded += 1;
                    RetriedError {
                        id: row.id.clone(),
                        connector: row.connector,
                        operation: row.operation.clone(),
                        source_ref: row.source_ref.clone(),
                        attempt: row.attempt,
                        outcome: RetryOutcome::Succeeded,
                        error: None,
                        next_retry_at: None,
                    }
                }
                Err(err) => {
                    if err.kind() == ErrorKind::CircuitOpen {
                        circuit_open.insert(row.connector);
                    }
                    summary.failed += 1;
                    let retried = self.record_retry_failure(&row, &err).await?;
                    if retried.outcome == RetryOutcome::Abandoned {
                        summary.abandoned += 1;
                    }
                    retried
                }
            };
            summary.retried.push(retried);
        }

        crate::metrics::record_retry_batch(
            summary.due,
            summary.succeeded,
            summary.failed,
            summary.deferred,
        );
        info!(
            due = summary.due,
            succeeded = summary.succeeded,
            failed = summary.failed,
            abandoned = summary.abandoned,
            deferred = summary.deferred,
            "Retry batch finished"
        );
        Ok(summary)
    }

    async fn resolve_succeeded(&self, row: &ConnectorErrorRecord) -> SyncResult<()> {
        let now = self.clock.now();
        self.store.mark_resolved(&row.id, Resolution::Succeeded, now).await?;
        let event = SyncEvent::for_error(
            SyncEventType::ErrorResolved,
            row,
            json!({
                "error_id": row.id,
                "operation": row.operation,
                "source_ref": row.source_ref,
                "attempt": row.attempt,
            }),
            now,
        );
        self.store.record_event(&event).await?;
        crate::metrics::record_error_resolved(row.connector.as_str());
        info!(id = %row.id, connector = %row.connector, attempt = row.attempt, "Connector error resolved");
        Ok(())
    }

    async fn record_retry_failure(
        &self,
        row: &ConnectorErrorRecord,
        err: &SyncError,
    ) -> SyncResult<RetriedError> {
        let now = self.clock.now();
        let attempt = row.attempt.saturating_add(1);
        let message = err.to_string();

        let mut retried = RetriedError {
            id: row.id.clone(),
            connector: row.connector,
            operation: row.operation.clone(),
            source_ref: row.source_ref.clone(),
            attempt,
            outcome: RetryOutcome::Failed,
            error: Some(message.clone()),
            next_retry_at: None,
        };

        if attempt >= self.config.max_attempts {
            // Keep the last failure on the row before closing it
            self.store
                .reschedule_error(&row.id, attempt, now, Some(&message), now)
                .await?;
            self.store.mark_resolved(&row.id, Resolution::Abandoned, now).await?;
            let event = SyncEvent::for_error(
                SyncEventType::ErrorAbandoned,
                row,
                json!({
                    "error_id": row.id,
                    "operation": row.operation,
                    "source_ref": row.source_ref,
                    "attempt": attempt,
                    "error_kind": err.code(),
                    "last_error": message,
                }),
                now,
            );
            self.store.record_event(&event).await?;
            crate::metrics::record_error_abandoned(row.connector.as_str());
            warn!(
                id = %row.id,
                connector = %row.connector,
                attempt,
                error = %err,
                "Connector error abandoned"
            );
            retried.outcome = RetryOutcome::Abandoned;
            return Ok(retried);
        }

        let next_retry_at = self.config.backoff_for(row.connector).next_retry_at(now, attempt);
        self.store
            .reschedule_error(&row.id, attempt, next_retry_at, Some(&message), now)
            .await?;
        debug!(
            id = %row.id,
            connector = %row.connector,
            attempt,
            next_retry_at = %next_retry_at,
            code = %err.code(),
            "Retry failed, rescheduled"
        );
        retried.next_retry_at = Some(next_retry_at);
        Ok(retried)
    }
}

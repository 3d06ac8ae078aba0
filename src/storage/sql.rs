// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL record store (SQLite or MySQL through the sqlx `Any` driver).
//!
//! Schema:
//! ```sql
//! CREATE TABLE connector_sync_state (
//!   scope VARCHAR(191), connector VARCHAR(32),   -- PRIMARY KEY (scope, connector)
//!   status VARCHAR(16) NOT NULL,
//!   started_at BIGINT, last_synced_at BIGINT,    -- epoch millis
//!   last_error TEXT,
//!   cursor_json LONGTEXT, counters_json LONGTEXT,
//!   updated_at BIGINT NOT NULL
//! )
//!
//! CREATE TABLE connector_errors (
//!   id VARCHAR(64) PRIMARY KEY,
//!   scope, connector, mode, operation, source_ref, error_kind,
//!   dedupe_key CHAR(40),                         -- UNIQUE (scope, dedupe_key)
//!   attempt BIGINT, next_retry_at BIGINT,
//!   last_error TEXT, resolved_at BIGINT, resolution VARCHAR(16),
//!   created_at BIGINT, updated_at BIGINT
//! )
//!
//! CREATE TABLE connector_sync_events (
//!   id, scope, connector, event_type, dedupe_key, payload LONGTEXT, created_at
//! )
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! JSON lives in TEXT/LONGTEXT columns: the `Any` driver has no MySQL JSON
//! mapping and hands LONGTEXT back as bytes, so text columns are read as
//! `String` first and `Vec<u8>` second. Timestamps are epoch milliseconds.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyConnection, AnyPool, Row};
use std::collections::BTreeMap;
use std::sync::Once;
use std::time::Duration;

use super::traits::{fold_error, StorageError, SyncStore};
use crate::backoff::BackoffPolicy;
use crate::connector::ConnectorMode;
use crate::models::{
    ConnectorErrorRecord, ConnectorId, ConnectorSyncState, ErrorDraft, ErrorStatusFilter,
    Resolution, SyncEvent, SyncStatus, TenantScope,
};
use crate::resilience::retry::{retry, RetryConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

const ERROR_COLUMNS: &str = "id, scope, connector, mode, operation, source_ref, error_kind, dedupe_key, \
     attempt, next_retry_at, last_error, resolved_at, resolution, created_at, updated_at";

const STATE_COLUMNS: &str =
    "scope, connector, status, started_at, last_synced_at, last_error, cursor_json, counters_json, updated_at";

pub struct SqlStore {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlStore {
    /// Create a new SQL store with startup-mode retry (fails fast if config is wrong).
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(if is_sqlite { 5 } else { 20 })
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        let store = Self { pool, is_sqlite };

        if is_sqlite {
            store.enable_wal_mode().await?;
        }

        store.init_schema().await?;
        Ok(store)
    }

    /// Get a clone of the connection pool for sharing with other stores.
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {}", e)))?;

        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let statements: &[&str] = if self.is_sqlite {
            &[
                r#"
                CREATE TABLE IF NOT EXISTS connector_sync_state (
                    scope TEXT NOT NULL,
                    connector TEXT NOT NULL,
                    status TEXT NOT NULL,
                    started_at INTEGER,
                    last_synced_at INTEGER,
                    last_error TEXT,
                    cursor_json TEXT,
                    counters_json TEXT,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (scope, connector)
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS connector_errors (
                    id TEXT PRIMARY KEY,
                    scope TEXT NOT NULL,
                    connector TEXT NOT NULL,
                    mode TEXT NOT NULL,
                    operation TEXT NOT NULL,
                    source_ref TEXT,
                    error_kind TEXT NOT NULL,
                    dedupe_key TEXT NOT NULL,
                    attempt INTEGER NOT NULL DEFAULT 1,
                    next_retry_at INTEGER NOT NULL,
                    last_error TEXT,
                    resolved_at INTEGER,
                    resolution TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    UNIQUE (scope, dedupe_key)
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_connector_errors_due ON connector_errors (scope, resolved_at, next_retry_at)",
                r#"
                CREATE TABLE IF NOT EXISTS connector_sync_events (
                    id TEXT PRIMARY KEY,
                    scope TEXT NOT NULL,
                    connector TEXT NOT NULL,
                    event_type TEXT NOT NULL,
                    dedupe_key TEXT,
                    payload TEXT,
                    created_at INTEGER NOT NULL
                )
                "#,
            ]
        } else {
            // LONGTEXT for JSON (sqlx Any driver doesn't support native JSON)
            &[
                r#"
                CREATE TABLE IF NOT EXISTS connector_sync_state (
                    scope VARCHAR(191) NOT NULL,
                    connector VARCHAR(32) NOT NULL,
                    status VARCHAR(16) NOT NULL,
                    started_at BIGINT,
                    last_synced_at BIGINT,
                    last_error TEXT,
                    cursor_json LONGTEXT,
                    counters_json LONGTEXT,
                    updated_at BIGINT NOT NULL,
                    PRIMARY KEY (scope, connector)
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS connector_errors (
                    id VARCHAR(64) PRIMARY KEY,
                    scope VARCHAR(191) NOT NULL,
                    connector VARCHAR(32) NOT NULL,
                    mode VARCHAR(8) NOT NULL,
                    operation VARCHAR(128) NOT NULL,
                    source_ref VARCHAR(255),
                    error_kind VARCHAR(64) NOT NULL,
                    dedupe_key CHAR(40) NOT NULL,
                    attempt BIGINT NOT NULL DEFAULT 1,
                    next_retry_at BIGINT NOT NULL,
                    last_error TEXT,
                    resolved_at BIGINT,
                    resolution VARCHAR(16),
                    created_at BIGINT NOT NULL,
                    updated_at BIGINT NOT NULL,
                    UNIQUE KEY uq_connector_errors_dedupe (scope, dedupe_key),
                    INDEX idx_connector_errors_due (scope, resolved_at, next_retry_at)
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS connector_sync_events (
                    id VARCHAR(64) PRIMARY KEY,
                    scope VARCHAR(191) NOT NULL,
                    connector VARCHAR(32) NOT NULL,
                    event_type VARCHAR(64) NOT NULL,
                    dedupe_key CHAR(40),
                    payload LONGTEXT,
                    created_at BIGINT NOT NULL,
                    INDEX idx_connector_sync_events_scope (scope, created_at)
                )
                "#,
            ]
        };

        for sql in statements {
            retry("sql_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(sql)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))
            })
            .await?;
        }

        Ok(())
    }

    /// Opens a write transaction on `conn`.
    ///
    /// SQLite takes the database write lock immediately so two folds of one
    /// fingerprint cannot both read the pre-increment row.
    async fn begin_write(&self, conn: &mut AnyConnection) -> Result<(), StorageError> {
        let begin = if self.is_sqlite { "BEGIN IMMEDIATE" } else { "BEGIN" };
        sqlx::query(begin)
            .execute(&mut *conn)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    /// Read-lock-fold-write of one fingerprint inside an open transaction.
    async fn fold_error_row(
        &self,
        conn: &mut AnyConnection,
        scope: &TenantScope,
        draft: &ErrorDraft,
        backoff: BackoffPolicy,
        now: DateTime<Utc>,
    ) -> Result<ConnectorErrorRecord, StorageError> {
        let lock = if self.is_sqlite { "" } else { " FOR UPDATE" };
        let select = format!("SELECT {ERROR_COLUMNS} FROM connector_errors WHERE scope = ? AND dedupe_key = ?{lock}");

        let existing = sqlx::query(&select)
            .bind(scope.as_str())
            .bind(draft.dedupe_key())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .as_ref()
            .map(error_from_row)
            .transpose()?;
        let exists = existing.is_some();

        let row = fold_error(existing, scope, draft, backoff, now);
        if exists {
            update_error_row(&mut *conn, &row).await?;
        } else {
            insert_error_row(&mut *conn, &row).await?;
        }
        Ok(row)
    }
}

/// Plain insert: a concurrent first insert of the same fingerprint fails on
/// `UNIQUE (scope, dedupe_key)` instead of overwriting the winner.
async fn insert_error_row(conn: &mut AnyConnection, row: &ConnectorErrorRecord) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO connector_errors (id, scope, connector, mode, operation, source_ref, error_kind, dedupe_key, \
            attempt, next_retry_at, last_error, resolved_at, resolution, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&row.id)
    .bind(row.scope.as_str())
    .bind(row.connector.as_str())
    .bind(row.mode.as_str())
    .bind(&row.operation)
    .bind(&row.source_ref)
    .bind(&row.error_kind)
    .bind(&row.dedupe_key)
    .bind(i64::from(row.attempt))
    .bind(row.next_retry_at.timestamp_millis())
    .bind(&row.last_error)
    .bind(row.resolved_at.map(|t| t.timestamp_millis()))
    .bind(row.resolution.map(|r| r.as_str()))
    .bind(row.created_at.timestamp_millis())
    .bind(row.updated_at.timestamp_millis())
    .execute(conn)
    .await
    .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(())
}

async fn update_error_row(conn: &mut AnyConnection, row: &ConnectorErrorRecord) -> Result<(), StorageError> {
    let result = sqlx::query(
        "UPDATE connector_errors SET error_kind = ?, attempt = ?, next_retry_at = ?, last_error = ?, \
         resolved_at = ?, resolution = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&row.error_kind)
    .bind(i64::from(row.attempt))
    .bind(row.next_retry_at.timestamp_millis())
    .bind(&row.last_error)
    .bind(row.resolved_at.map(|t| t.timestamp_millis()))
    .bind(row.resolution.map(|r| r.as_str()))
    .bind(row.updated_at.timestamp_millis())
    .bind(&row.id)
    .execute(conn)
    .await
    .map_err(|e| StorageError::Backend(e.to_string()))?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound {
            entity: "connector_error",
            id: row.id.clone(),
        });
    }
    Ok(())
}

/// Read a text column as String (SQLite TEXT) or bytes (MySQL LONGTEXT).
fn text(row: &AnyRow, column: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(column)
        .ok()
        .flatten()
        .or_else(|| {
            row.try_get::<Option<Vec<u8>>, _>(column)
                .ok()
                .flatten()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
}

fn required_text(row: &AnyRow, column: &str) -> Result<String, StorageError> {
    text(row, column).ok_or_else(|| StorageError::Serialization(format!("missing column {column}")))
}

fn millis(row: &AnyRow, column: &str) -> Option<DateTime<Utc>> {
    row.try_get::<Option<i64>, _>(column)
        .ok()
        .flatten()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

fn required_millis(row: &AnyRow, column: &str) -> Result<DateTime<Utc>, StorageError> {
    millis(row, column).ok_or_else(|| StorageError::Serialization(format!("missing timestamp {column}")))
}

fn parse_connector(row: &AnyRow) -> Result<ConnectorId, StorageError> {
    let raw = required_text(row, "connector")?;
    ConnectorId::parse(&raw).ok_or_else(|| StorageError::Serialization(format!("unknown connector {raw:?}")))
}

fn state_from_row(row: &AnyRow) -> Result<ConnectorSyncState, StorageError> {
    let status_raw = required_text(row, "status")?;
    let status = SyncStatus::parse(&status_raw)
        .ok_or_else(|| StorageError::Serialization(format!("unknown status {status_raw:?}")))?;
    let cursor = text(row, "cursor_json")
        .map(|s| serde_json::from_str::<Value>(&s))
        .transpose()?
        .filter(|v| !v.is_null());
    let counters = text(row, "counters_json")
        .map(|s| serde_json::from_str::<BTreeMap<String, i64>>(&s))
        .transpose()?
        .unwrap_or_default();

    Ok(ConnectorSyncState {
        scope: TenantScope::new(required_text(row, "scope")?),
        connector: parse_connector(row)?,
        status,
        started_at: millis(row, "started_at"),
        last_synced_at: millis(row, "last_synced_at"),
        last_error: text(row, "last_error"),
        cursor,
        counters,
        updated_at: required_millis(row, "updated_at")?,
    })
}

fn error_from_row(row: &AnyRow) -> Result<ConnectorErrorRecord, StorageError> {
    let mode_raw = required_text(row, "mode")?;
    let mode = ConnectorMode::parse(&mode_raw)
        .map_err(|_| StorageError::Serialization(format!("unknown mode {mode_raw:?}")))?;
    let attempt: i64 = row.try_get("attempt").unwrap_or(1);

    Ok(ConnectorErrorRecord {
        id: required_text(row, "id")?,
        scope: TenantScope::new(required_text(row, "scope")?),
        connector: parse_connector(row)?,
        mode,
        operation: required_text(row, "operation")?,
        source_ref: text(row, "source_ref"),
        error_kind: required_text(row, "error_kind")?,
        dedupe_key: required_text(row, "dedupe_key")?,
        attempt: u32::try_from(attempt.max(1)).unwrap_or(u32::MAX),
        next_retry_at: required_millis(row, "next_retry_at")?,
        last_error: text(row, "last_error"),
        resolved_at: millis(row, "resolved_at"),
        resolution: text(row, "resolution").and_then(|r| Resolution::parse(&r)),
        created_at: required_millis(row, "created_at")?,
        updated_at: required_millis(row, "updated_at")?,
    })
}

fn clamp_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl SyncStore for SqlStore {
    async fn get_sync_state(
        &self,
        scope: &TenantScope,
        connector: ConnectorId,
    ) -> Result<Option<ConnectorSyncState>, StorageError> {
        let sql = format!("SELECT {STATE_COLUMNS} FROM connector_sync_state WHERE scope = ? AND connector = ?");
        retry("sql_get_sync_state", &RetryConfig::query(), || async {
            let row = sqlx::query(&sql)
                .bind(scope.as_str())
                .bind(connector.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            row.as_ref().map(state_from_row).transpose()
        })
        .await
    }

    async fn upsert_sync_state(&self, state: &ConnectorSyncState) -> Result<(), StorageError> {
        let cursor_json = state.cursor.as_ref().map(serde_json::to_string).transpose()?;
        let counters_json = serde_json::to_string(&state.counters)?;

        let sql = if self.is_sqlite {
            "INSERT INTO connector_sync_state (scope, connector, status, started_at, last_synced_at, last_error, cursor_json, counters_json, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(scope, connector) DO UPDATE SET
                status = excluded.status,
                started_at = excluded.started_at,
                last_synced_at = excluded.last_synced_at,
                last_error = excluded.last_error,
                cursor_json = excluded.cursor_json,
                counters_json = excluded.counters_json,
                updated_at = excluded.updated_at"
        } else {
            "INSERT INTO connector_sync_state (scope, connector, status, started_at, last_synced_at, last_error, cursor_json, counters_json, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE
                status = VALUES(status),
                started_at = VALUES(started_at),
                last_synced_at = VALUES(last_synced_at),
                last_error = VALUES(last_error),
                cursor_json = VALUES(cursor_json),
                counters_json = VALUES(counters_json),
                updated_at = VALUES(updated_at)"
        };

        retry("sql_upsert_sync_state", &RetryConfig::query(), || async {
            sqlx::query(sql)
                .bind(state.scope.as_str())
                .bind(state.connector.as_str())
                .bind(state.status.as_str())
                .bind(state.started_at.map(|t| t.timestamp_millis()))
                .bind(state.last_synced_at.map(|t| t.timestamp_millis()))
                .bind(&state.last_error)
                .bind(&cursor_json)
                .bind(&counters_json)
                .bind(state.updated_at.timestamp_millis())
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn list_sync_states(&self, scope: &TenantScope) -> Result<Vec<ConnectorSyncState>, StorageError> {
        let sql = format!("SELECT {STATE_COLUMNS} FROM connector_sync_state WHERE scope = ? ORDER BY connector");
        retry("sql_list_sync_states", &RetryConfig::query(), || async {
            let rows = sqlx::query(&sql)
                .bind(scope.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            rows.iter().map(state_from_row).collect()
        })
        .await
    }

    async fn record_error(
        &self,
        scope: &TenantScope,
        draft: &ErrorDraft,
        backoff: BackoffPolicy,
        now: DateTime<Utc>,
    ) -> Result<ConnectorErrorRecord, StorageError> {
        // A concurrent first insert of the same fingerprint loses on the unique
        // key; the retry then sees the winner's row and increments it.
        retry("sql_record_error", &RetryConfig::query(), || async {
            let mut conn = self
                .pool
                .acquire()
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            self.begin_write(&mut conn).await?;

            let folded = self.fold_error_row(&mut conn, scope, draft, backoff, now).await;
            let finish = if folded.is_ok() { "COMMIT" } else { "ROLLBACK" };
            if let Err(e) = sqlx::query(finish).execute(&mut *conn).await {
                // Never hand a connection with an open transaction back to the pool.
                drop(conn.detach());
                return Err(StorageError::Backend(e.to_string()));
            }
            folded
        })
        .await
    }

    async fn select_due_errors(
        &self,
        scope: &TenantScope,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ConnectorErrorRecord>, StorageError> {
        let sql = format!(
            "SELECT {ERROR_COLUMNS} FROM connector_errors \
             WHERE scope = ? AND resolved_at IS NULL AND next_retry_at <= ? \
             ORDER BY next_retry_at, created_at, id LIMIT ?"
        );
        retry("sql_select_due_errors", &RetryConfig::query(), || async {
            let rows = sqlx::query(&sql)
                .bind(scope.as_str())
                .bind(now.timestamp_millis())
                .bind(clamp_limit(limit))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            rows.iter().map(error_from_row).collect()
        })
        .await
    }

    async fn reschedule_error(
        &self,
        id: &str,
        attempt: u32,
        next_retry_at: DateTime<Utc>,
        last_error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let result = retry("sql_reschedule_error", &RetryConfig::query(), || async {
            sqlx::query(
                "UPDATE connector_errors SET attempt = ?, next_retry_at = ?, \
                 last_error = COALESCE(?, last_error), updated_at = ? WHERE id = ?",
            )
            .bind(i64::from(attempt))
            .bind(next_retry_at.timestamp_millis())
            .bind(last_error)
            .bind(now.timestamp_millis())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "connector_error",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn mark_resolved(
        &self,
        id: &str,
        resolution: Resolution,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let result = retry("sql_mark_resolved", &RetryConfig::query(), || async {
            sqlx::query("UPDATE connector_errors SET resolved_at = ?, resolution = ?, updated_at = ? WHERE id = ?")
                .bind(at.timestamp_millis())
                .bind(resolution.as_str())
                .bind(at.timestamp_millis())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "connector_error",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn list_errors(
        &self,
        scope: &TenantScope,
        filter: ErrorStatusFilter,
        limit: usize,
    ) -> Result<Vec<ConnectorErrorRecord>, StorageError> {
        let clause = match filter {
            ErrorStatusFilter::Open => " AND resolved_at IS NULL",
            ErrorStatusFilter::Resolved => " AND resolved_at IS NOT NULL",
            ErrorStatusFilter::Abandoned => " AND resolution = 'abandoned'",
            ErrorStatusFilter::All => "",
        };
        let sql = format!(
            "SELECT {ERROR_COLUMNS} FROM connector_errors WHERE scope = ?{clause} \
             ORDER BY updated_at DESC, id LIMIT ?"
        );
        retry("sql_list_errors", &RetryConfig::query(), || async {
            let rows = sqlx::query(&sql)
                .bind(scope.as_str())
                .bind(clamp_limit(limit))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            rows.iter().map(error_from_row).collect()
        })
        .await
    }

    async fn record_event(&self, event: &SyncEvent) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&event.payload)?;
        retry("sql_record_event", &RetryConfig::query(), || async {
            sqlx::query(
                "INSERT INTO connector_sync_events (id, scope, connector, event_type, dedupe_key, payload, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&event.id)
            .bind(event.scope.as_str())
            .bind(event.connector.as_str())
            .bind(event.event_type.as_str())
            .bind(&event.dedupe_key)
            .bind(&payload)
            .bind(event.created_at.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
    }
}

//! Chaos Testing for Connector Sync
//!
//! This module tests failure scenarios using:
//! 1. **FailingSyncStore wrappers** - precise error injection at specific call counts
//! 2. **Misbehaving platforms** - local servers that hang, return garbage or stay down
//! 3. **Contention** - many concurrent cycles folding into the same error fingerprint
//!
//! # Running Chaos Tests
//! ```bash
//! cargo test --test chaos -- --nocapture
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use connector_sync::models::{ConnectorErrorRecord, ConnectorSyncState, ErrorDraft, SyncEvent};
use connector_sync::{
    BackoffPolicy, CircuitConfig, CircuitRegistry, CircuitState, ConnectorId, ConnectorRegistry,
    ErrorStatusFilter, HttpRetryPolicy, InMemoryStore, ListErrorsQuery, ManualClock, PullReport,
    Resolution, ResilientHttpClient, RetryOptions, SqlStore, StorageError, SyncConfig, SyncContext,
    SyncError, SyncOptions, SyncOrchestrator, SyncRunner, SyncStatus, SyncStore, TenantScope,
};

// =============================================================================
// Failing Store Wrapper - Precise Error Injection
// =============================================================================

/// A wrapper that injects failures into one store operation at specific call
/// counts of that operation. Other operations pass through.
pub struct FailingSyncStore<S: SyncStore> {
    inner: S,
    operation: &'static str,
    call_count: AtomicU64,
    /// Fail on these call numbers (1-indexed)
    fail_on_calls: Vec<u64>,
    error_msg: String,
    /// Whether to fail all calls from the first listed one
    fail_permanently: AtomicBool,
}

impl<S: SyncStore> FailingSyncStore<S> {
    pub fn new(inner: S, operation: &'static str, fail_on_calls: Vec<u64>, error_msg: &str) -> Self {
        Self {
            inner,
            operation,
            call_count: AtomicU64::new(0),
            fail_on_calls,
            error_msg: error_msg.to_string(),
            fail_permanently: AtomicBool::new(false),
        }
    }

    /// Create a store whose `operation` fails permanently after N calls
    pub fn fail_after(inner: S, operation: &'static str, n: u64, error_msg: &str) -> Self {
        let store = Self::new(inner, operation, vec![n + 1], error_msg);
        store.fail_permanently.store(true, Ordering::SeqCst);
        store
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn should_fail(&self, operation: &str) -> bool {
        if operation != self.operation {
            return false;
        }
        let count = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_permanently.load(Ordering::SeqCst) && !self.fail_on_calls.is_empty() {
            count >= self.fail_on_calls[0]
        } else {
            self.fail_on_calls.contains(&count)
        }
    }

    fn maybe_fail(&self, operation: &str) -> Result<(), StorageError> {
        if self.should_fail(operation) {
            Err(StorageError::Backend(self.error_msg.clone()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<S: SyncStore> SyncStore for FailingSyncStore<S> {
    async fn get_sync_state(
        &self,
        scope: &TenantScope,
        connector: ConnectorId,
    ) -> Result<Option<ConnectorSyncState>, StorageError> {
        self.maybe_fail("get_sync_state")?;
        self.inner.get_sync_state(scope, connector).await
    }

    async fn upsert_sync_state(&self, state: &ConnectorSyncState) -> Result<(), StorageError> {
        self.maybe_fail("upsert_sync_state")?;
        self.inner.upsert_sync_state(state).await
    }

    async fn list_sync_states(&self, scope: &TenantScope) -> Result<Vec<ConnectorSyncState>, StorageError> {
        self.maybe_fail("list_sync_states")?;
        self.inner.list_sync_states(scope).await
    }

    async fn record_error(
        &self,
        scope: &TenantScope,
        draft: &ErrorDraft,
        backoff: BackoffPolicy,
        now: DateTime<Utc>,
    ) -> Result<ConnectorErrorRecord, StorageError> {
        self.maybe_fail("record_error")?;
        self.inner.record_error(scope, draft, backoff, now).await
    }

    async fn select_due_errors(
        &self,
        scope: &TenantScope,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ConnectorErrorRecord>, StorageError> {
        self.maybe_fail("select_due_errors")?;
        self.inner.select_due_errors(scope, now, limit).await
    }

    async fn reschedule_error(
        &self,
        id: &str,
        attempt: u32,
        next_retry_at: DateTime<Utc>,
        last_error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.maybe_fail("reschedule_error")?;
        self.inner.reschedule_error(id, attempt, next_retry_at, last_error, now).await
    }

    async fn mark_resolved(&self, id: &str, resolution: Resolution, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.maybe_fail("mark_resolved")?;
        self.inner.mark_resolved(id, resolution, at).await
    }

    async fn list_errors(
        &self,
        scope: &TenantScope,
        filter: ErrorStatusFilter,
        limit: usize,
    ) -> Result<Vec<ConnectorErrorRecord>, StorageError> {
        self.maybe_fail("list_errors")?;
        self.inner.list_errors(scope, filter, limit).await
    }

    async fn record_event(&self, event: &SyncEvent) -> Result<(), StorageError> {
        self.maybe_fail("record_event")?;
        self.inner.record_event(event).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
}

fn acme() -> TenantScope {
    TenantScope::new("acme")
}

fn orchestrator(store: Arc<dyn SyncStore>, registry: ConnectorRegistry) -> (SyncOrchestrator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let orch = SyncOrchestrator::new(store, registry, SyncConfig::default()).with_clock(clock.clone());
    (orch, clock)
}

/// Runner that counts invocations and always fails with a 503.
fn always_unavailable(calls: Arc<AtomicUsize>) -> Arc<dyn SyncRunner> {
    Arc::new(move |_: SyncContext| {
        calls.fetch_add(1, Ordering::SeqCst);
        async {
            Err::<PullReport, _>(SyncError::HttpStatus {
                host: "api.hubapi.com".into(),
                status: 503,
            })
        }
    })
}

fn linear_runner(registry: ConnectorRegistry, runner: Arc<dyn SyncRunner>) -> ConnectorRegistry {
    registry.with_http_runner(ConnectorId::Linear, runner)
}

/// Runner that fetches `GET {base}/issues` as JSON through the resilient client.
fn http_runner(base_url: String) -> Arc<dyn SyncRunner> {
    Arc::new(move |ctx: SyncContext| {
        let url = format!("{base_url}/issues");
        async move {
            let request = ctx
                .http
                .client()
                .get(&url)
                .build()
                .map_err(|e| SyncError::fatal(e.to_string()))?;
            let _: Value = ctx.http.execute_json(request).await?;
            Ok(PullReport::default())
        }
    })
}

fn http_client(threshold: u32, reset: Duration, attempt_timeout: Duration) -> Arc<ResilientHttpClient> {
    Arc::new(ResilientHttpClient::with_policy(
        Arc::new(CircuitRegistry::new(CircuitConfig {
            failure_threshold: threshold,
            reset_timeout: reset,
        })),
        HttpRetryPolicy {
            max_retries: 2,
            backoff_base: Duration::from_millis(5),
            attempt_timeout,
        },
    ))
}

#[derive(Clone, Copy)]
enum Reply {
    Respond(u16, &'static str),
    /// Read the request, never answer
    Hang,
}

/// Local server replaying `script`; the last reply repeats.
async fn chaos_server(script: Vec<Reply>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let script = Arc::new(Mutex::new(VecDeque::from(script)));

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { return };
            counter.fetch_add(1, Ordering::SeqCst);
            let reply = {
                let mut script = script.lock();
                if script.len() > 1 { script.pop_front().unwrap() } else { *script.front().unwrap() }
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let mut read = Vec::new();
                while !read.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => read.extend_from_slice(&buf[..n]),
                    }
                }
                match reply {
                    Reply::Respond(status, body) => {
                        let response = format!(
                            "HTTP/1.1 {status} X\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                            body.len()
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    }
                    Reply::Hang => {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                }
            });
        }
    });

    (base_url, hits)
}

// =============================================================================
// Store Failures - Bookkeeping Paths
// =============================================================================

#[tokio::test]
async fn chaos_running_state_write_fails_before_pull() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(FailingSyncStore::new(InMemoryStore::new(), "upsert_sync_state", vec![1], "disk full"));
    let (orch, _) = orchestrator(store.clone(), linear_runner(ConnectorRegistry::new(), always_unavailable(calls.clone())));

    let err = orch.run_connector_sync(&acme(), "linear", SyncOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), "store_error");
    assert_eq!(calls.load(Ordering::SeqCst), 0, "runner must not run without a running state");
}

#[tokio::test]
async fn chaos_error_row_write_fails_original_error_returned() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(FailingSyncStore::fail_after(InMemoryStore::new(), "record_error", 0, "deadlock"));
    let (orch, _) = orchestrator(store.clone(), linear_runner(ConnectorRegistry::new(), always_unavailable(calls)));

    let err = orch.run_connector_sync(&acme(), "linear", SyncOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), "http_503");

    // The failed state still made it
    let state = store.inner().get_sync_state(&acme(), ConnectorId::Linear).await.unwrap().unwrap();
    assert_eq!(state.status, SyncStatus::Failed);
    assert_eq!(store.inner().error_count(), 0);
}

#[tokio::test]
async fn chaos_failed_state_write_fails_original_error_returned() {
    let calls = Arc::new(AtomicUsize::new(0));
    // Call 1 is the running state, call 2 the failed state
    let store = Arc::new(FailingSyncStore::new(InMemoryStore::new(), "upsert_sync_state", vec![2], "connection reset"));
    let (orch, _) = orchestrator(store.clone(), linear_runner(ConnectorRegistry::new(), always_unavailable(calls)));

    let err = orch.run_connector_sync(&acme(), "linear", SyncOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), "http_503");

    let state = store.inner().get_sync_state(&acme(), ConnectorId::Linear).await.unwrap().unwrap();
    assert_eq!(state.status, SyncStatus::Running);
    // Error row is still recorded
    assert_eq!(store.inner().error_count(), 1);
}

#[tokio::test]
async fn chaos_due_selection_failure_aborts_batch() {
    let store = Arc::new(FailingSyncStore::new(InMemoryStore::new(), "select_due_errors", vec![1], "timeout"));
    let (orch, _) = orchestrator(store, ConnectorRegistry::new());

    let err = orch.retry_connector_errors(&acme(), RetryOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), "store_error");
}

#[tokio::test]
async fn chaos_reschedule_failure_aborts_batch_after_first_row() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(FailingSyncStore::new(InMemoryStore::new(), "reschedule_error", vec![1], "lock wait timeout"));
    let (orch, clock) = orchestrator(store.clone(), linear_runner(ConnectorRegistry::new(), always_unavailable(calls.clone())));

    for source in ["a", "b"] {
        let options = SyncOptions { source_ref: Some(source.into()), ..Default::default() };
        orch.run_connector_sync(&acme(), "linear", options).await.unwrap_err();
    }
    clock.advance(chrono::Duration::seconds(60));
    calls.store(0, Ordering::SeqCst);

    let err = orch.retry_connector_errors(&acme(), RetryOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), "store_error");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Both rows untouched and still due
    let rows = store.inner().list_errors(&acme(), ErrorStatusFilter::Open, 10).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.attempt == 1));
}

#[tokio::test]
async fn chaos_event_write_failure_after_resolution() {
    let store = Arc::new(FailingSyncStore::new(InMemoryStore::new(), "record_event", vec![1], "event log full"));
    let flaky: Arc<dyn SyncRunner> = {
        let failed = Arc::new(AtomicBool::new(false));
        Arc::new(move |_: SyncContext| {
            let first = !failed.swap(true, Ordering::SeqCst);
            async move {
                if first {
                    Err(SyncError::platform("flaky"))
                } else {
                    Ok(PullReport::default())
                }
            }
        })
    };
    let (orch, clock) = orchestrator(store.clone(), linear_runner(ConnectorRegistry::new(), flaky));

    orch.run_connector_sync(&acme(), "linear", SyncOptions::default()).await.unwrap_err();
    clock.advance(chrono::Duration::seconds(60));

    let err = orch.retry_connector_errors(&acme(), RetryOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), "store_error");

    // The resolution itself landed; the next batch has nothing to do
    let summary = orch.retry_connector_errors(&acme(), RetryOptions::default()).await.unwrap();
    assert_eq!(summary.due, 0);
}

// =============================================================================
// Contention
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chaos_concurrent_failures_fold_into_one_row() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(InMemoryStore::new());
    let registry = ConnectorRegistry::new().with_http_runner(ConnectorId::Hubspot, always_unavailable(calls.clone()));
    let (orch, _) = orchestrator(store.clone(), registry);
    let orch = Arc::new(orch);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let orch = orch.clone();
        handles.push(tokio::spawn(async move {
            orch.run_connector_sync(&acme(), "hubspot", SyncOptions::default()).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap_err().code(), "http_503");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 20);
    assert_eq!(store.error_count(), 1);
    let rows = orch.list_connector_errors(&acme(), ListErrorsQuery::default()).await.unwrap();
    assert_eq!(rows[0].attempt, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chaos_concurrent_failures_fold_into_one_sql_row() {
    let path = std::env::temp_dir().join(format!("connector_sync_chaos_{}.db", uuid::Uuid::new_v4()));
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let store = Arc::new(SqlStore::new(&url).await.unwrap());

    let calls = Arc::new(AtomicUsize::new(0));
    let registry = ConnectorRegistry::new().with_http_runner(ConnectorId::Hubspot, always_unavailable(calls.clone()));
    let (orch, _) = orchestrator(store.clone(), registry);
    let orch = Arc::new(orch);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let orch = orch.clone();
        handles.push(tokio::spawn(async move {
            orch.run_connector_sync(&acme(), "hubspot", SyncOptions::default()).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap_err().code(), "http_503");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 16);
    let rows = store.list_errors(&acme(), ErrorStatusFilter::All, 100).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].attempt, 16);

    // The surviving row is the one later writes address.
    store.mark_resolved(&rows[0].id, Resolution::Succeeded, start()).await.unwrap();

    drop(orch);
    drop(store);
    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(format!("{}-wal", path.display()));
    let _ = std::fs::remove_file(format!("{}-shm", path.display()));
}

// =============================================================================
// Misbehaving Platforms
// =============================================================================

#[tokio::test]
async fn chaos_hanging_platform_times_out() {
    let (base_url, hits) = chaos_server(vec![Reply::Hang]).await;
    let http = http_client(5, Duration::from_secs(60), Duration::from_millis(100));
    let (orch, _) = orchestrator(Arc::new(InMemoryStore::new()), linear_runner(ConnectorRegistry::new(), http_runner(base_url)));
    let orch = orch.with_http_client(http.clone());

    let err = orch.run_connector_sync(&acme(), "linear", SyncOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), "timeout");
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let rows = orch.list_connector_errors(&acme(), ListErrorsQuery::default()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].error_kind, "timeout");
}

#[tokio::test]
async fn chaos_garbage_body_is_fatal_and_not_retried() {
    let (base_url, hits) = chaos_server(vec![Reply::Respond(200, "<html>maintenance</html>")]).await;
    let http = http_client(5, Duration::from_secs(60), Duration::from_secs(5));
    let store = Arc::new(InMemoryStore::new());
    let (orch, _) = orchestrator(store.clone(), linear_runner(ConnectorRegistry::new(), http_runner(base_url)));
    let orch = orch.with_http_client(http.clone());

    let err = orch.run_connector_sync(&acme(), "linear", SyncOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), "fatal_error");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(store.error_count(), 0);
    // The exchange completed; the breaker saw a success
    assert_eq!(http.circuits().snapshot("127.0.0.1").unwrap().state, CircuitState::Closed);
}

#[tokio::test]
async fn chaos_breaker_recovers_and_batch_drains() {
    let (base_url, hits) = chaos_server(vec![
        Reply::Respond(503, "{}"),
        Reply::Respond(503, "{}"),
        Reply::Respond(503, "{}"),
        Reply::Respond(200, "{}"),
    ])
    .await;
    let http = http_client(1, Duration::from_millis(100), Duration::from_secs(5));
    let (orch, clock) = orchestrator(Arc::new(InMemoryStore::new()), linear_runner(ConnectorRegistry::new(), http_runner(base_url)));
    let orch = orch.with_http_client(http.clone());

    let err = orch.run_connector_sync(&acme(), "linear", SyncOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), "http_503");
    let err = orch.run_connector_sync(&acme(), "linear", SyncOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), "circuit_open");
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    // Past the reset timeout a single probe goes through and closes the breaker
    tokio::time::sleep(Duration::from_millis(150)).await;
    clock.advance(chrono::Duration::seconds(60));
    let summary = orch.retry_connector_errors(&acme(), RetryOptions::default()).await.unwrap();
    assert_eq!(summary.due, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.deferred, 0);
    assert_eq!(http.circuits().snapshot("127.0.0.1").unwrap().state, CircuitState::Closed);

    let open = orch
        .list_connector_errors(&acme(), ListErrorsQuery { status: Some("open".into()), limit: None })
        .await
        .unwrap();
    assert!(open.is_empty());
}

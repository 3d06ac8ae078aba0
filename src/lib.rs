//! # Connector Sync
//!
//! Keeps tenant data pulled from third-party SaaS platforms (Zendesk, Linear,
//! Jira, HubSpot) in sync, and survives those platforms misbehaving.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SyncOrchestrator                        │
//! │  • run_connector_sync / run_connector_syncs                │
//! │  • retry_connector_errors (due rows, abandonment)          │
//! │  • listings                                                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                   (mode: connector → global → http)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Connector (pull)                         │
//! │  • Http runner: direct platform calls                      │
//! │  • Mcp runner: managed tool-execution layer                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ResilientHttpClient                         │
//! │  • Per-host circuit breaker, single half-open probe        │
//! │  • Linear backoff, Retry-After on 429, per-attempt timeout │
//! └─────────────────────────────────────────────────────────────┘
//!
//!  Bookkeeping (SyncStore: memory or SQLite/MySQL)
//!  • connector_sync_state   one row per (scope, connector)
//!  • connector_errors       one row per failure fingerprint
//!  • connector_sync_events  resolution / abandonment audit
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use connector_sync::{
//!     ConnectorId, ConnectorRegistry, PullReport, RetryOptions, SqlStore, SyncConfig,
//!     SyncContext, SyncError, SyncOptions, SyncOrchestrator, TenantScope,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SyncError> {
//!     let config = SyncConfig::from_env();
//!     let store = SqlStore::new("sqlite://connector_sync.db?mode=rwc").await?;
//!
//!     let registry = ConnectorRegistry::new().with_http_runner(
//!         ConnectorId::Linear,
//!         Arc::new(|_ctx: SyncContext| async move {
//!             // fetch, normalize, persist ...
//!             Ok::<_, SyncError>(PullReport::default().with_counter("issues", 42))
//!         }),
//!     );
//!
//!     let orchestrator = SyncOrchestrator::new(Arc::new(store), registry, config);
//!     let scope = TenantScope::new("acme");
//!
//!     orchestrator.run_connector_sync(&scope, "linear", SyncOptions::default()).await?;
//!     let summary = orchestrator.retry_connector_errors(&scope, RetryOptions::default()).await?;
//!     println!("retried {} due errors", summary.due);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`orchestrator`]: The [`SyncOrchestrator`] driving cycles and retry batches
//! - [`connector`]: Connector capability, runners and the registry
//! - [`resilience`]: Circuit breakers, retry policies, resilient HTTP client
//! - [`storage`]: Record store backends (memory, SQL)
//! - [`backoff`]: Exponential backoff and error fingerprints
//! - [`completeness`]: Reconciliation and completeness metrics

pub mod backoff;
pub mod clock;
pub mod completeness;
pub mod config;
pub mod connector;
pub mod error;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod resilience;
pub mod storage;

pub use backoff::{next_backoff_seconds, BackoffPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use completeness::{build_portfolio_metric, finalize_metric, CompletenessMetric, MetricSource};
pub use config::{HttpResilienceConfig, SyncConfig};
pub use connector::{
    Connector, ConnectorMode, ConnectorRegistry, McpInvoker, PullReport, SyncContext, SyncRunner,
};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use models::{
    ConnectorErrorRecord, ConnectorId, ConnectorSyncState, ErrorStatusFilter, Resolution,
    SyncEvent, SyncEventType, SyncStatus, TenantScope,
};
pub use orchestrator::{
    ListErrorsQuery, RetriedError, RetryOptions, RetryOutcome, RetrySummary, SyncOptions,
    SyncOrchestrator, SyncOutcome,
};
pub use resilience::circuit_breaker::{CircuitConfig, CircuitRegistry, CircuitState};
pub use resilience::http::{HttpError, ResilientHttpClient};
pub use resilience::retry::{HttpRetryPolicy, RetryConfig};
pub use storage::{InMemoryStore, SqlStore, StorageError, SyncStore};

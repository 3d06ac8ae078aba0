// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Uniform `pull` capability over two transport modes.
//!
//! A [`Connector`] is a normalized name plus a [`ConnectorRunner`]: exactly one
//! of two variants, each holding the runner for its mode (or nothing). The
//! orchestrator only ever calls [`Connector::pull`]; how a platform gets synced
//! is the runner's business.
//!
//! ```text
//! Connector::new("Linear", "http", runners)
//!        │ validate name (connector_name_required)
//!        │ validate mode (connector_mode_invalid)
//!        ▼
//! ConnectorRunner::Http(Some(r)) ── pull ──▶ r.run(ctx)
//! ConnectorRunner::Http(None)    ── pull ──▶ linear_http_not_configured
//! ```

pub mod mcp;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{SyncError, SyncResult};
use crate::models::TenantScope;
use crate::resilience::http::ResilientHttpClient;

pub use mcp::{mcp_runner, McpInvoker, McpRunner};
pub use registry::ConnectorRegistry;

/// Operation name of a scheduled cycle.
pub const DEFAULT_OPERATION: &str = "sync";

/// Transport mode of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorMode {
    /// Direct HTTP calls through the resilience layer
    Http,
    /// Indirect calls through a managed tool-execution layer
    Mcp,
}

impl ConnectorMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Mcp => "mcp",
        }
    }

    /// Trimmed, case-insensitive.
    pub fn parse(value: &str) -> SyncResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "mcp" => Ok(Self::Mcp),
            _ => Err(SyncError::ConnectorModeInvalid {
                mode: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for ConnectorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectorMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Everything a runner gets for one pull.
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub scope: TenantScope,
    /// Normalized connector name
    pub connector: String,
    pub mode: ConnectorMode,
    pub operation: String,
    /// What is being synced, when narrower than the whole connector
    pub source_ref: Option<String>,
    /// Cursor persisted by the previous successful cycle
    pub cursor: Option<Value>,
    /// 0 for scheduled cycles, the error row's attempt for retries
    pub attempt: u32,
    /// Caller-supplied options, passed through untouched
    pub options: Value,
    pub http: Arc<ResilientHttpClient>,
}

/// What a successful pull reports back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullReport {
    pub counters: BTreeMap<String, i64>,
    /// New cursor; `None` keeps the stored one
    pub cursor: Option<Value>,
}

impl PullReport {
    #[must_use]
    pub fn with_counter(mut self, name: impl Into<String>, value: i64) -> Self {
        self.counters.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_cursor(mut self, cursor: Value) -> Self {
        self.cursor = Some(cursor);
        self
    }
}

/// Platform-specific fetch/normalize/persist work for one connector.
#[async_trait]
pub trait SyncRunner: Send + Sync {
    async fn run(&self, ctx: SyncContext) -> SyncResult<PullReport>;
}

#[async_trait]
impl<F, Fut> SyncRunner for F
where
    F: Fn(SyncContext) -> Fut + Send + Sync,
    Fut: Future<Output = SyncResult<PullReport>> + Send,
{
    async fn run(&self, ctx: SyncContext) -> SyncResult<PullReport> {
        (self)(ctx).await
    }
}

/// Runners available to a connector, one slot per mode.
#[derive(Clone, Default)]
pub struct Runners {
    pub http: Option<Arc<dyn SyncRunner>>,
    pub mcp: Option<Arc<dyn SyncRunner>>,
}

/// The runner selected by a connector's mode.
#[derive(Clone)]
pub enum ConnectorRunner {
    Http(Option<Arc<dyn SyncRunner>>),
    Mcp(Option<Arc<dyn SyncRunner>>),
}

impl ConnectorRunner {
    #[must_use]
    pub fn mode(&self) -> ConnectorMode {
        match self {
            Self::Http(_) => ConnectorMode::Http,
            Self::Mcp(_) => ConnectorMode::Mcp,
        }
    }

    fn runner(&self) -> Option<&Arc<dyn SyncRunner>> {
        match self {
            Self::Http(runner) | Self::Mcp(runner) => runner.as_ref(),
        }
    }
}

impl fmt::Debug for ConnectorRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorRunner")
            .field("mode", &self.mode())
            .field("configured", &self.runner().is_some())
            .finish()
    }
}

/// A named, mode-tagged pull capability.
#[derive(Debug, Clone)]
pub struct Connector {
    name: String,
    runner: ConnectorRunner,
}

impl Connector {
    /// Validate and build. The name is trimmed and lower-cased.
    pub fn new(name: &str, mode: &str, runners: Runners) -> SyncResult<Self> {
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(SyncError::ConnectorNameRequired);
        }
        let runner = match ConnectorMode::parse(mode)? {
            ConnectorMode::Http => ConnectorRunner::Http(runners.http),
            ConnectorMode::Mcp => ConnectorRunner::Mcp(runners.mcp),
        };
        Ok(Self { name, runner })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn mode(&self) -> ConnectorMode {
        self.runner.mode()
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.runner.runner().is_some()
    }

    /// Dispatch to the runner for this connector's mode.
    pub async fn pull(&self, ctx: SyncContext) -> SyncResult<PullReport> {
        match self.runner.runner() {
            Some(runner) => runner.run(ctx).await,
            None => Err(SyncError::NotConfigured {
                connector: self.name.clone(),
                mode: self.mode(),
            }),
        }
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::mcp::{mcp_runner, McpInvoker};
use super::{Connector, Runners, SyncRunner, DEFAULT_OPERATION};
use crate::error::SyncResult;
use crate::models::ConnectorId;

/// Runners injected by configuration wiring.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    http_runners: HashMap<ConnectorId, Arc<dyn SyncRunner>>,
    mcp_invoker: Option<Arc<dyn McpInvoker>>,
}

impl ConnectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_http_runner(mut self, connector: ConnectorId, runner: Arc<dyn SyncRunner>) -> Self {
        self.register_http_runner(connector, runner);
        self
    }

    #[must_use]
    pub fn with_mcp_invoker(mut self, invoker: Arc<dyn McpInvoker>) -> Self {
        self.mcp_invoker = Some(invoker);
        self
    }

    pub fn register_http_runner(&mut self, connector: ConnectorId, runner: Arc<dyn SyncRunner>) {
        self.http_runners.insert(connector, runner);
    }

    /// HTTP runner for `name`; `None` for unrecognized or unwired connectors.
    #[must_use]
    pub fn get_http_runner(&self, name: &str) -> Option<Arc<dyn SyncRunner>> {
        ConnectorId::parse(name).and_then(|id| self.http_runners.get(&id).cloned())
    }

    /// Build the connector for `id` in the (unvalidated) `mode`.
    pub fn resolve(&self, id: ConnectorId, mode: &str) -> SyncResult<Connector> {
        let runners = Runners {
            http: self.http_runners.get(&id).cloned(),
            mcp: Some(mcp_runner(id.as_str(), DEFAULT_OPERATION, self.mcp_invoker.clone())),
        };
        Connector::new(id.as_str(), mode, runners)
    }
}

impl fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wired: Vec<_> = self.http_runners.keys().map(ConnectorId::as_str).collect();
        wired.sort_unstable();
        f.debug_struct("ConnectorRegistry")
            .field("http_runners", &wired)
            .field("mcp_invoker", &self.mcp_invoker.is_some())
            .finish()
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Runner for platforms reached through a managed tool-execution layer.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::{ConnectorMode, PullReport, SyncContext, SyncRunner};
use crate::error::{SyncError, SyncResult};

/// "Invoke a named operation on a named connector" primitive.
#[async_trait]
pub trait McpInvoker: Send + Sync {
    async fn invoke(&self, connector: &str, operation: &str, arguments: Value) -> SyncResult<Value>;
}

/// Adapts an [`McpInvoker`] to the [`SyncRunner`] contract.
pub struct McpRunner {
    connector: String,
    operation: String,
    invoker: Option<Arc<dyn McpInvoker>>,
}

impl McpRunner {
    pub fn new(
        connector: impl Into<String>,
        operation: impl Into<String>,
        invoker: Option<Arc<dyn McpInvoker>>,
    ) -> Self {
        Self {
            connector: connector.into().trim().to_ascii_lowercase(),
            operation: operation.into(),
            invoker,
        }
    }
}

impl std::fmt::Debug for McpRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpRunner")
            .field("connector", &self.connector)
            .field("operation", &self.operation)
            .field("invoker", &self.invoker.is_some())
            .finish()
    }
}

#[async_trait]
impl SyncRunner for McpRunner {
    async fn run(&self, ctx: SyncContext) -> SyncResult<PullReport> {
        let Some(invoker) = &self.invoker else {
            return Err(SyncError::NotConfigured {
                connector: self.connector.clone(),
                mode: ConnectorMode::Mcp,
            });
        };

        let arguments = json!({
            "scope": ctx.scope.as_str(),
            "operation": ctx.operation,
            "source_ref": ctx.source_ref,
            "cursor": ctx.cursor,
            "attempt": ctx.attempt,
            "options": ctx.options,
        });
        debug!(connector = %self.connector, operation = %self.operation, "Invoking MCP tool");
        let result = invoker.invoke(&self.connector, &self.operation, arguments).await?;
        Ok(report_from_result(&result))
    }
}

/// Wrap `invoker` into a runner bound to `connector` and `operation`.
///
/// Without an invoker the runner always fails with `<connector>_mcp_not_configured`.
pub fn mcp_runner(
    connector: &str,
    operation: &str,
    invoker: Option<Arc<dyn McpInvoker>>,
) -> Arc<dyn SyncRunner> {
    Arc::new(McpRunner::new(connector, operation, invoker))
}

/// Integer entries of `counters` become counters; a non-null `cursor` becomes the cursor.
fn report_from_result(result: &Value) -> PullReport {
    let counters = result
        .get("counters")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(name, value)| value.as_i64().map(|v| (name.clone(), v)))
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();

    let cursor = result.get("cursor").filter(|c| !c.is_null()).cloned();

    PullReport { counters, cursor }
}

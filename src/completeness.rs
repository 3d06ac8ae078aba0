// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Completeness of locally replicated data relative to the source of truth.
//!
//! Pure functions. Conventions:
//!
//! - nothing to be incomplete about is 100%, never 0% (zero totals, empty lists)
//! - NaN is 0%
//! - the portfolio score is weighted by each connector's `total_count`, so a
//!   connector with a handful of records can't swing it
//!
//! # Example
//!
//! ```
//! use connector_sync::completeness::{build_portfolio_metric, finalize_metric, MetricSource};
//! use serde_json::json;
//!
//! let big = finalize_metric("zendesk", MetricSource::Auto, 1000, 0, 0, None);
//! let tiny = finalize_metric("hubspot", MetricSource::Auto, 1, 1, 0, None);
//! let portfolio = build_portfolio_metric(MetricSource::Auto, &[big, tiny]);
//! assert!(portfolio.completeness_pct > 99.0);
//! assert_eq!(portfolio.payload["by_connector"].as_array().unwrap().len(), 2);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Connector name of aggregated metrics.
pub const PORTFOLIO_CONNECTOR: &str = "portfolio";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricSource {
    /// Derived from reconciliation counts
    Auto,
    /// Entered or reported by a person
    Manual,
}

impl MetricSource {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

/// Computed completeness of one connector (or the portfolio). Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessMetric {
    pub connector: String,
    pub source: MetricSource,
    pub total_count: i64,
    pub missing_count: i64,
    pub duplicate_count: i64,
    /// 0..=100
    pub completeness_pct: f64,
    pub payload: Value,
}

/// `ok / total` as a percentage. `total <= 0` is 100; negative `ok` counts as 0.
#[must_use]
pub fn percent_of(ok: f64, total: f64) -> f64 {
    if total.is_nan() || total <= 0.0 {
        return 100.0;
    }
    clamp_percent(ok.max(0.0) * 100.0 / total)
}

/// Clamp to `[0, 100]`; NaN is 0.
#[must_use]
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Mean of clamped values; empty is 100.
#[must_use]
pub fn average_percent(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 100.0;
    }
    let sum: f64 = values.iter().copied().map(clamp_percent).sum();
    sum / values.len() as f64
}

/// Build a connector metric from raw counts.
///
/// Counts are clamped to be non-negative. A numeric `completeness_pct` already in
/// the payload wins over the derived `(total - missing - duplicate) / total`.
#[must_use]
pub fn finalize_metric(
    connector: &str,
    source: MetricSource,
    total: i64,
    missing: i64,
    duplicate: i64,
    payload: Option<Value>,
) -> CompletenessMetric {
    let total = total.max(0);
    let missing = missing.max(0);
    let duplicate = duplicate.max(0);
    let payload = match payload {
        Some(Value::Null) | None => Value::Object(Map::new()),
        Some(value) => value,
    };

    let completeness_pct = match payload.get("completeness_pct").and_then(Value::as_f64) {
        Some(reported) => reported,
        None if total == 0 => 100.0,
        None => {
            let remaining = total.saturating_sub(missing).saturating_sub(duplicate);
            clamp_percent(remaining as f64 * 100.0 / total as f64)
        }
    };

    CompletenessMetric {
        connector: connector.to_string(),
        source,
        total_count: total,
        missing_count: missing,
        duplicate_count: duplicate,
        completeness_pct,
        payload,
    }
}

/// Aggregate per-connector metrics into one `portfolio` metric.
///
/// Counts are summed. Completeness is the `total_count`-weighted mean of the
/// clamped per-connector values; if every total is zero it falls back to the
/// plain mean. `payload.by_connector` keeps the inputs for drill-down.
#[must_use]
pub fn build_portfolio_metric(source: MetricSource, metrics: &[CompletenessMetric]) -> CompletenessMetric {
    let total: i64 = metrics.iter().map(|m| m.total_count.max(0)).fold(0, i64::saturating_add);
    let missing: i64 = metrics.iter().map(|m| m.missing_count.max(0)).fold(0, i64::saturating_add);
    let duplicate: i64 = metrics.iter().map(|m| m.duplicate_count.max(0)).fold(0, i64::saturating_add);

    let completeness_pct = if total > 0 {
        let weighted: f64 = metrics
            .iter()
            .map(|m| clamp_percent(m.completeness_pct) * m.total_count.max(0) as f64)
            .sum();
        clamp_percent(weighted / total as f64)
    } else {
        let values: Vec<f64> = metrics.iter().map(|m| m.completeness_pct).collect();
        average_percent(&values)
    };

    let by_connector: Vec<Value> = metrics
        .iter()
        .map(|m| serde_json::to_value(m).unwrap_or(Value::Null))
        .collect();

    CompletenessMetric {
        connector: PORTFOLIO_CONNECTOR.to_string(),
        source,
        total_count: total,
        missing_count: missing,
        duplicate_count: duplicate,
        completeness_pct,
        payload: json!({ "by_connector": by_connector }),
    }
}

/// Counts derived from comparing identifier lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileCounts {
    /// Distinct identifiers at the source
    pub total: i64,
    /// Source identifiers with no local copy
    pub missing: i64,
    /// Surplus local copies of the same identifier
    pub duplicate: i64,
    /// Local identifiers the source doesn't know about
    pub orphaned: i64,
}

#[must_use]
pub fn reconcile_ids<T>(source_ids: &[T], local_ids: &[T]) -> ReconcileCounts
where
    T: Eq + Hash,
{
    let source: HashSet<&T> = source_ids.iter().collect();

    let mut local: HashMap<&T, i64> = HashMap::with_capacity(local_ids.len());
    for id in local_ids {
        *local.entry(id).or_insert(0) += 1;
    }

    let missing = source.iter().filter(|id| !local.contains_key(*id)).count();
    let duplicate: i64 = local.values().map(|copies| copies - 1).sum();
    let orphaned = local.keys().filter(|id| !source.contains(*id)).count();

    ReconcileCounts {
        total: source.len() as i64,
        missing: missing as i64,
        duplicate,
        orphaned: orphaned as i64,
    }
}

/// `auto` metric straight from identifier lists.
#[must_use]
pub fn auto_metric<T>(connector: &str, source_ids: &[T], local_ids: &[T]) -> CompletenessMetric
where
    T: Eq + Hash,
{
    let counts = reconcile_ids(source_ids, local_ids);
    finalize_metric(
        connector,
        MetricSource::Auto,
        counts.total,
        counts.missing,
        counts.duplicate,
        Some(json!({ "orphaned_count": counts.orphaned })),
    )
}

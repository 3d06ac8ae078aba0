//! Property-based tests (fuzzing) for connector sync invariants.
//!
//! Uses proptest to generate random/malformed inputs and verify the pure
//! building blocks never panic and always stay within their documented bounds.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::time::Duration;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;

use connector_sync::backoff::{add_seconds, dedupe_key_for_error, DedupeFields};
use connector_sync::completeness::{
    average_percent, build_portfolio_metric, clamp_percent, finalize_metric, percent_of,
    reconcile_ids, MetricSource,
};
use connector_sync::error::truncate_message;
use connector_sync::models::ErrorDraft;
use connector_sync::orchestrator::clamp_limit;
use connector_sync::resilience::retry::parse_retry_after;
use connector_sync::storage::traits::fold_error;
use connector_sync::{
    next_backoff_seconds, BackoffPolicy, ConnectorId, ConnectorMode, ErrorStatusFilter,
    HttpRetryPolicy, TenantScope,
};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Any f64, including NaN and infinities
fn any_float() -> impl Strategy<Value = f64> {
    prop_oneof![
        any::<f64>(),
        Just(f64::NAN),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
        -1000.0f64..1000.0,
    ]
}

fn optional_field() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[a-zA-Z0-9:_|-]{0,20}")
}

fn connector_id() -> impl Strategy<Value = ConnectorId> {
    prop::sample::select(ConnectorId::ALL.to_vec())
}

// =============================================================================
// Backoff
// =============================================================================

proptest! {
    #[test]
    fn fuzz_backoff_is_monotonic_and_capped(
        base in 0u64..100_000,
        cap in 0u64..1_000_000,
        attempt in 0u32..10_000,
    ) {
        let current = next_backoff_seconds(attempt, base, cap);
        let next = next_backoff_seconds(attempt.saturating_add(1), base, cap);
        prop_assert!(current <= cap);
        prop_assert!(next >= current);
        prop_assert!(current >= base.min(cap));
    }

    #[test]
    fn fuzz_backoff_never_overflows(base in any::<u64>(), cap in any::<u64>(), attempt in any::<u32>()) {
        let delay = next_backoff_seconds(attempt, base, cap);
        prop_assert!(delay <= cap);
    }

    #[test]
    fn fuzz_add_seconds_never_panics(seconds in any::<i64>()) {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let shifted = add_seconds(start, seconds);
        if seconds >= 0 {
            prop_assert!(shifted >= start);
        } else {
            prop_assert!(shifted <= start);
        }
    }
}

// =============================================================================
// Error fingerprints
// =============================================================================

proptest! {
    #[test]
    fn fuzz_dedupe_key_is_deterministic_hex(
        connector in optional_field(),
        mode in optional_field(),
        operation in optional_field(),
        source_ref in optional_field(),
        error_kind in optional_field(),
    ) {
        let fields = DedupeFields {
            connector: connector.as_deref(),
            mode: mode.as_deref(),
            operation: operation.as_deref(),
            source_ref: source_ref.as_deref(),
            error_kind: error_kind.as_deref(),
        };
        let key = dedupe_key_for_error(&fields);
        prop_assert_eq!(key.len(), 40);
        prop_assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        prop_assert_eq!(key, dedupe_key_for_error(&fields));
    }

    #[test]
    fn fuzz_repeated_folds_count_attempts(
        connector in connector_id(),
        failures in 1u32..30,
        base in 1u64..600,
    ) {
        let scope = TenantScope::new("acme");
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let draft = ErrorDraft {
            connector,
            mode: ConnectorMode::Http,
            operation: "sync".into(),
            source_ref: None,
            error_kind: "http_503".into(),
            message: "down".into(),
        };
        let backoff = BackoffPolicy::new(base);

        let mut row = None;
        for _ in 0..failures {
            row = Some(fold_error(row, &scope, &draft, backoff, now));
        }
        let row = row.unwrap();
        prop_assert_eq!(row.attempt, failures);
        prop_assert_eq!(&row.dedupe_key, &draft.dedupe_key());
        prop_assert_eq!(row.next_retry_at, backoff.next_retry_at(now, failures));
        prop_assert!(row.is_open());
    }
}

// =============================================================================
// Parsers never panic
// =============================================================================

proptest! {
    #[test]
    fn fuzz_connector_id_parse(input in ".{0,30}") {
        if let Some(id) = ConnectorId::parse(&input) {
            prop_assert_eq!(id.as_str(), input.trim().to_ascii_lowercase());
        }
    }

    #[test]
    fn fuzz_connector_mode_parse(input in ".{0,30}") {
        match ConnectorMode::parse(&input) {
            Ok(mode) => prop_assert_eq!(mode.as_str(), input.trim().to_ascii_lowercase()),
            Err(err) => prop_assert_eq!(err.code(), "connector_mode_invalid"),
        }
    }

    #[test]
    fn fuzz_status_filter_parse(input in ".{0,30}") {
        if let Err(err) = ErrorStatusFilter::parse(Some(&input)) {
            prop_assert_eq!(err.code(), "invalid_input");
        }
    }

    #[test]
    fn fuzz_retry_after_parse(input in ".{0,40}") {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let _ = parse_retry_after(&input, now);
    }

    #[test]
    fn fuzz_retry_after_numeric_headers_stay_bounded(
        header in prop_oneof![
            "[0-9]{1,40}",
            "[0-9]{1,6}\\.[0-9]{1,6}",
            "[1-9]e[0-9]{1,3}",
            any::<f64>().prop_map(|v| v.abs().to_string()),
        ],
    ) {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let policy = HttpRetryPolicy::default();
        let parsed = parse_retry_after(&header, now);
        let delay = policy.rate_limit_delay(0, parsed);
        prop_assert!(delay >= Duration::from_secs(1));
        prop_assert!(delay <= Duration::from_secs(120));
    }

    #[test]
    fn fuzz_truncate_message(message in ".{0,200}", max in 0usize..100) {
        let truncated = truncate_message(&message, max);
        prop_assert!(truncated.chars().count() <= max);
        prop_assert!(message.starts_with(&truncated));
    }
}

// =============================================================================
// Limits and waits stay in range
// =============================================================================

proptest! {
    #[test]
    fn fuzz_clamp_limit(requested in prop::option::of(any::<usize>()), default in any::<usize>(), ceiling in 0usize..10_000) {
        let limit = clamp_limit(requested, default, ceiling);
        prop_assert!(limit >= 1);
        prop_assert!(limit <= ceiling.max(1));
    }

    #[test]
    fn fuzz_rate_limit_delay_bounds(index in any::<u32>(), retry_after_ms in prop::option::of(any::<u64>())) {
        let policy = HttpRetryPolicy::default();
        let delay = policy.rate_limit_delay(index, retry_after_ms.map(Duration::from_millis));
        prop_assert!(delay >= Duration::from_secs(1));
        prop_assert!(delay <= Duration::from_secs(120));
    }
}

// =============================================================================
// Completeness
// =============================================================================

proptest! {
    #[test]
    fn fuzz_percentages_stay_in_bounds(ok in any_float(), total in any_float(), values in prop::collection::vec(any_float(), 0..20)) {
        let pct = percent_of(ok, total);
        prop_assert!((0.0..=100.0).contains(&pct));
        prop_assert!((0.0..=100.0).contains(&clamp_percent(ok)));
        let avg = average_percent(&values);
        prop_assert!((0.0..=100.0).contains(&avg));
    }

    #[test]
    fn fuzz_finalize_metric_bounds(total in any::<i64>(), missing in any::<i64>(), duplicate in any::<i64>()) {
        let metric = finalize_metric("linear", MetricSource::Auto, total, missing, duplicate, None);
        prop_assert!((0.0..=100.0).contains(&metric.completeness_pct));
        prop_assert!(metric.total_count >= 0 && metric.missing_count >= 0 && metric.duplicate_count >= 0);
    }

    #[test]
    fn fuzz_portfolio_bounds(counts in prop::collection::vec((0i64..10_000, 0i64..10_000, 0i64..10_000), 0..8)) {
        let metrics: Vec<_> = counts
            .iter()
            .enumerate()
            .map(|(i, (total, missing, duplicate))| {
                finalize_metric(&format!("c{i}"), MetricSource::Manual, *total, *missing, *duplicate, Some(json!({})))
            })
            .collect();
        let portfolio = build_portfolio_metric(MetricSource::Manual, &metrics);
        prop_assert!((0.0..=100.0).contains(&portfolio.completeness_pct));
        prop_assert_eq!(portfolio.total_count, counts.iter().map(|c| c.0).sum::<i64>());
        prop_assert_eq!(portfolio.payload["by_connector"].as_array().map(Vec::len), Some(metrics.len()));
    }

    #[test]
    fn fuzz_reconcile_accounts_for_every_local_copy(
        source in prop::collection::vec(0u16..50, 0..100),
        local in prop::collection::vec(0u16..60, 0..100),
    ) {
        let counts = reconcile_ids(&source, &local);
        prop_assert!(counts.missing <= counts.total);
        prop_assert!(counts.total as usize <= source.len());
        prop_assert_eq!(
            local.len() as i64,
            counts.total - counts.missing + counts.orphaned + counts.duplicate
        );
    }
}

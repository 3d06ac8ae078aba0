// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP resilience: per-host circuit breakers, retry policies and the
//! retrying request wrapper that combines them.

pub mod circuit_breaker;
pub mod http;
pub mod retry;

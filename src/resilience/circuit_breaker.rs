// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-destination-host circuit breakers.
//!
//! Protects external platforms from being hammered during outages. Every
//! connector calling the same host shares one breaker, so a Zendesk outage seen
//! by one sync cycle also sheds load for every other cycle targeting it.
//!
//! States:
//! - Closed: Normal operation, requests pass through
//! - Open: Host unhealthy, requests fail-fast without attempting
//! - HalfOpen: Reset timeout elapsed, exactly one probe request in flight
//!
//! Admission hands out a [`CircuitPermit`]; the caller reports the outcome of the
//! whole logical call through it exactly once. A probe permit dropped without a
//! report counts as a failed probe.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state for metrics/monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed = 0,
    HalfOpen = 1,
    Open = 2,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::HalfOpen => write!(f, "half-open"),
            Self::Open => write!(f, "open"),
        }
    }
}

/// Configuration shared by every breaker in a registry.
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Consecutive failures that trip the breaker
    pub failure_threshold: u32,
    /// Time since the last failure before a probe is allowed
    pub reset_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitConfig {
    /// Fast trip and recovery for testing
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            failure_threshold: 2,
            reset_timeout: Duration::from_millis(50),
        }
    }
}

/// Point-in-time view of one host's breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failures: u32,
    pub last_failure_at: Option<Instant>,
}

#[derive(Debug)]
struct BreakerRecord {
    state: CircuitState,
    failures: u32,
    last_failure_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Breaker for a single destination host.
#[derive(Debug)]
pub struct HostCircuit {
    host: String,
    config: CircuitConfig,
    record: Mutex<BreakerRecord>,
}

impl HostCircuit {
    pub fn new(host: impl Into<String>, config: CircuitConfig) -> Self {
        Self {
            host: host.into(),
            config,
            record: Mutex::new(BreakerRecord {
                state: CircuitState::Closed,
                failures: 0,
                last_failure_at: None,
                probe_in_flight: false,
            }),
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn snapshot(&self) -> CircuitSnapshot {
        let record = self.record.lock();
        CircuitSnapshot {
            state: record.state,
            failures: record.failures,
            last_failure_at: record.last_failure_at,
        }
    }

    /// Admit one logical call, or `None` if the breaker rejects it.
    pub fn try_acquire(self: &Arc<Self>) -> Option<CircuitPermit> {
        let mut record = self.record.lock();
        let probe = match record.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled = record
                    .last_failure_at
                    .map_or(true, |at| at.elapsed() >= self.config.reset_timeout);
                if !cooled {
                    drop(record);
                    crate::metrics::record_circuit_call(&self.host, "rejected");
                    return None;
                }
                info!(host = %self.host, "Circuit breaker half-open, admitting probe");
                record.state = CircuitState::HalfOpen;
                record.probe_in_flight = true;
                crate::metrics::set_circuit_state(&self.host, CircuitState::HalfOpen as u8);
                true
            }
            CircuitState::HalfOpen => {
                if record.probe_in_flight {
                    drop(record);
                    crate::metrics::record_circuit_call(&self.host, "rejected");
                    return None;
                }
                record.probe_in_flight = true;
                true
            }
        };

        Some(CircuitPermit {
            circuit: Arc::clone(self),
            probe,
            reported: false,
        })
    }

    fn on_success(&self, probe: bool) {
        let mut record = self.record.lock();
        if probe {
            record.probe_in_flight = false;
        }
        let previous = record.state;
        match record.state {
            CircuitState::Closed => {
                record.failures = 0;
            }
            CircuitState::HalfOpen if probe => {
                record.state = CircuitState::Closed;
                record.failures = 0;
                record.last_failure_at = None;
            }
            // A call admitted before the breaker tripped finished late; it says
            // nothing about the probe, which decides the transition.
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
        let state = record.state;
        drop(record);

        if previous != state {
            info!(host = %self.host, "Circuit breaker closed after successful probe");
            crate::metrics::set_circuit_state(&self.host, state as u8);
        }
        crate::metrics::record_circuit_call(&self.host, "success");
    }

    fn on_failure(&self, probe: bool) {
        let mut record = self.record.lock();
        if probe {
            record.probe_in_flight = false;
        }
        let previous = record.state;
        let now = Instant::now();
        match record.state {
            CircuitState::Closed => {
                record.failures = record.failures.saturating_add(1);
                if record.failures >= self.config.failure_threshold {
                    record.state = CircuitState::Open;
                    record.last_failure_at = Some(now);
                }
            }
            CircuitState::HalfOpen if probe => {
                record.failures = record.failures.saturating_add(1);
                record.state = CircuitState::Open;
                record.last_failure_at = Some(now);
            }
            CircuitState::HalfOpen => {}
            CircuitState::Open => {
                record.failures = record.failures.saturating_add(1);
                record.last_failure_at = Some(now);
            }
        }
        let (state, failures) = (record.state, record.failures);
        drop(record);

        if previous != state {
            warn!(
                host = %self.host,
                failures,
                from = %previous,
                "Circuit breaker opened"
            );
            crate::metrics::set_circuit_state(&self.host, state as u8);
        } else {
            debug!(host = %self.host, failures, state = %state, "Circuit call failed");
        }
        crate::metrics::record_circuit_call(&self.host, "failure");
    }
}

/// Admission ticket for one logical call through a [`HostCircuit`].
#[derive(Debug)]
#[must_use = "report the call outcome through the permit"]
pub struct CircuitPermit {
    circuit: Arc<HostCircuit>,
    probe: bool,
    reported: bool,
}

impl CircuitPermit {
    /// True when this call is the single half-open probe.
    #[must_use]
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn succeed(mut self) {
        self.reported = true;
        self.circuit.on_success(self.probe);
    }

    pub fn fail(mut self) {
        self.reported = true;
        self.circuit.on_failure(self.probe);
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        if !self.reported && self.probe {
            self.circuit.on_failure(true);
        }
    }
}

/// Concurrent map of breakers keyed by destination host.
#[derive(Debug, Default)]
pub struct CircuitRegistry {
    config: CircuitConfig,
    hosts: DashMap<String, Arc<HostCircuit>>,
}

impl CircuitRegistry {
    #[must_use]
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            hosts: DashMap::new(),
        }
    }

    /// Process-wide registry shared by every client built without an explicit one.
    pub fn shared() -> Arc<CircuitRegistry> {
        static SHARED: OnceLock<Arc<CircuitRegistry>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(CircuitRegistry::default())))
    }

    #[must_use]
    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    /// Breaker for `host`, created lazily.
    pub fn circuit(&self, host: &str) -> Arc<HostCircuit> {
        let key = host.trim().to_ascii_lowercase();
        if let Some(existing) = self.hosts.get(&key) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .hosts
            .entry(key.clone())
            .or_insert_with(|| Arc::new(HostCircuit::new(key, self.config.clone())));
        Arc::clone(entry.value())
    }

    #[must_use]
    pub fn snapshot(&self, host: &str) -> Option<CircuitSnapshot> {
        let key = host.trim().to_ascii_lowercase();
        self.hosts.get(&key).map(|c| c.snapshot())
    }

    /// Snapshots of every host seen so far.
    #[must_use]
    pub fn snapshots(&self) -> Vec<(String, CircuitSnapshot)> {
        let mut out: Vec<_> = self
            .hosts
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retrying HTTP request wrapper guarded by per-host circuit breakers.
//!
//! One logical call:
//!
//! ```text
//! breaker admission ──reject──▶ HttpError::CircuitOpen (no I/O)
//!        │
//!        ▼
//! attempt 0 ─┬─ ok / non-retryable status ─────────▶ breaker success, return
//!            ├─ timeout / transport / 408,425,5xx ─▶ sleep base*(i+1) ─▶ attempt i+1
//!            └─ 429 ───────────────────────────────▶ sleep Retry-After ─▶ attempt i+1
//! last attempt fails ──────────────────────────────▶ breaker failure, raise last error
//! ```
//!
//! Retries block the calling task inline, so a cycle's duration includes its
//! retry cost and callers can bound the whole thing with one outer timeout.

use chrono::Utc;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::circuit_breaker::CircuitRegistry;
use super::retry::{is_retryable_status, parse_retry_after, HttpRetryPolicy};
use crate::error::SyncError;

/// Failure of one logical HTTP call.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("circuit open for {host}")]
    CircuitOpen { host: String },

    #[error("request to {host} timed out after {timeout:?}")]
    Timeout { host: String, timeout: Duration },

    #[error("transport error calling {host}: {message}")]
    Transport { host: String, message: String },

    #[error("{host} responded with HTTP {status}")]
    Status { host: String, status: u16 },

    #[error("could not decode response from {host}: {message}")]
    Decode { host: String, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<HttpError> for SyncError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::CircuitOpen { host } => SyncError::CircuitOpen { host },
            HttpError::Timeout { host, timeout } => SyncError::Timeout {
                host,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            HttpError::Transport { host, message } => SyncError::Network { host, message },
            HttpError::Status { host, status } => SyncError::HttpStatus { host, status },
            HttpError::Decode { host, message } => SyncError::Fatal {
                message: format!("{host}: {message}"),
            },
            HttpError::InvalidRequest(message) => SyncError::InvalidInput(message),
        }
    }
}

/// An attempt that produced no response at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub message: String,
}

impl TransportFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<reqwest::Error> for TransportFailure {
    fn from(err: reqwest::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// What the retry loop needs to know about a response.
pub trait ResponseMeta {
    fn status_code(&self) -> u16;
    /// Header lookup, case-insensitive.
    fn header_value(&self, name: &str) -> Option<String>;
}

impl ResponseMeta for reqwest::Response {
    fn status_code(&self) -> u16 {
        self.status().as_u16()
    }

    fn header_value(&self, name: &str) -> Option<String> {
        self.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

/// Retry loop plus breaker bookkeeping, independent of the HTTP client.
#[derive(Debug, Clone)]
pub struct ResilientCaller {
    circuits: Arc<CircuitRegistry>,
    policy: HttpRetryPolicy,
}

impl ResilientCaller {
    #[must_use]
    pub fn new(circuits: Arc<CircuitRegistry>, policy: HttpRetryPolicy) -> Self {
        Self { circuits, policy }
    }

    #[must_use]
    pub fn circuits(&self) -> &Arc<CircuitRegistry> {
        &self.circuits
    }

    #[must_use]
    pub fn policy(&self) -> &HttpRetryPolicy {
        &self.policy
    }

    fn without_retries(&self) -> Self {
        Self {
            circuits: Arc::clone(&self.circuits),
            policy: HttpRetryPolicy {
                max_retries: 0,
                ..self.policy.clone()
            },
        }
    }

    /// Run one logical call against `host`.
    ///
    /// `attempt` receives the 0-based attempt index and performs a single try.
    /// Non-retryable responses are returned as `Ok`; the caller inspects them.
    pub async fn call<T, F, Fut>(&self, host: &str, mut attempt: F) -> Result<T, HttpError>
    where
        T: ResponseMeta,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportFailure>>,
    {
        let circuit = self.circuits.circuit(host);
        let Some(permit) = circuit.try_acquire() else {
            debug!(host = %host, "Request rejected by open circuit");
            crate::metrics::record_http_attempt(host, "rejected");
            return Err(HttpError::CircuitOpen {
                host: host.to_string(),
            });
        };

        let max_attempts = self.policy.max_attempts();
        let mut index = 0u32;

        loop {
            let outcome = timeout(self.policy.attempt_timeout, attempt(index)).await;
            let last = index + 1 >= max_attempts;

            let (error, wait) = match outcome {
                Err(_) => {
                    crate::metrics::record_http_attempt(host, "timeout");
                    (
                        HttpError::Timeout {
                            host: host.to_string(),
                            timeout: self.policy.attempt_timeout,
                        },
                        self.policy.linear_delay(index),
                    )
                }
                Ok(Err(failure)) => {
                    crate::metrics::record_http_attempt(host, "transport_error");
                    (
                        HttpError::Transport {
                            host: host.to_string(),
                            message: failure.message,
                        },
                        self.policy.linear_delay(index),
                    )
                }
                Ok(Ok(response)) => {
                    let status = response.status_code();
                    if !is_retryable_status(status) {
                        crate::metrics::record_http_attempt(host, "completed");
                        permit.succeed();
                        return Ok(response);
                    }
                    crate::metrics::record_http_attempt(host, "retryable_status");
                    let wait = if status == 429 {
                        let retry_after = response
                            .header_value("retry-after")
                            .and_then(|v| parse_retry_after(&v, Utc::now()));
                        self.policy.rate_limit_delay(index, retry_after)
                    } else {
                        self.policy.linear_delay(index)
                    };
                    (
                        HttpError::Status {
                            host: host.to_string(),
                            status,
                        },
                        wait,
                    )
                }
            };

            if last {
                warn!(
                    host = %host,
                    attempts = index + 1,
                    error = %error,
                    "HTTP call failed after exhausting retries"
                );
                permit.fail();
                return Err(error);
            }

            warn!(
                host = %host,
                attempt = index + 1,
                max_attempts,
                wait_ms = wait.as_millis() as u64,
                error = %error,
                "Retryable HTTP failure, backing off"
            );
            sleep(wait).await;
            index += 1;
        }
    }
}

/// `reqwest` client wrapped in the resilience layer.
#[derive(Debug, Clone)]
pub struct ResilientHttpClient {
    client: reqwest::Client,
    caller: ResilientCaller,
}

impl ResilientHttpClient {
    #[must_use]
    pub fn new(client: reqwest::Client, circuits: Arc<CircuitRegistry>, policy: HttpRetryPolicy) -> Self {
        Self {
            client,
            caller: ResilientCaller::new(circuits, policy),
        }
    }

    /// Plain client; per-attempt timeouts come from the policy.
    #[must_use]
    pub fn with_policy(circuits: Arc<CircuitRegistry>, policy: HttpRetryPolicy) -> Self {
        Self::new(reqwest::Client::new(), circuits, policy)
    }

    /// The underlying client, for building requests.
    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    #[must_use]
    pub fn circuits(&self) -> &Arc<CircuitRegistry> {
        self.caller.circuits()
    }

    /// Execute `request` with retries and breaker protection.
    ///
    /// Requests with streaming bodies cannot be replayed and get a single attempt.
    pub async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, HttpError> {
        let host = request
            .url()
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| HttpError::InvalidRequest(format!("no host in {}", request.url())))?;

        if request.try_clone().is_none() {
            let client = self.client.clone();
            let mut pending = Some(request);
            return self
                .caller
                .without_retries()
                .call(&host, move |_| {
                    let client = client.clone();
                    let request = pending.take();
                    async move {
                        match request {
                            Some(request) => client.execute(request).await.map_err(TransportFailure::from),
                            None => Err(TransportFailure::new("request body cannot be replayed")),
                        }
                    }
                })
                .await;
        }

        let client = self.client.clone();
        self.caller
            .call(&host, move |_| {
                let client = client.clone();
                let request = request.try_clone();
                async move {
                    match request {
                        Some(request) => client.execute(request).await.map_err(TransportFailure::from),
                        None => Err(TransportFailure::new("request body cannot be replayed")),
                    }
                }
            })
            .await
    }

    /// Execute and decode a JSON body; non-2xx final responses become [`HttpError::Status`].
    pub async fn execute_json<T: DeserializeOwned>(&self, request: reqwest::Request) -> Result<T, HttpError> {
        let host = request.url().host_str().unwrap_or_default().to_string();
        let response = self.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                host,
                status: status.as_u16(),
            });
        }
        response.json::<T>().await.map_err(|e| HttpError::Decode {
            host,
            message: e.to_string(),
        })
    }
}

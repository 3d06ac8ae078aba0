// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error taxonomy for the connector sync engine.
//!
//! Every failure is a [`SyncError`] variant. Callers branch on [`SyncError::kind()`]
//! rather than on message text; [`SyncError::code()`] yields the stable,
//! wire-visible identifier (`unsupported_connector`, `linear_http_not_configured`,
//! `circuit_open`, ...) that gets persisted in error rows and surfaced to ops tooling.

use std::borrow::Cow;
use thiserror::Error;

use crate::connector::ConnectorMode;
use crate::resilience::retry::is_retryable_status;
use crate::storage::traits::StorageError;

/// Coarse classification used for retry and bookkeeping decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Setup/dispatch problem. Never retried; configuration must be fixed.
    Configuration,
    /// Connector name outside the known set. Rejected before any state write.
    Unsupported,
    /// Platform hiccup: network, timeout, 408/425/429/5xx.
    Transient,
    /// Not attempted because the destination host's breaker is open.
    CircuitOpen,
    /// Anything else (store failures, non-retryable platform answers).
    Fatal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Transient => write!(f, "transient"),
            Self::CircuitOpen => write!(f, "circuit_open"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Error raised by connectors, the HTTP layer and the orchestrator.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("connector_name_required")]
    ConnectorNameRequired,

    #[error("connector_mode_invalid: {mode:?}")]
    ConnectorModeInvalid { mode: String },

    #[error("{connector}_{mode}_not_configured")]
    NotConfigured {
        connector: String,
        mode: ConnectorMode,
    },

    #[error("unsupported_connector: {name:?}")]
    UnsupportedConnector { name: String },

    #[error("circuit_open: requests to {host} are suspended")]
    CircuitOpen { host: String },

    #[error("request to {host} timed out after {timeout_ms}ms")]
    Timeout { host: String, timeout_ms: u64 },

    #[error("network error calling {host}: {message}")]
    Network { host: String, message: String },

    #[error("{host} responded with HTTP {status}")]
    HttpStatus { host: String, status: u16 },

    /// Recoverable failure reported by a runner.
    #[error("platform error: {message}")]
    Platform { message: String },

    /// Non-recoverable failure reported by a runner.
    #[error("fatal error: {message}")]
    Fatal { message: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StorageError),
}

impl SyncError {
    /// Recoverable platform failure (will get an error row and a retry).
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform { message: message.into() }
    }

    /// Non-recoverable runner failure.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal { message: message.into() }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectorNameRequired
            | Self::ConnectorModeInvalid { .. }
            | Self::NotConfigured { .. }
            | Self::InvalidInput(_) => ErrorKind::Configuration,
            Self::UnsupportedConnector { .. } => ErrorKind::Unsupported,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::Timeout { .. } | Self::Network { .. } | Self::Platform { .. } => {
                ErrorKind::Transient
            }
            Self::HttpStatus { status, .. } if is_retryable_status(*status) => {
                ErrorKind::Transient
            }
            Self::HttpStatus { .. } | Self::Fatal { .. } | Self::Store(_) => ErrorKind::Fatal,
        }
    }

    /// Whether the failure deserves an error row and a scheduled retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::CircuitOpen)
    }

    /// Stable wire-visible error code.
    #[must_use]
    pub fn code(&self) -> Cow<'static, str> {
        match self {
            Self::ConnectorNameRequired => Cow::Borrowed("connector_name_required"),
            Self::ConnectorModeInvalid { .. } => Cow::Borrowed("connector_mode_invalid"),
            Self::NotConfigured { connector, mode } => {
                Cow::Owned(format!("{connector}_{mode}_not_configured"))
            }
            Self::UnsupportedConnector { .. } => Cow::Borrowed("unsupported_connector"),
            Self::CircuitOpen { .. } => Cow::Borrowed("circuit_open"),
            Self::Timeout { .. } => Cow::Borrowed("timeout"),
            Self::Network { .. } => Cow::Borrowed("network_error"),
            Self::HttpStatus { status, .. } => Cow::Owned(format!("http_{status}")),
            Self::Platform { .. } => Cow::Borrowed("platform_error"),
            Self::Fatal { .. } => Cow::Borrowed("fatal_error"),
            Self::InvalidInput(_) => Cow::Borrowed("invalid_input"),
            Self::Store(_) => Cow::Borrowed("store_error"),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Truncate a message to at most `max_chars` characters, on a char boundary.
#[must_use]
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

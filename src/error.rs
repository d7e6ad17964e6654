//! Error taxonomy for the compliance engine
//!
//! Scope-level and action-level failures are values the engine absorbs and
//! reports. Only `EngineError` aborts a run.

use std::path::PathBuf;

use crate::models::SettingValue;

/// Failures reported by a `SettingSource`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("scope {scope} is unreachable: {message}")]
    Unreachable { scope: String, message: String },

    #[error("permission denied on {scope}: {message}")]
    PermissionDenied { scope: String, message: String },

    #[error("transient failure on {scope}: {message}")]
    Transient { scope: String, message: String },

    #[error("invalid value for {key} on {scope}: {message}")]
    InvalidValue {
        scope: String,
        key: String,
        message: String,
    },
}

impl SourceError {
    /// Timeouts and throttling; the only errors worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient { .. })
    }
}

/// Baseline loading and lookup failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BaselineError {
    #[error("baseline '{baseline}' is invalid: {reason}")]
    Validation { baseline: String, reason: String },

    #[error("baseline '{name}' not found")]
    NotFound { name: String },

    #[error("failed to read baseline at {path:?}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("failed to parse baseline at {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl BaselineError {
    pub(crate) fn validation(baseline: &str, reason: impl Into<String>) -> Self {
        BaselineError::Validation {
            baseline: baseline.to_string(),
            reason: reason.into(),
        }
    }
}

/// Why a single remediation action did not apply
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("{key} changed since plan time: expected {expected}, found {found}")]
    Conflict {
        key: String,
        expected: String,
        found: String,
    },

    #[error("deadline exceeded before {key} could be applied")]
    DeadlineExceeded { key: String },
}

impl ActionError {
    pub(crate) fn conflict(key: &str, expected: Option<&SettingValue>, found: Option<&SettingValue>) -> Self {
        let show = |v: Option<&SettingValue>| v.map_or_else(|| "<absent>".to_string(), |v| v.to_string());
        ActionError::Conflict {
            key: key.to_string(),
            expected: show(expected),
            found: show(found),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ActionError::Conflict { .. })
    }
}

/// Fatal run errors: global preconditions only
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Baseline(#[from] BaselineError),

    #[error("no scopes requested")]
    NoScopes,

    #[error("concurrency limit must be at least 1")]
    InvalidConcurrency,

    #[error("risk matrix is invalid: {0}")]
    RiskMatrix(String),

    #[error("audit store failure: {0}")]
    Store(#[source] anyhow::Error),
}

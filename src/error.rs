// src/error.rs
use std::time::Duration;

use thiserror::Error;

/// Failures the monitoring core knows how to classify.
///
/// Probe and oracle failures are recovered per source and surface as
/// `CycleError` events. `Configuration` is only produced at startup and is fatal.
/// An exhausted navigation search is not represented here: it is a normal
/// [`crate::search::SearchOutcome`].
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("probe of source `{source_id}` timed out after {after:?}")]
    ProbeTimeout { source_id: String, after: Duration },

    #[error("probe of source `{source_id}` failed: {message}")]
    ProbeFailure { source_id: String, message: String },

    #[error("perception oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MonitorError {
    pub fn probe_failure(source_id: &str, err: &anyhow::Error) -> Self {
        Self::ProbeFailure {
            source_id: source_id.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Short label used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProbeTimeout { .. } => "probe_timeout",
            Self::ProbeFailure { .. } => "probe_failure",
            Self::OracleUnavailable(_) => "oracle_unavailable",
            Self::Configuration(_) => "configuration",
        }
    }
}

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

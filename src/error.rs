//! Error types for the batch driver.
//!
//! `ConfigError` is the configuration-fatal tier: any of these abort the whole
//! batch. Per-export failures are not errors at all, they are recorded as
//! [`FailureReason`](crate::model::FailureReason) values in the report.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::{AbortKind, AbortReason};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("fds2ascii executable not found or not runnable: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("results folder not found: {}", .0.display())]
    ResultsDirectoryMissing(PathBuf),

    #[error("invalid group specification {spec:?}: {reason}")]
    InvalidGroupSpecification { spec: String, reason: String },

    #[error("invalid time range {input:?}: {reason}")]
    InvalidTimeRange { input: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to create output folder {}: {source}", path.display())]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub fn abort_kind(&self) -> AbortKind {
        match self {
            ConfigError::ExecutableNotFound(_) => AbortKind::ExecutableNotFound,
            ConfigError::ResultsDirectoryMissing(_) => AbortKind::ResultsDirectoryMissing,
            ConfigError::InvalidGroupSpecification { .. } => AbortKind::InvalidGroupSpecification,
            ConfigError::InvalidTimeRange { .. } => AbortKind::InvalidTimeRange,
            ConfigError::Invalid(_) => AbortKind::InvalidConfiguration,
            ConfigError::OutputDirectory { .. } => AbortKind::OutputDirectory,
        }
    }

    pub fn to_abort_reason(&self) -> AbortReason {
        AbortReason {
            kind: self.abort_kind(),
            message: self.to_string(),
        }
    }
}

/// Problems starting an fds2ascii session. A non-zero exit is not one of these.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("fds2ascii executable not found or not runnable: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("failed to launch {}: {source}", path.display())]
    LaunchFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed while waiting for fds2ascii: {0}")]
    Wait(#[source] std::io::Error),
}

impl SessionError {
    pub fn to_abort_reason(&self) -> AbortReason {
        let kind = match self {
            SessionError::ExecutableNotFound(_) => AbortKind::ExecutableNotFound,
            SessionError::LaunchFailure { .. } | SessionError::Wait(_) => AbortKind::LaunchFailure,
        };
        AbortReason {
            kind,
            message: self.to_string(),
        }
    }
}

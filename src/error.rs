//! Error taxonomy for disc processing.
//!
//! Per-job failures ([`JobError`]) end the job in `Failed` or `Rejected` and the batch
//! carries on. Run-level failures ([`RunError`]) stop the worker.

use crate::machine::InvalidTransition;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Fieldless mirror of the taxonomy, used in reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    HardwareTimeout,
    HardwareCommandFailed,
    DriveNotFound,
    NoDiscPresent,
    UnreadableMedia,
    ImagingFailed,
    RipFailed,
    TranscodeFailed,
    VerificationFailed,
    ManifestWriteFailed,
    Cancelled,
}

/// Failures contained within a single carrier job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{action} timed out after {timeout_secs}s")]
    HardwareTimeout { action: String, timeout_secs: u64 },

    #[error("{action} failed with exit code {code:?}")]
    HardwareCommandFailed {
        action: String,
        code: Option<i32>,
        output: String,
    },

    #[error("no disc present in drive")]
    NoDiscPresent,

    #[error("unreadable media: {reason}")]
    UnreadableMedia { reason: String },

    #[error("imaging failed: {reason}")]
    ImagingFailed { reason: String, output: String },

    #[error("audio rip failed: {reason}")]
    RipFailed { reason: String, output: String },

    #[error("transcode failed: {reason}")]
    TranscodeFailed { reason: String, output: String },

    #[error("verification failed: {reason}")]
    VerificationFailed { reason: String },

    #[error("cancelled before the disc was loaded")]
    Cancelled,
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::HardwareTimeout { .. } => ErrorKind::HardwareTimeout,
            Self::HardwareCommandFailed { .. } => ErrorKind::HardwareCommandFailed,
            Self::NoDiscPresent => ErrorKind::NoDiscPresent,
            Self::UnreadableMedia { .. } => ErrorKind::UnreadableMedia,
            Self::ImagingFailed { .. } => ErrorKind::ImagingFailed,
            Self::RipFailed { .. } => ErrorKind::RipFailed,
            Self::TranscodeFailed { .. } => ErrorKind::TranscodeFailed,
            Self::VerificationFailed { .. } => ErrorKind::VerificationFailed,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the drive/robot state is no longer trustworthy, so the disc goes to the
    /// reject bin instead of being ejected normally.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::HardwareTimeout { .. })
    }

    /// Captured tool output, if the failure came from an external process.
    pub fn tool_output(&self) -> Option<&str> {
        match self {
            Self::HardwareCommandFailed { output, .. }
            | Self::ImagingFailed { output, .. }
            | Self::RipFailed { output, .. }
            | Self::TranscodeFailed { output, .. } => Some(output.as_str()),
            _ => None,
        }
    }
}

/// Failures that invalidate the whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("optical drive not found: {drive}")]
    DriveNotFound { drive: String },

    #[error("writing manifest {}: {source}", path.display())]
    ManifestWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("worker thread stopped unexpectedly")]
    WorkerGone,
}

impl RunError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::DriveNotFound { .. } => Some(ErrorKind::DriveNotFound),
            Self::ManifestWriteFailed { .. } => Some(ErrorKind::ManifestWriteFailed),
            Self::InvalidConfig(_) | Self::InvalidTransition(_) | Self::WorkerGone => None,
        }
    }
}

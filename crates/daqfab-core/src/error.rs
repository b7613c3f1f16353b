//! Error types for acquisition operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for acquisition operations
pub type Result<T> = std::result::Result<T, DaqError>;

/// Errors that can occur while driving a converter card
#[derive(Debug, Error)]
pub enum DaqError {
    /// Malformed waveform specification
    #[error("Invalid waveform: {reason}")]
    InvalidWaveform {
        /// What was wrong with the specification
        reason: String,
    },

    /// Artifact could not be written
    #[error("Archive failed for {}: {source}", path.display())]
    Archive {
        /// Artifact path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Register or DMA operation failed
    #[error("Transport error: {reason}")]
    Transport {
        /// Reason for failure
        reason: String,
    },

    /// Transport operation exceeded its bounded timeout
    #[error("Transport timeout after {duration_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    /// Ramp pattern check observed mismatching samples
    #[error("Link verification failed with {mismatches} ramp mismatches")]
    VerificationFailed {
        /// Total mismatch count across the checked inputs
        mismatches: u32,
    },

    /// A collaborator returned an unexpected status
    #[error("Protocol error: {reason}")]
    Protocol {
        /// Reason for failure
        reason: String,
    },
}

impl DaqError {
    /// Create an invalid waveform error
    pub fn invalid_waveform(reason: impl Into<String>) -> Self {
        Self::InvalidWaveform {
            reason: reason.into(),
        }
    }

    /// Create a transport error
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Create an archive error
    pub fn archive(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Archive {
            path: path.into(),
            source,
        }
    }
}

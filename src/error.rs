//! Error types for the stabilize transform.

use crate::negotiation::NegotiationError;
use thiserror::Error;

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pool, allocator and device operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Buffer pool is at its maximum and no buffer is idle.
    #[error("buffer pool exhausted: {in_use} of {max} buffers in use")]
    PoolExhausted {
        /// Buffers currently issued.
        in_use: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Pool used before it was configured and activated.
    #[error("buffer pool is not active")]
    PoolInactive,

    /// Hardware buffer allocation failed.
    #[error("hardware allocation failed: {0}")]
    AllocationFailed(String),

    /// The hardware device reported an error.
    #[error("device error during {op}: {reason}")]
    Device {
        /// The device operation that failed.
        op: &'static str,
        /// Device-provided description.
        reason: String,
    },

    /// Copying or clearing one plane failed; the whole frame is discarded.
    #[error("plane {plane} failed: {reason}")]
    PlaneCopy {
        /// Index of the failing plane.
        plane: usize,
        /// What went wrong.
        reason: String,
    },

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Caps negotiation failed.
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
}

impl Error {
    /// Shorthand for a device failure.
    pub fn device(op: &'static str, reason: impl Into<String>) -> Self {
        Self::Device {
            op,
            reason: reason.into(),
        }
    }

    /// Shorthand for a per-plane failure.
    pub fn plane(plane: usize, reason: impl Into<String>) -> Self {
        Self::PlaneCopy {
            plane,
            reason: reason.into(),
        }
    }
}

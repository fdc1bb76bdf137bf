//! Error types for slotlog
//!
//! Provides a unified error type for all slot, logfile and sync operations.

use thiserror::Error;

/// Result type alias using SlotError
pub type Result<T> = std::result::Result<T, SlotError>;

/// Unified error type for slotlog operations
#[derive(Debug, Error)]
pub enum SlotError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Allocation Errors
    // -------------------------------------------------------------------------
    /// No logfile with enough free space could be obtained
    #[error("Out of space: no logfile with {requested} free bytes available")]
    OutOfSpace { requested: u64 },

    /// The record can never fit into a single logfile
    #[error("Record size {size} exceeds maximum of {max} bytes")]
    SizeTooLarge { size: u32, max: u32 },

    /// Transient failure while creating a logfile or buffer
    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    // -------------------------------------------------------------------------
    // State Errors
    // -------------------------------------------------------------------------
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Timed out waiting for synchronization")]
    SyncTimeout,

    #[error("Logfile is empty, nothing to flush")]
    LogfileEmpty,

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Marker corruption detected: {0}")]
    Corruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SlotError {
    /// Whether a caller may sensibly retry the operation that failed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SlotError::OutOfSpace { .. } | SlotError::AllocationFailed(_) | SlotError::SyncTimeout
        )
    }
}

impl From<bincode::Error> for SlotError {
    fn from(err: bincode::Error) -> Self {
        SlotError::Serialization(err.to_string())
    }
}

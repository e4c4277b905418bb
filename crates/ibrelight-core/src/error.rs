//! Error types for the GPU-free layer of ibrelight-rs.

use thiserror::Error;

/// Errors raised by the core bookkeeping and math helpers.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Every unit of a bounded resource table is already assigned to another key.
    #[error("no available {kind} units: all {capacity} are in use")]
    NoAvailableUnits { kind: &'static str, capacity: usize },

    /// A view-dependent operation was asked to pick from an empty view set.
    #[error("view set contains no camera poses")]
    EmptyViewSet,

    /// A split fraction outside the open interval (0, 1).
    #[error("split fraction {0} is outside (0, 1)")]
    InvalidSplit(f32),

    /// A matrix is not a rigid or uniformly scaled transform within tolerance.
    #[error("a quick inverse cannot be taken within tolerance {tolerance}")]
    QuickInverseFailed { tolerance: f32 },

    /// An index was outside the bounds of an indexed collection.
    #[error("index {index} out of range for {kind} of length {len}")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    /// An operation observed a cancellation request.
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

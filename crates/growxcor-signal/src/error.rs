//! Error types for window validation and normalization.

/// Errors from window construction and normalization.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SignalError {
    /// Returned when an empty slice is provided as a window.
    #[error("window must be non-empty")]
    EmptyWindow,

    /// Returned when a window contains NaN, infinity, or negative infinity.
    #[error("window contains non-finite sample at index {index}")]
    NonFiniteSample {
        /// Position of the first non-finite sample found.
        index: usize,
    },

    /// Returned when a window is flat, so the standard deviation used for
    /// normalization is zero or rounding noise.
    #[error("window of {len} samples has zero variance (constant value {value})")]
    ZeroVariance {
        /// Number of samples in the window.
        len: usize,
        /// The first sample value.
        value: f64,
    },
}

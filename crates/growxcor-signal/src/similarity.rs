//! Similarity score newtype wrapper.

use std::fmt;

/// Peak absolute normalized cross-correlation between two windows.
///
/// In `[0, 1]` for equal-length windows with non-zero variance.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Similarity(f64);

impl Similarity {
    /// Score of two windows with no similarity at all.
    pub const ZERO: Self = Self(0.0);

    /// Create a similarity score from a raw value.
    pub(crate) fn new(value: f64) -> Self {
        Self(value)
    }

    /// Return the raw score.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Similarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

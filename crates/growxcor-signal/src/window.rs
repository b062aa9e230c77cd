//! Sample window type with validation guarantees.

use std::ops::Index;

use crate::error::SignalError;

/// Owned, validated window of waveform samples. Guaranteed non-empty with all
/// finite values.
#[derive(Debug, Clone, PartialEq)]
pub struct Window(Vec<f64>);

impl Window {
    /// Create a new window, validating that it is non-empty and all values are finite.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`SignalError::EmptyWindow`] | `values` is empty |
    /// | [`SignalError::NonFiniteSample`] | Any value is NaN or infinite |
    pub fn new(values: Vec<f64>) -> Result<Self, SignalError> {
        if values.is_empty() {
            return Err(SignalError::EmptyWindow);
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(SignalError::NonFiniteSample { index });
        }
        Ok(Self(values))
    }

    /// Copy a slice of samples into a new validated window.
    ///
    /// # Errors
    ///
    /// Same as [`Window::new`].
    pub fn from_slice(values: &[f64]) -> Result<Self, SignalError> {
        Self::new(values.to_vec())
    }

    /// Return the underlying samples.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Return the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Return true if the window has no samples.
    ///
    /// A [`Window`] constructed via [`Window::new`] is always non-empty, so
    /// this always returns `false` for valid instances.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Arithmetic mean of the samples.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.0.iter().sum::<f64>() / self.0.len() as f64
    }

    /// Population standard deviation (divides by n, not n-1).
    #[must_use]
    pub fn std(&self) -> f64 {
        let mean = self.mean();
        let variance =
            self.0.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / self.0.len() as f64;
        variance.sqrt()
    }

    /// Return true if the window carries no usable variation: every sample
    /// is equal, or the spread is within rounding noise of the magnitude.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        let first = self.0[0];
        if self.0.iter().all(|&x| x == first) {
            return true;
        }
        let peak = self.0.iter().fold(0.0_f64, |m, &x| m.max(x.abs()));
        self.std() <= self.0.len() as f64 * f64::EPSILON * peak
    }
}

impl Index<usize> for Window {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

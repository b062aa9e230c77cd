//! Window normalization for similarity scoring.
//!
//! The two sides of a correlation are scaled differently: the reference is
//! divided by `std * len`, the candidate by `std` alone. The product of the
//! two then correlates to exactly one for identical windows at zero lag.

use crate::error::SignalError;
use crate::window::Window;

/// A zero-mean, scaled window ready for correlation.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedWindow(Vec<f64>);

impl NormalizedWindow {
    /// Return the normalized samples.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Return the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Return true if the window has no samples. Always `false` for
    /// windows produced by this module.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn scaled(window: &Window, divisor_scale: f64) -> Result<NormalizedWindow, SignalError> {
    let data = window.as_slice();
    let mean = window.mean();
    if window.is_flat() {
        return Err(SignalError::ZeroVariance {
            len: data.len(),
            value: data[0],
        });
    }
    let std = window.std();

    let divisor = std * divisor_scale;
    Ok(NormalizedWindow(data.iter().map(|&x| (x - mean) / divisor).collect()))
}

/// Normalize the first (reference) window of a pair: subtract the mean and
/// divide by `std * len` (population standard deviation).
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`SignalError::ZeroVariance`] | The window is flat ([`Window::is_flat`]) |
#[must_use = "returns a new normalized window; the original is unchanged"]
pub fn normalize_reference(window: &Window) -> Result<NormalizedWindow, SignalError> {
    scaled(window, window.len() as f64)
}

/// Normalize the second (candidate) window of a pair: subtract the mean and
/// divide by the population standard deviation.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`SignalError::ZeroVariance`] | The window is flat ([`Window::is_flat`]) |
#[must_use = "returns a new normalized window; the original is unchanged"]
pub fn normalize_candidate(window: &Window) -> Result<NormalizedWindow, SignalError> {
    scaled(window, 1.0)
}

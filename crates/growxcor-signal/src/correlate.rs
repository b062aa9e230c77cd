//! Full cross-correlation and peak-absolute similarity.

use tracing::instrument;

use crate::error::SignalError;
use crate::normalize::{normalize_candidate, normalize_reference};
use crate::similarity::Similarity;
use crate::window::Window;

/// Location and height of the strongest correlation between two windows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationPeak {
    /// Peak absolute correlation.
    pub score: Similarity,
    /// Shift of the reference relative to the candidate, in samples, at
    /// which the peak occurs. Zero means the windows are aligned as given.
    pub lag: isize,
}

/// Full (zero-padded) cross-correlation of `a` against `v`.
///
/// Returns `a.len() + v.len() - 1` values. Entry `k` holds
/// `sum_i a[i + lag] * v[i]` with `lag = k - (v.len() - 1)`, summing only the
/// overlapping samples. Returns an empty vector if either input is empty.
#[must_use]
pub fn cross_correlate(a: &[f64], v: &[f64]) -> Vec<f64> {
    let (n, m) = (a.len(), v.len());
    if n == 0 || m == 0 {
        return Vec::new();
    }

    (0..n + m - 1)
        .map(|k| {
            // a index = j + k - (m - 1); keep j where that index is in [0, n)
            let j_start = (m - 1).saturating_sub(k);
            let j_end = (n + m - 1 - k).min(m);
            (j_start..j_end)
                .map(|j| a[j + k + 1 - m] * v[j])
                .sum::<f64>()
        })
        .collect()
}

/// Normalize both windows and locate the peak absolute correlation.
///
/// The reference is divided by `std * len` and the candidate by `std`, so an
/// exact copy of the reference scores one at zero lag.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`SignalError::ZeroVariance`] | Either window is flat |
#[instrument(skip_all, fields(reference_len = reference.len(), candidate_len = candidate.len()))]
pub fn correlate_windows(
    reference: &Window,
    candidate: &Window,
) -> Result<CorrelationPeak, SignalError> {
    let a = normalize_reference(reference)?;
    let b = normalize_candidate(candidate)?;
    let full = cross_correlate(a.as_slice(), b.as_slice());

    let offset = b.len() as isize - 1;
    let mut best = CorrelationPeak {
        score: Similarity::ZERO,
        lag: 0,
    };
    let mut best_abs = f64::NEG_INFINITY;
    for (k, value) in full.iter().enumerate() {
        let abs = value.abs();
        if abs > best_abs {
            best_abs = abs;
            best = CorrelationPeak {
                score: Similarity::new(abs),
                lag: k as isize - offset,
            };
        }
    }
    Ok(best)
}

/// Peak absolute normalized cross-correlation of two windows.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`SignalError::ZeroVariance`] | Either window is flat |
pub fn similarity(reference: &Window, candidate: &Window) -> Result<Similarity, SignalError> {
    correlate_windows(reference, candidate).map(|peak| peak.score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(values: &[f64]) -> Window {
        Window::from_slice(values).unwrap()
    }

    #[test]
    fn full_correlation_matches_reference_values() {
        // [1, 2, 3] against [0, 1, 0.5] over lags -2..=2
        let c = cross_correlate(&[1.0, 2.0, 3.0], &[0.0, 1.0, 0.5]);
        let expected = [0.5, 2.0, 3.5, 3.0, 0.0];
        assert_eq!(c.len(), expected.len());
        for (got, exp) in c.iter().zip(expected) {
            assert!((got - exp).abs() < 1e-12, "got {c:?}");
        }
    }

    #[test]
    fn full_correlation_unequal_lengths() {
        let c = cross_correlate(&[1.0, 2.0], &[1.0, 1.0, 1.0]);
        assert_eq!(c, vec![1.0, 3.0, 3.0, 2.0]);

        let c = cross_correlate(&[1.0, 1.0, 1.0], &[1.0, 2.0]);
        assert_eq!(c, vec![2.0, 3.0, 3.0, 1.0]);
    }

    #[test]
    fn full_correlation_empty_input() {
        assert!(cross_correlate(&[], &[1.0]).is_empty());
        assert!(cross_correlate(&[1.0], &[]).is_empty());
    }

    #[test]
    fn self_correlation_is_one_at_zero_lag() {
        let w = window(&[0.1, 0.7, -0.3, -1.2, 0.4, 0.9, -0.5]);
        let peak = correlate_windows(&w, &w).unwrap();
        assert!((peak.score.value() - 1.0).abs() < 1e-12, "score {}", peak.score.value());
        assert_eq!(peak.lag, 0);
    }

    #[test]
    fn polarity_is_ignored() {
        let a = window(&[0.0, 1.0, 3.0, -2.0, 0.5]);
        let flipped: Vec<f64> = a.as_slice().iter().map(|x| -x).collect();
        let b = window(&flipped);
        let s = similarity(&a, &b).unwrap();
        assert!((s.value() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn shifted_copy_reports_lag() {
        let a = window(&[0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
        let b = window(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        let peak = correlate_windows(&a, &b).unwrap();
        assert_eq!(peak.lag, -1);
    }

    #[test]
    fn constant_window_is_an_error() {
        let a = window(&[1.0, 1.0, 1.0]);
        let b = window(&[0.0, 1.0, 0.0]);
        assert!(matches!(similarity(&a, &b), Err(SignalError::ZeroVariance { .. })));
        assert!(matches!(similarity(&b, &a), Err(SignalError::ZeroVariance { .. })));
    }

    #[test]
    fn flat_fractional_window_is_an_error() {
        let flat = window(&[0.1; 41]);
        let sine: Vec<f64> = (0..41).map(|i| (i as f64 * 0.3).sin()).collect();
        let sine = window(&sine);
        assert!(matches!(
            similarity(&flat, &sine),
            Err(SignalError::ZeroVariance { len: 41, .. })
        ));
        assert!(matches!(
            similarity(&sine, &flat),
            Err(SignalError::ZeroVariance { len: 41, .. })
        ));
    }
}

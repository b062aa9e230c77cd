//! Window normalization and cross-correlation similarity.
//!
//! Pure math library, zero I/O. Provides validated sample windows, the
//! asymmetric normalization used for similarity scoring, the full
//! zero-padded cross-correlation across all lags, and the peak-absolute
//! similarity score derived from it.

mod correlate;
mod error;
mod normalize;
mod similarity;
mod window;

pub use correlate::{CorrelationPeak, correlate_windows, cross_correlate, similarity};
pub use error::SignalError;
pub use normalize::{NormalizedWindow, normalize_candidate, normalize_reference};
pub use similarity::Similarity;
pub use window::Window;

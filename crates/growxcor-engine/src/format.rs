//! GrowClust `xcordata` text rendering.

use std::io::{self, Write};

use tracing::{debug, instrument};

use crate::config::Precision;
use crate::pair::PairResult;

/// Renders pair results as `xcordata` blocks.
///
/// ```text
/// # 0000001 0000002 0.000
///   A1 -0.05000 1.0000 P
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct XcorFormatter {
    precision: Precision,
}

impl XcorFormatter {
    /// Create a formatter with the given column precision.
    #[must_use]
    pub fn new(precision: Precision) -> Self {
        Self { precision }
    }

    /// Write one pair block. A pair without lines writes nothing and
    /// returns `false`.
    ///
    /// # Errors
    ///
    /// Returns any error of the underlying writer.
    pub fn write_pair<W: Write>(&self, out: &mut W, pair: &PairResult) -> io::Result<bool> {
        if pair.lines.is_empty() {
            return Ok(false);
        }
        writeln!(out, "# {} {} 0.000", pair.first, pair.second)?;
        for line in &pair.lines {
            writeln!(
                out,
                "  {} {} {} {}",
                line.station,
                fixed(
                    line.tdiff,
                    self.precision.tdiff_width(),
                    self.precision.tdiff_digits()
                ),
                fixed(
                    line.score,
                    self.precision.score_width(),
                    self.precision.score_digits()
                ),
                line.phase
            )?;
        }
        Ok(true)
    }

    /// Write every pair in order and return the number of blocks written.
    ///
    /// # Errors
    ///
    /// Returns any error of the underlying writer.
    #[instrument(skip_all, fields(n_pairs = pairs.len()))]
    pub fn write_all<W: Write>(&self, out: &mut W, pairs: &[PairResult]) -> io::Result<usize> {
        let mut written = 0;
        for pair in pairs {
            if self.write_pair(out, pair)? {
                written += 1;
            }
        }
        debug!(written, "xcordata blocks rendered");
        Ok(written)
    }

    /// Render one pair block to a string.
    #[must_use]
    pub fn format_pair(&self, pair: &PairResult) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_pair(&mut buf, pair);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Fixed-point rendering, right-aligned to `width`. Non-finite values print
/// as `nan`, `inf` or `-inf`.
fn fixed(value: f64, width: usize, digits: usize) -> String {
    if value.is_nan() {
        format!("{:>width$}", "nan")
    } else if value.is_infinite() {
        let text = if value > 0.0 { "inf" } else { "-inf" };
        format!("{text:>width$}")
    } else {
        format!("{value:>width$.digits$}")
    }
}

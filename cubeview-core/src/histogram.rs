//! Pixel histogram shipped with the dataset header and histogram refreshes.
//!
//! Counts cover `[pmin, pmax]` in equal-width bins. The tone-mapping editor
//! draws them on a horizontal axis normalised to `[0, 1]`.

use crate::util::{f64_to_usize_bounded, usize_to_f64};

/// Histogram of flux values over `[pmin, pmax]`.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PixelHistogram {
    /// Bin counts, lowest flux first.
    counts: Vec<u64>,

    /// Lower edge of the first bin.
    pmin: f64,

    /// Upper edge of the last bin.
    pmax: f64,
}

impl PixelHistogram {
    /// Build a histogram from server bins. Negative counts are treated as
    /// empty bins.
    #[must_use]
    pub fn from_bins(bins: &[i32], pmin: f64, pmax: f64) -> Self {
        Self {
            counts: bins
                .iter()
                .map(|&c| u64::try_from(c).unwrap_or(0))
                .collect(),
            pmin,
            pmax,
        }
    }

    #[must_use]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    #[must_use]
    pub fn pmin(&self) -> f64 {
        self.pmin
    }

    #[must_use]
    pub fn pmax(&self) -> f64 {
        self.pmax
    }

    /// Total number of counted pixels.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Flux width of one bin, zero for an empty or degenerate range.
    #[must_use]
    pub fn bin_width(&self) -> f64 {
        if self.counts.is_empty() || self.pmax <= self.pmin {
            0.0
        } else {
            (self.pmax - self.pmin) / usize_to_f64(self.counts.len())
        }
    }

    /// Bin index holding `flux`, `None` outside `[pmin, pmax]`.
    #[must_use]
    pub fn bin_of(&self, flux: f64) -> Option<usize> {
        let width = self.bin_width();
        if width <= 0.0 || flux < self.pmin || flux > self.pmax {
            return None;
        }
        let idx = (flux - self.pmin) / width;
        // pmax itself lands in the last bin
        f64_to_usize_bounded(idx, self.counts.len()).or(Some(self.counts.len() - 1))
    }

    /// Flux edges `[lo, hi)` of bin `index`.
    #[must_use]
    pub fn bin_edges(&self, index: usize) -> Option<(f64, f64)> {
        if index >= self.counts.len() {
            return None;
        }
        let width = self.bin_width();
        let lo = self.pmin + width * usize_to_f64(index);
        Some((lo, lo + width))
    }

    /// Horizontal position of `flux` on a `[0, 1]` axis spanning the range.
    #[must_use]
    pub fn fraction_of(&self, flux: f64) -> f64 {
        if self.pmax <= self.pmin {
            return 0.0;
        }
        ((flux - self.pmin) / (self.pmax - self.pmin)).clamp(0.0, 1.0)
    }

    /// Flux at horizontal position `x` in `[0, 1]`.
    #[must_use]
    pub fn flux_at_fraction(&self, x: f64) -> f64 {
        self.pmin + x.clamp(0.0, 1.0) * (self.pmax - self.pmin)
    }

    /// Bar heights `ln(1 + count) / ln(1 + max_count)` in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn log_heights(&self) -> Vec<f64> {
        let max = self.counts.iter().copied().max().unwrap_or(0);
        if max == 0 {
            return vec![0.0; self.counts.len()];
        }
        let denom = (max as f64).ln_1p();
        self.counts
            .iter()
            .map(|&c| (c as f64).ln_1p() / denom)
            .collect()
    }

    /// Flux below which a fraction `q` of the counted pixels fall,
    /// interpolated within the bin.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn quantile(&self, q: f64) -> Option<f64> {
        let total = self.total();
        if total == 0 || self.bin_width() <= 0.0 {
            return None;
        }
        let target = q.clamp(0.0, 1.0) * total as f64;
        let mut cumulative = 0.0;
        for (i, &c) in self.counts.iter().enumerate() {
            let next = cumulative + c as f64;
            if next >= target && c > 0 {
                let (lo, hi) = self.bin_edges(i)?;
                let frac = (target - cumulative) / c as f64;
                return Some(lo + (hi - lo) * frac);
            }
            cumulative = next;
        }
        Some(self.pmax)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> PixelHistogram {
        PixelHistogram::from_bins(&[1, 0, 3, -2], 0.0, 8.0)
    }

    #[test]
    fn test_bins() {
        let h = sample();
        assert_eq!(h.counts(), &[1, 0, 3, 0]);
        assert_relative_eq!(h.bin_width(), 2.0);
        assert_eq!(h.bin_of(0.0), Some(0));
        assert_eq!(h.bin_of(5.9), Some(2));
        assert_eq!(h.bin_of(8.0), Some(3));
        assert_eq!(h.bin_of(8.1), None);
        assert_eq!(h.bin_edges(1), Some((2.0, 4.0)));
    }

    #[test]
    fn test_fraction_round_trip() {
        let h = sample();
        assert_relative_eq!(h.fraction_of(h.flux_at_fraction(0.3)), 0.3);
        assert_relative_eq!(h.fraction_of(-5.0), 0.0);
    }

    #[test]
    fn test_log_heights() {
        let h = sample();
        let heights = h.log_heights();
        assert_relative_eq!(heights[2], 1.0);
        assert_relative_eq!(heights[1], 0.0);
        assert!(heights[0] > 0.0 && heights[0] < 1.0);
    }

    #[test]
    fn test_quantile() {
        let h = PixelHistogram::from_bins(&[2, 2], 0.0, 2.0);
        assert_relative_eq!(h.quantile(0.5).unwrap(), 1.0);
        assert_relative_eq!(h.quantile(0.25).unwrap(), 0.5);
        assert!(PixelHistogram::default().quantile(0.5).is_none());
    }
}

//! Per-view dataset model: geometry, spectral calibration, pixel statistics
//! and the current tone-mapping choice.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, InputError, Result};
use crate::flux::{FluxCurve, FluxParams, ToneMapper};
use crate::histogram::PixelHistogram;
use crate::util::usize_to_f64;

/// Speed of light in m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Spectrum aggregation over the selected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum IntensityMode {
    #[default]
    Mean,
    Integrated,
}

impl IntensityMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            IntensityMode::Mean => "mean",
            IntensityMode::Integrated => "integrated",
        }
    }
}

impl fmt::Display for IntensityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntensityMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean" => Ok(IntensityMode::Mean),
            "integrated" => Ok(IntensityMode::Integrated),
            other => Err(Error::UnknownOption {
                kind: "intensity mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Shape of the region a spectrum is taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Beam {
    #[default]
    Square,
    Circle,
}

impl Beam {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Beam::Square => "square",
            Beam::Circle => "circle",
        }
    }
}

impl fmt::Display for Beam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Beam {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "square" => Ok(Beam::Square),
            "circle" => Ok(Beam::Circle),
            other => Err(Error::UnknownOption {
                kind: "beam",
                value: other.to_string(),
            }),
        }
    }
}

/// WCS-style calibration of the three cube axes plus beam metadata.
///
/// Index 0..3 of each array corresponds to FITS axes 1..3.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Calibration {
    pub crval: [f64; 3],
    pub cdelt: [f64; 3],
    pub crpix: [f64; 3],
    pub cunit: [String; 3],
    pub ctype: [String; 3],
    /// Rest frequency in Hz, zero when unknown.
    pub restfrq: f64,
    pub bmaj: f64,
    pub bmin: f64,
    pub bpa: f64,
    pub bunit: String,
    pub btype: String,
    pub specsys: String,
}

impl Calibration {
    /// SI multiplier of the third axis unit (Hz or m/s).
    #[must_use]
    pub fn frame_multiplier(&self) -> f64 {
        match self.cunit[2].to_uppercase().as_str() {
            "KHZ" | "KM/S" => 1e3,
            "MHZ" => 1e6,
            "GHZ" => 1e9,
            "THZ" => 1e12,
            _ => 1.0,
        }
    }

    /// Whether the third axis is a velocity axis.
    #[must_use]
    pub fn has_velocity(&self) -> bool {
        let unit = self.cunit[2].to_uppercase();
        self.ctype[2].contains(['V', 'v']) || unit == "M/S" || unit == "KM/S"
    }

    /// Whether frequencies can be derived for the third axis.
    #[must_use]
    pub fn has_frequency(&self) -> bool {
        let unit = self.cunit[2].to_uppercase();
        self.ctype[2].contains(['F', 'f']) || unit.ends_with("HZ") || self.restfrq > 0.0
    }

    /// Raw axis-3 value (Hz or m/s) at 1-based FITS pixel `pixel`.
    #[must_use]
    pub fn axis_value(&self, pixel: f64) -> f64 {
        let m = self.frame_multiplier();
        self.crval[2] * m + self.cdelt[2] * m * (pixel - self.crpix[2])
    }

    /// Frequency in Hz at 1-based FITS pixel `pixel`; velocity axes are
    /// converted relativistically through the rest frequency.
    #[must_use]
    pub fn frequency_at_pixel(&self, pixel: f64) -> f64 {
        let value = self.axis_value(pixel);
        if self.has_velocity() {
            let beta = value / SPEED_OF_LIGHT;
            self.restfrq * ((1.0 - beta) / (1.0 + beta)).sqrt()
        } else {
            value
        }
    }
}

/// Global pixel statistics reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PixelStats {
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub black: f64,
    pub white: f64,
    pub sensitivity: f64,
    pub ratio_sensitivity: f64,
}

impl PixelStats {
    /// All-zero statistics mean the server has not finished reading the
    /// cube yet.
    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        [self.min, self.max, self.median, self.black, self.white]
            .iter()
            .any(|&v| v != 0.0)
    }
}

/// Selected spectral range, in Hz for frequency cubes and in 1-based frame
/// numbers otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpectralBand {
    pub start: f64,
    pub end: f64,
}

/// One loaded cube in one view slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub id: String,
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub polarisation: usize,
    pub calibration: Calibration,
    pub stats: PixelStats,
    pub histogram: PixelHistogram,
    pub mean_spectrum: Vec<f32>,
    pub integrated_spectrum: Vec<f32>,
    pub curve: FluxCurve,
    /// Multiplier applied to the base sensitivity (from the slider).
    pub noise: f64,
    pub intensity: IntensityMode,
    pub beam: Beam,
    /// Reference frequency in Hz used for velocity conversions.
    pub ref_freq: f64,
    pub band: Option<SpectralBand>,
}

impl Dataset {
    /// Empty dataset with the given geometry.
    #[must_use]
    pub fn new(id: impl Into<String>, width: usize, height: usize, depth: usize) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            depth,
            polarisation: 1,
            calibration: Calibration::default(),
            stats: PixelStats::default(),
            histogram: PixelHistogram::default(),
            mean_spectrum: Vec::new(),
            integrated_spectrum: Vec::new(),
            curve: FluxCurve::default(),
            noise: 1.0,
            intensity: IntensityMode::default(),
            beam: Beam::default(),
            ref_freq: 0.0,
            band: None,
        }
    }

    #[must_use]
    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        if self.ref_freq <= 0.0 {
            self.ref_freq = calibration.restfrq;
        }
        self.calibration = calibration;
        self
    }

    #[must_use]
    pub fn with_stats(mut self, stats: PixelStats) -> Self {
        self.stats = stats;
        self
    }

    #[must_use]
    pub fn with_curve(mut self, curve: FluxCurve) -> Self {
        self.curve = curve;
        self
    }

    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.stats.is_calibrated()
    }

    /// The spectrum currently selected by the intensity mode.
    #[must_use]
    pub fn spectrum(&self) -> &[f32] {
        match self.intensity {
            IntensityMode::Mean => &self.mean_spectrum,
            IntensityMode::Integrated => &self.integrated_spectrum,
        }
    }

    /// Tone-mapping parameters for the current curve.
    ///
    /// The ratio curve uses its own base sensitivity; the others fall back
    /// to `1 / (white - black)` when the server sent none.
    #[must_use]
    pub fn flux_params(&self) -> FluxParams {
        let s = &self.stats;
        let base = match self.curve {
            FluxCurve::Ratio if s.ratio_sensitivity > 0.0 => s.ratio_sensitivity,
            _ if s.sensitivity > 0.0 => s.sensitivity,
            _ => 1.0 / (s.white - s.black),
        };
        FluxParams::new(s.black, s.white, s.median)
            .with_base_sensitivity(base)
            .with_noise(self.noise)
    }

    /// Tone mapper for the current curve and parameters.
    ///
    /// # Errors
    /// Fails when the statistics do not describe a valid range.
    pub fn tone_mapper(&self) -> Result<ToneMapper> {
        ToneMapper::new(self.curve, self.flux_params())
    }

    /// Set the noise multiplier of the sensitivity.
    ///
    /// # Errors
    /// Rejects zero, negative and non-finite values, leaving the dataset
    /// unchanged.
    pub fn set_noise(&mut self, noise: f64) -> Result<()> {
        if !(noise.is_finite() && noise > 0.0) {
            return Err(Error::InvalidCalibration(format!(
                "noise must be positive and finite, got {noise}"
            )));
        }
        self.noise = noise;
        Ok(())
    }

    /// Set black, white and median points.
    ///
    /// # Errors
    /// Rejects `black >= white` and non-finite values, leaving the dataset
    /// unchanged.
    pub fn set_levels(&mut self, black: f64, white: f64, median: f64) -> Result<()> {
        let base = if self.stats.sensitivity > 0.0 {
            self.stats.sensitivity
        } else {
            1.0 / (white - black)
        };
        FluxParams::new(black, white, median)
            .with_base_sensitivity(base)
            .with_noise(self.noise)
            .validate()?;
        self.stats.black = black;
        self.stats.white = white;
        self.stats.median = median;
        Ok(())
    }

    /// Frequency range `(fmin, fmax)` in Hz, `None` for single-frame or
    /// non-spectral cubes.
    #[must_use]
    pub fn frequency_range(&self) -> Option<(f64, f64)> {
        if self.depth <= 1 || !self.calibration.has_frequency() {
            return None;
        }
        let f1 = self.calibration.frequency_at_pixel(1.0);
        let f2 = self.calibration.frequency_at_pixel(usize_to_f64(self.depth));
        if !f1.is_finite() || !f2.is_finite() {
            return None;
        }
        Some((f1.min(f2), f1.max(f2)))
    }

    /// Frequency (Hz) of 0-based frame `frame`.
    #[must_use]
    pub fn frame_frequency(&self, frame: usize) -> Option<f64> {
        if frame >= self.depth || !self.calibration.has_frequency() {
            return None;
        }
        let f = self.calibration.frequency_at_pixel(usize_to_f64(frame + 1));
        f.is_finite().then_some(f)
    }

    /// 0-based frame whose frequency is closest to `freq` (Hz).
    #[must_use]
    pub fn frame_at_frequency(&self, freq: f64) -> Option<usize> {
        (0..self.depth)
            .filter_map(|i| self.frame_frequency(i).map(|f| (i, (f - freq).abs())))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Spectral band covering the whole cube.
    #[must_use]
    pub fn full_band(&self) -> SpectralBand {
        match self.frequency_range() {
            Some((start, end)) => SpectralBand { start, end },
            None => SpectralBand {
                start: 1.0,
                end: usize_to_f64(self.depth.max(1)),
            },
        }
    }

    /// The selected band, or the full cube when nothing is selected.
    #[must_use]
    pub fn band(&self) -> SpectralBand {
        self.band.unwrap_or_else(|| self.full_band())
    }

    /// Spectral value sent as `frame=` for 0-based frame `frame`.
    #[must_use]
    pub fn frame_value(&self, frame: usize) -> f64 {
        self.frame_frequency(frame)
            .unwrap_or_else(|| usize_to_f64(frame + 1))
    }
}

/// Observed frequency (Hz) of a line with rest frequency `restfrq` moving at
/// `velocity_kms`.
///
/// # Errors
/// Rejects non-numeric input and `|v| >= c`.
pub fn frequency_from_velocity(restfrq: f64, velocity_kms: f64) -> std::result::Result<f64, InputError> {
    let c_kms = SPEED_OF_LIGHT / 1000.0;
    if !velocity_kms.is_finite() || velocity_kms.abs() >= c_kms {
        return Err(InputError::OutOfRange {
            quantity: "velocity [km/s]",
            value: velocity_kms,
            min: -c_kms,
            max: c_kms,
        });
    }
    let beta = velocity_kms / c_kms;
    Ok(restfrq * ((1.0 - beta) / (1.0 + beta)).sqrt())
}

/// Line-of-sight velocity (km/s) of `freq` relative to `restfrq`.
#[must_use]
pub fn velocity_from_frequency(restfrq: f64, freq: f64) -> f64 {
    let r = (freq / restfrq).powi(2);
    SPEED_OF_LIGHT / 1000.0 * (1.0 - r) / (1.0 + r)
}

/// Observed frequency (Hz) at redshift `z`.
///
/// # Errors
/// Rejects `z <= -1` and non-finite values.
pub fn frequency_from_redshift(restfrq: f64, z: f64) -> std::result::Result<f64, InputError> {
    if !z.is_finite() || z <= -1.0 {
        return Err(InputError::OutOfRange {
            quantity: "redshift",
            value: z,
            min: -1.0,
            max: f64::INFINITY,
        });
    }
    Ok(restfrq / (1.0 + z))
}

/// Redshift of `freq` relative to `restfrq`.
#[must_use]
pub fn redshift_from_frequency(restfrq: f64, freq: f64) -> f64 {
    restfrq / freq - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn frequency_cube() -> Dataset {
        let mut cal = Calibration::default();
        cal.crval[2] = 100.0;
        cal.cdelt[2] = 0.5;
        cal.crpix[2] = 1.0;
        cal.cunit[2] = "GHz".into();
        cal.ctype[2] = "FREQ".into();
        Dataset::new("cube", 800, 600, 11).with_calibration(cal)
    }

    #[test]
    fn test_frequency_axis() {
        let ds = frequency_cube();
        let (lo, hi) = ds.frequency_range().unwrap();
        assert_relative_eq!(lo, 100e9);
        assert_relative_eq!(hi, 105e9);
        assert_relative_eq!(ds.frame_frequency(2).unwrap(), 101e9);
        assert_eq!(ds.frame_at_frequency(102.6e9), Some(5));
        assert!(ds.frame_frequency(11).is_none());
    }

    #[test]
    fn test_velocity_axis() {
        let mut cal = Calibration::default();
        cal.crval[2] = 0.0;
        cal.cdelt[2] = 1.0;
        cal.crpix[2] = 1.0;
        cal.cunit[2] = "km/s".into();
        cal.ctype[2] = "VRAD".into();
        cal.restfrq = 230e9;
        let ds = Dataset::new("v", 10, 10, 3).with_calibration(cal);
        assert_relative_eq!(ds.frame_frequency(0).unwrap(), 230e9);
        let (lo, hi) = ds.frequency_range().unwrap();
        assert!(lo < hi && hi <= 230e9);
        assert_relative_eq!(ds.ref_freq, 230e9);
    }

    #[test]
    fn test_non_spectral_band() {
        let ds = Dataset::new("img", 10, 10, 1);
        assert!(ds.frequency_range().is_none());
        assert_eq!(ds.band(), SpectralBand { start: 1.0, end: 1.0 });
        assert_relative_eq!(ds.frame_value(0), 1.0);
    }

    #[test]
    fn test_velocity_conversions() {
        let f = frequency_from_velocity(100e9, 300.0).unwrap();
        assert!(f < 100e9);
        assert_relative_eq!(velocity_from_frequency(100e9, f), 300.0, max_relative = 1e-9);
        assert!(frequency_from_velocity(100e9, 3.0e5).is_err());
        assert!(frequency_from_velocity(100e9, f64::NAN).is_err());
    }

    #[test]
    fn test_redshift_conversions() {
        let f = frequency_from_redshift(100e9, 1.0).unwrap();
        assert_relative_eq!(f, 50e9);
        assert_relative_eq!(redshift_from_frequency(100e9, f), 1.0);
        assert!(frequency_from_redshift(100e9, -1.0).is_err());
    }

    #[test]
    fn test_calibration_state() {
        let mut ds = frequency_cube();
        assert!(!ds.is_calibrated());
        ds.stats.black = 1.0;
        assert!(ds.is_calibrated());
    }

    #[test]
    fn test_set_levels_rejects_inverted() {
        let mut ds = frequency_cube().with_stats(PixelStats {
            black: 1.0,
            white: 2.0,
            median: 1.5,
            ..PixelStats::default()
        });
        assert!(ds.set_levels(3.0, 2.0, 2.5).is_err());
        assert_relative_eq!(ds.stats.black, 1.0);
        ds.set_levels(0.0, 4.0, 1.0).unwrap();
        assert_relative_eq!(ds.stats.white, 4.0);
    }

    #[test]
    fn test_set_noise_rejects_non_positive() {
        let mut ds = frequency_cube();
        let before = ds.noise;
        for bad in [0.0, -0.0, -2.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(ds.set_noise(bad).is_err(), "{bad}");
            assert_relative_eq!(ds.noise, before);
        }
        ds.set_noise(2.5).unwrap();
        assert_relative_eq!(ds.noise, 2.5);
    }

    #[test]
    fn test_ratio_uses_own_sensitivity() {
        let ds = frequency_cube()
            .with_stats(PixelStats {
                black: 0.0,
                white: 10.0,
                median: 2.0,
                sensitivity: 0.1,
                ratio_sensitivity: 0.5,
                ..PixelStats::default()
            })
            .with_curve(FluxCurve::Ratio);
        assert_relative_eq!(ds.flux_params().sensitivity(), 0.5);
        let ds = ds.with_curve(FluxCurve::Logistic);
        assert_relative_eq!(ds.flux_params().sensitivity(), 0.1);
    }
}

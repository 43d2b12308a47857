//! Pixel intensity transfer functions (tone mapping).
//!
//! A [`ToneMapper`] converts a physical flux value into a normalised
//! display level in `[0, 1]` and back. The forward direction mirrors what
//! the server applies when it renders luma planes; the inverse direction
//! drives the draggable curve drawn over the histogram. Both directions
//! share the constants below so that what the editor shows and what the
//! server renders stay consistent.
#![allow(clippy::doc_markdown)]

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Lower end of the sensitivity slider scale.
pub const SENSITIVITY_MIN: f64 = 0.01;
/// Upper end of the sensitivity slider scale.
pub const SENSITIVITY_MAX: f64 = 100.0;
/// Full travel of the sensitivity slider.
pub const SLIDER_RANGE: f64 = 100.0;

/// Stretch factor of the `log` curve, `(e - 1) / 2`, chosen so that
/// `ln(2 * t * s + 1)` reaches exactly 1 at `t = 1`.
pub const LOG_STRETCH: f64 = 0.859_140_914_229_522_6;
/// Steepness multiplier of the `logistic` curve.
pub const LOGISTIC_GAIN: f64 = 6.0;
/// Gain applied before the `ratio` curve's `t / (1 + t)`.
pub const RATIO_GAIN: f64 = 5.0;
/// `legacy` curve offset at the lowest slider position.
pub const LEGACY_P_MIN: f64 = 0.001;
/// `legacy` curve offset at the highest slider position.
pub const LEGACY_P_MAX: f64 = 0.5;

/// Distance kept from the asymptotes when inverting saturating curves.
const ASYMPTOTE_EPSILON: f64 = 1e-12;

/// Supported transfer curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FluxCurve {
    /// Straight ramp between black and white.
    Linear,
    /// Logarithmic stretch between black and white.
    Log,
    /// Sigmoid centred on the median.
    #[default]
    Logistic,
    /// `t / (1 + t)`, used for optical and ratio imagery.
    Ratio,
    /// Quadratic ramp from black.
    Square,
    /// Offset logarithm with a slider-controlled offset.
    Legacy,
}

impl FluxCurve {
    /// All curves, in menu order.
    pub const ALL: [FluxCurve; 6] = [
        FluxCurve::Legacy,
        FluxCurve::Linear,
        FluxCurve::Log,
        FluxCurve::Logistic,
        FluxCurve::Ratio,
        FluxCurve::Square,
    ];

    /// Name used on the wire and in menus.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FluxCurve::Linear => "linear",
            FluxCurve::Log => "log",
            FluxCurve::Logistic => "logistic",
            FluxCurve::Ratio => "ratio",
            FluxCurve::Square => "square",
            FluxCurve::Legacy => "legacy",
        }
    }

    /// Whether the curve is non-decreasing over the whole real line.
    ///
    /// `ratio` is only monotone from black upwards.
    #[must_use]
    pub fn is_globally_monotone(self) -> bool {
        !matches!(self, FluxCurve::Ratio)
    }
}

impl fmt::Display for FluxCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FluxCurve {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(FluxCurve::Linear),
            "log" => Ok(FluxCurve::Log),
            "logistic" => Ok(FluxCurve::Logistic),
            "ratio" => Ok(FluxCurve::Ratio),
            "square" => Ok(FluxCurve::Square),
            "legacy" => Ok(FluxCurve::Legacy),
            other => Err(Error::UnknownCurve(other.to_string())),
        }
    }
}

/// Map a slider position in `[0, 100]` onto the log-spaced sensitivity
/// multiplier in `[0.01, 100]`. Position 50 maps to 1.0.
#[must_use]
pub fn sensitivity_from_slider(slider: f64) -> f64 {
    let slider = if slider.is_finite() {
        slider.clamp(0.0, SLIDER_RANGE)
    } else {
        SLIDER_RANGE / 2.0
    };
    let lmin = SENSITIVITY_MIN.ln();
    let lmax = SENSITIVITY_MAX.ln();
    (lmin + (lmax - lmin) * slider / SLIDER_RANGE).exp()
}

/// Inverse of [`sensitivity_from_slider`].
#[must_use]
pub fn slider_from_sensitivity(sensitivity: f64) -> f64 {
    let s = sensitivity.clamp(SENSITIVITY_MIN, SENSITIVITY_MAX);
    let lmin = SENSITIVITY_MIN.ln();
    let lmax = SENSITIVITY_MAX.ln();
    SLIDER_RANGE * (s.ln() - lmin) / (lmax - lmin)
}

/// Offset `p` of the legacy curve for a given noise multiplier.
#[must_use]
pub fn legacy_offset(noise: f64) -> f64 {
    LEGACY_P_MIN
        + (LEGACY_P_MAX - LEGACY_P_MIN) * (noise - SENSITIVITY_MIN)
            / (SENSITIVITY_MAX - SENSITIVITY_MIN)
}

/// Calibration points of one dataset's transfer curve.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FluxParams {
    /// Flux mapped to display level 0.
    pub black: f64,
    /// Flux mapped to display level 1.
    pub white: f64,
    /// Centre of the logistic curve.
    pub median: f64,
    /// Slider-derived multiplier in `[0.01, 100]`.
    pub noise: f64,
    /// Dataset sensitivity at `noise == 1`, in inverse flux units.
    pub base_sensitivity: f64,
}

impl FluxParams {
    /// Creates parameters whose base sensitivity spans black..white.
    #[must_use]
    pub fn new(black: f64, white: f64, median: f64) -> Self {
        let span = white - black;
        Self {
            black,
            white,
            median,
            noise: 1.0,
            base_sensitivity: if span > 0.0 { 1.0 / span } else { 1.0 },
        }
    }

    /// Sets the noise multiplier from a slider position.
    #[must_use]
    pub fn with_slider(mut self, slider: f64) -> Self {
        self.noise = sensitivity_from_slider(slider);
        self
    }

    /// Sets the noise multiplier directly.
    #[must_use]
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    /// Sets the base sensitivity reported by the server.
    #[must_use]
    pub fn with_base_sensitivity(mut self, base: f64) -> Self {
        self.base_sensitivity = base;
        self
    }

    /// Effective sensitivity used by the logistic, ratio and square curves.
    #[must_use]
    pub fn sensitivity(&self) -> f64 {
        self.noise * self.base_sensitivity
    }

    /// Width of the black..white window.
    #[must_use]
    pub fn span(&self) -> f64 {
        self.white - self.black
    }

    /// Checks that a transfer curve can be built from these parameters.
    ///
    /// # Errors
    /// Returns [`Error::InvalidCalibration`] for non-finite values, an empty
    /// or inverted black..white window, or a non-positive sensitivity.
    pub fn validate(&self) -> Result<()> {
        let values = [
            self.black,
            self.white,
            self.median,
            self.noise,
            self.base_sensitivity,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidCalibration(format!(
                "non-finite tone-mapping parameters: {self:?}"
            )));
        }
        if self.white <= self.black {
            return Err(Error::InvalidCalibration(format!(
                "white ({}) must exceed black ({})",
                self.white, self.black
            )));
        }
        if self.noise <= 0.0 || self.base_sensitivity <= 0.0 {
            return Err(Error::InvalidCalibration(format!(
                "sensitivity must be positive (noise {}, base {})",
                self.noise, self.base_sensitivity
            )));
        }
        Ok(())
    }
}

/// Map a physical value to a display level in `[0, 1]`.
#[must_use]
pub fn flux_to_pixel(value: f64, curve: FluxCurve, params: &FluxParams) -> f64 {
    let pixel = match curve {
        FluxCurve::Linear => (value - params.black) / params.span(),
        FluxCurve::Log => {
            let t = (value - params.black) / params.span();
            let arg = 2.0 * t * LOG_STRETCH + 1.0;
            if arg > 0.0 {
                arg.ln()
            } else {
                0.0
            }
        }
        FluxCurve::Logistic => {
            1.0 / (1.0 + (-LOGISTIC_GAIN * params.sensitivity() * (value - params.median)).exp())
        }
        FluxCurve::Ratio => {
            let t = RATIO_GAIN * params.sensitivity() * (value - params.black);
            if t > 0.0 {
                t / (1.0 + t)
            } else {
                0.0
            }
        }
        FluxCurve::Square => {
            let u = (value - params.black) * params.sensitivity();
            if u > 0.0 {
                u * u
            } else {
                0.0
            }
        }
        FluxCurve::Legacy => {
            let t = (value - params.black) / params.span();
            let p = legacy_offset(params.noise);
            if p + t > 0.0 {
                ((p + t).ln() - p.ln()) / ((p + 1.0).ln() - p.ln())
            } else {
                0.0
            }
        }
    };

    if pixel.is_nan() {
        0.0
    } else {
        pixel.clamp(0.0, 1.0)
    }
}

/// Map a display level in `[0, 1]` back to the physical value that
/// produces it.
///
/// Levels outside `[0, 1]` are clamped first; the saturating curves
/// (`logistic`, `ratio`) are evaluated just inside their asymptotes.
#[must_use]
pub fn pixel_to_flux(pixel: f64, curve: FluxCurve, params: &FluxParams) -> f64 {
    let p = if pixel.is_nan() {
        0.0
    } else {
        pixel.clamp(0.0, 1.0)
    };

    match curve {
        FluxCurve::Linear => params.black + p * params.span(),
        FluxCurve::Log => {
            let t = (p.exp() - 1.0) / (2.0 * LOG_STRETCH);
            params.black + t * params.span()
        }
        FluxCurve::Logistic => {
            let p = p.clamp(ASYMPTOTE_EPSILON, 1.0 - ASYMPTOTE_EPSILON);
            params.median - (1.0 / p - 1.0).ln() / (LOGISTIC_GAIN * params.sensitivity())
        }
        FluxCurve::Ratio => {
            let p = p.min(1.0 - ASYMPTOTE_EPSILON);
            let t = p / (1.0 - p);
            params.black + t / (RATIO_GAIN * params.sensitivity())
        }
        FluxCurve::Square => params.black + p.sqrt() / params.sensitivity(),
        FluxCurve::Legacy => {
            let offset = legacy_offset(params.noise);
            let lmin = offset.ln();
            let lmax = (offset + 1.0).ln();
            let t = (lmin + p * (lmax - lmin)).exp() - offset;
            params.black + t * params.span()
        }
    }
}

/// A transfer curve bound to one dataset's calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ToneMapper {
    /// Selected curve.
    pub curve: FluxCurve,
    /// Calibration points.
    pub params: FluxParams,
}

impl ToneMapper {
    /// Builds a mapper after validating the parameters.
    ///
    /// # Errors
    /// Propagates [`FluxParams::validate`] failures.
    pub fn new(curve: FluxCurve, params: FluxParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { curve, params })
    }

    /// Display level of a physical value.
    #[must_use]
    pub fn flux_to_pixel(&self, value: f64) -> f64 {
        flux_to_pixel(value, self.curve, &self.params)
    }

    /// Physical value at a display level.
    #[must_use]
    pub fn pixel_to_flux(&self, pixel: f64) -> f64 {
        pixel_to_flux(pixel, self.curve, &self.params)
    }

    /// 8-bit luma the server would emit for a value.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn luma(&self, value: f64) -> u8 {
        (255.0 * self.flux_to_pixel(value)) as u8
    }

    /// Physical value represented by an 8-bit luma byte.
    #[must_use]
    pub fn flux_at_luma(&self, luma: u8) -> f64 {
        self.pixel_to_flux(f64::from(luma) / 255.0)
    }

    /// Polyline of `(flux, level)` points for the histogram overlay.
    ///
    /// Levels are sampled uniformly over `[0, 1]` and inverted; flux values
    /// are clamped to the data range `[pmin, pmax]` so that the saturating
    /// curves flatten onto the histogram edges.
    #[must_use]
    pub fn overlay_polyline(&self, pmin: f64, pmax: f64, segments: usize) -> Vec<[f64; 2]> {
        let segments = segments.max(1);
        let (lo, hi) = if pmin <= pmax { (pmin, pmax) } else { (pmax, pmin) };
        (0..=segments)
            .map(|i| {
                let level = crate::util::usize_to_f64(i) / crate::util::usize_to_f64(segments);
                let flux = self.pixel_to_flux(level).clamp(lo, hi);
                [flux, level]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params() -> FluxParams {
        FluxParams::new(10.0, 200.0, 80.0)
    }

    #[test]
    fn test_slider_midpoint_is_unity() {
        assert_relative_eq!(sensitivity_from_slider(50.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(sensitivity_from_slider(0.0), 0.01, epsilon = 1e-12);
        assert_relative_eq!(sensitivity_from_slider(100.0), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_slider_round_trip() {
        for i in 0..=100 {
            let slider = f64::from(i);
            let back = slider_from_sensitivity(sensitivity_from_slider(slider));
            assert_relative_eq!(back, slider, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_log_stretch_constant() {
        assert_relative_eq!(LOG_STRETCH, (std::f64::consts::E - 1.0) / 2.0, epsilon = 1e-15);
    }

    #[test]
    fn test_linear_endpoints() {
        let p = params();
        assert_relative_eq!(flux_to_pixel(10.0, FluxCurve::Linear, &p), 0.0);
        assert_relative_eq!(flux_to_pixel(200.0, FluxCurve::Linear, &p), 1.0);
        assert_relative_eq!(flux_to_pixel(105.0, FluxCurve::Linear, &p), 0.5);
        assert_relative_eq!(flux_to_pixel(-1e9, FluxCurve::Linear, &p), 0.0);
        assert_relative_eq!(flux_to_pixel(1e9, FluxCurve::Linear, &p), 1.0);
    }

    #[test]
    fn test_log_spans_unit_interval() {
        let p = params();
        assert_relative_eq!(flux_to_pixel(10.0, FluxCurve::Log, &p), 0.0);
        assert_relative_eq!(flux_to_pixel(200.0, FluxCurve::Log, &p), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_logistic_is_half_at_median() {
        let p = params();
        assert_relative_eq!(flux_to_pixel(80.0, FluxCurve::Logistic, &p), 0.5);
    }

    #[test]
    fn test_ratio_and_square_floor_at_black() {
        let p = params();
        assert_relative_eq!(flux_to_pixel(5.0, FluxCurve::Ratio, &p), 0.0);
        assert_relative_eq!(flux_to_pixel(5.0, FluxCurve::Square, &p), 0.0);
    }

    #[test]
    fn test_legacy_endpoints() {
        let p = params().with_noise(3.0);
        assert_relative_eq!(flux_to_pixel(10.0, FluxCurve::Legacy, &p), 0.0, epsilon = 1e-12);
        assert_relative_eq!(flux_to_pixel(200.0, FluxCurve::Legacy, &p), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_legacy_offset_range() {
        assert_relative_eq!(legacy_offset(SENSITIVITY_MIN), LEGACY_P_MIN);
        assert_relative_eq!(legacy_offset(SENSITIVITY_MAX), LEGACY_P_MAX, epsilon = 1e-12);
    }

    #[test]
    fn test_curve_names_round_trip() {
        for curve in FluxCurve::ALL {
            assert_eq!(curve.as_str().parse::<FluxCurve>().unwrap(), curve);
        }
        assert!("gamma".parse::<FluxCurve>().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        assert!(FluxParams::new(5.0, 5.0, 5.0).validate().is_err());
        assert!(FluxParams::new(5.0, 1.0, 3.0).validate().is_err());
        assert!(FluxParams::new(f64::NAN, 1.0, 3.0).validate().is_err());
        assert!(params().validate().is_ok());
    }

    #[test]
    fn test_overlay_polyline_shape() {
        let mapper = ToneMapper::new(FluxCurve::Logistic, params()).unwrap();
        let line = mapper.overlay_polyline(0.0, 300.0, 100);
        assert_eq!(line.len(), 101);
        assert!(line.iter().all(|[flux, _]| (0.0..=300.0).contains(flux)));
        assert_relative_eq!(line[50][0], 80.0, epsilon = 1e-9);
        assert!(line.windows(2).all(|w| w[0][0] <= w[1][0]));
    }
}

//! Input widgets: the tone-mapping editor and the reference-axis entry.
//!
//! Both are plain state machines fed with already-normalised pointer and
//! text events. Drawing them is up to the embedding UI.

use cubeview_core::flux::{sensitivity_from_slider, slider_from_sensitivity};
use cubeview_core::{
    frequency_from_redshift, frequency_from_velocity, redshift_from_frequency,
    velocity_from_frequency, Dataset, FluxCurve, InputError, PixelHistogram,
};

/// How close (as a fraction of the histogram width) a press must land to
/// grab a marker.
pub const GRAB_TOLERANCE: f64 = 0.02;

/// Draggable marker of the tone-mapping editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    Black,
    White,
    Median,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditorState {
    #[default]
    Idle,
    Dragging(Handle),
}

/// A tone-mapping change made in the editor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FluxUpdate {
    Levels { black: f64, white: f64, median: f64 },
    Curve(FluxCurve),
    /// New noise multiplier from the sensitivity slider.
    Sensitivity(f64),
}

impl FluxUpdate {
    /// Apply the change to a dataset.
    ///
    /// # Errors
    /// Rejects levels the dataset cannot map; the dataset is left unchanged.
    pub fn apply(self, dataset: &mut Dataset) -> cubeview_core::Result<()> {
        match self {
            FluxUpdate::Levels {
                black,
                white,
                median,
            } => dataset.set_levels(black, white, median),
            FluxUpdate::Curve(curve) => {
                dataset.curve = curve;
                Ok(())
            }
            FluxUpdate::Sensitivity(noise) => dataset.set_noise(noise),
        }
    }
}

/// Histogram editor with black, median and white markers.
#[derive(Debug, Clone)]
pub struct FluxEditor {
    state: EditorState,
    histogram: PixelHistogram,
    black: f64,
    white: f64,
    median: f64,
    curve: FluxCurve,
    slider: f64,
}

impl FluxEditor {
    #[must_use]
    pub fn new(dataset: &Dataset) -> Self {
        Self {
            state: EditorState::Idle,
            histogram: dataset.histogram.clone(),
            black: dataset.stats.black,
            white: dataset.stats.white,
            median: dataset.stats.median,
            curve: dataset.curve,
            slider: slider_from_sensitivity(dataset.noise),
        }
    }

    #[must_use]
    pub fn state(&self) -> EditorState {
        self.state
    }

    #[must_use]
    pub fn levels(&self) -> (f64, f64, f64) {
        (self.black, self.white, self.median)
    }

    #[must_use]
    pub fn curve(&self) -> FluxCurve {
        self.curve
    }

    #[must_use]
    pub fn slider(&self) -> f64 {
        self.slider
    }

    #[must_use]
    pub fn histogram(&self) -> &PixelHistogram {
        &self.histogram
    }

    /// Replace the histogram after a refresh.
    pub fn set_histogram(&mut self, histogram: PixelHistogram) {
        self.histogram = histogram;
    }

    /// Markers shown for the current curve. Only the logistic-style curves
    /// have a movable median.
    fn handles(&self) -> Vec<(Handle, f64)> {
        let mut handles = vec![(Handle::Black, self.black), (Handle::White, self.white)];
        if matches!(self.curve, FluxCurve::Logistic | FluxCurve::Legacy) {
            handles.push((Handle::Median, self.median));
        }
        handles
    }

    /// Pointer pressed at horizontal fraction `x`. Returns whether a marker
    /// was grabbed.
    pub fn press(&mut self, x: f64) -> bool {
        if !x.is_finite() || self.histogram.pmax() <= self.histogram.pmin() {
            return false;
        }
        let nearest = self
            .handles()
            .into_iter()
            .map(|(h, flux)| (h, (self.histogram.fraction_of(flux) - x).abs()))
            .filter(|&(_, d)| d <= GRAB_TOLERANCE)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match nearest {
            Some((handle, _)) => {
                self.state = EditorState::Dragging(handle);
                true
            }
            None => false,
        }
    }

    /// Pointer moved to horizontal fraction `x` while pressed.
    ///
    /// Markers keep `black < median < white`; a move that would cross a
    /// neighbour stops just short of it.
    pub fn drag(&mut self, x: f64) -> Option<FluxUpdate> {
        let EditorState::Dragging(handle) = self.state else {
            return None;
        };
        if !x.is_finite() {
            return None;
        }
        let flux = self.histogram.flux_at_fraction(x);
        let gap = (self.histogram.pmax() - self.histogram.pmin()) * 1e-3;
        match handle {
            Handle::Black => self.black = flux.min(self.white - gap),
            Handle::White => self.white = flux.max(self.black + gap),
            Handle::Median => self.median = flux.clamp(self.black, self.white),
        }
        self.median = self.median.clamp(self.black, self.white);
        Some(FluxUpdate::Levels {
            black: self.black,
            white: self.white,
            median: self.median,
        })
    }

    pub fn release(&mut self) {
        self.state = EditorState::Idle;
    }

    /// Select a transfer curve; `None` when unchanged.
    pub fn select_curve(&mut self, curve: FluxCurve) -> Option<FluxUpdate> {
        if curve == self.curve {
            return None;
        }
        self.curve = curve;
        Some(FluxUpdate::Curve(curve))
    }

    /// Move the sensitivity slider to `position` in `[0, 100]`.
    pub fn set_slider(&mut self, position: f64) -> Option<FluxUpdate> {
        if !position.is_finite() {
            return None;
        }
        self.slider = position.clamp(0.0, 100.0);
        Some(FluxUpdate::Sensitivity(sensitivity_from_slider(self.slider)))
    }
}

/// Unit of the reference-axis entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceUnit {
    /// Line-of-sight velocity in km/s.
    #[default]
    Velocity,
    Redshift,
}

/// Velocity or redshift entry that sets the reference frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceInput {
    unit: ReferenceUnit,
    restfrq: f64,
    ref_freq: f64,
}

impl ReferenceInput {
    /// Entry for a line at rest frequency `restfrq` (Hz), starting at rest.
    #[must_use]
    pub fn new(restfrq: f64) -> Self {
        Self {
            unit: ReferenceUnit::default(),
            restfrq,
            ref_freq: restfrq,
        }
    }

    #[must_use]
    pub fn unit(&self) -> ReferenceUnit {
        self.unit
    }

    pub fn set_unit(&mut self, unit: ReferenceUnit) {
        self.unit = unit;
    }

    /// Current reference frequency in Hz.
    #[must_use]
    pub fn ref_freq(&self) -> f64 {
        self.ref_freq
    }

    /// Current value in the selected unit.
    #[must_use]
    pub fn value(&self) -> f64 {
        match self.unit {
            ReferenceUnit::Velocity => velocity_from_frequency(self.restfrq, self.ref_freq),
            ReferenceUnit::Redshift => redshift_from_frequency(self.restfrq, self.ref_freq),
        }
    }

    /// Parse and apply typed input, returning the new reference frequency.
    ///
    /// # Errors
    /// Returns [`InputError`] for text that is not a number or a value
    /// outside the physical range; the stored value is kept.
    pub fn submit(&mut self, text: &str) -> Result<f64, InputError> {
        let value: f64 = text
            .trim()
            .parse()
            .map_err(|_| InputError::NotANumber(text.to_string()))?;
        let freq = match self.unit {
            ReferenceUnit::Velocity => frequency_from_velocity(self.restfrq, value)?,
            ReferenceUnit::Redshift => frequency_from_redshift(self.restfrq, value)?,
        };
        self.ref_freq = freq;
        Ok(freq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cubeview_core::PixelStats;

    fn dataset() -> Dataset {
        let mut d = Dataset::new("cube", 10, 10, 1).with_stats(PixelStats {
            min: 0.0,
            max: 100.0,
            median: 50.0,
            black: 20.0,
            white: 80.0,
            sensitivity: 0.1,
            ratio_sensitivity: 0.1,
        });
        d.histogram = PixelHistogram::from_bins(&[1; 100], 0.0, 100.0);
        d
    }

    #[test]
    fn test_drag_black_marker() {
        let mut d = dataset();
        let mut editor = FluxEditor::new(&d);
        assert!(editor.press(0.205));
        assert_eq!(editor.state(), EditorState::Dragging(Handle::Black));
        let update = editor.drag(0.25).unwrap();
        assert_eq!(
            update,
            FluxUpdate::Levels {
                black: 25.0,
                white: 80.0,
                median: 50.0
            }
        );
        update.apply(&mut d).unwrap();
        assert_relative_eq!(d.stats.black, 25.0);
        editor.release();
        assert!(editor.drag(0.5).is_none());
    }

    #[test]
    fn test_markers_do_not_cross() {
        let mut editor = FluxEditor::new(&dataset());
        assert!(editor.press(0.8));
        let Some(FluxUpdate::Levels { black, white, median }) = editor.drag(0.0) else {
            panic!("expected levels");
        };
        assert!(black < white);
        assert!(median <= white);
    }

    #[test]
    fn test_press_misses_markers() {
        let mut editor = FluxEditor::new(&dataset());
        assert!(!editor.press(0.65));
        assert_eq!(editor.state(), EditorState::Idle);
    }

    #[test]
    fn test_curve_and_slider() {
        let mut d = dataset();
        let mut editor = FluxEditor::new(&d);
        assert!(editor.select_curve(FluxCurve::Logistic).is_none());
        editor.select_curve(FluxCurve::Log).unwrap().apply(&mut d).unwrap();
        assert_eq!(d.curve, FluxCurve::Log);
        let FluxUpdate::Sensitivity(noise) = editor.set_slider(50.0).unwrap() else {
            panic!("expected sensitivity");
        };
        assert_relative_eq!(noise, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sensitivity_rejects_invalid_noise() {
        let mut d = dataset();
        let noise = d.noise;
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(FluxUpdate::Sensitivity(bad).apply(&mut d).is_err(), "{bad}");
            assert_relative_eq!(d.noise, noise);
        }
        assert!(d.tone_mapper().is_ok());
        FluxUpdate::Sensitivity(3.0).apply(&mut d).unwrap();
        assert_relative_eq!(d.noise, 3.0);
    }

    #[test]
    fn test_reference_input_rejects_and_keeps() {
        let mut input = ReferenceInput::new(230.538e9);
        let f = input.submit("100").unwrap();
        assert!(f < 230.538e9);
        assert!(input.submit("fast").is_err());
        assert!(input.submit("400000").is_err());
        assert_relative_eq!(input.ref_freq(), f);
        assert_relative_eq!(input.value(), 100.0, epsilon = 1e-6);

        input.set_unit(ReferenceUnit::Redshift);
        assert!(input.submit("-1").is_err());
        input.submit("1").unwrap();
        assert_relative_eq!(input.ref_freq(), 230.538e9 / 2.0);
    }
}

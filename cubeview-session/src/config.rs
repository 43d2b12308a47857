//! Viewer configuration.
//!
//! Loaded from JSON. Every section and field is optional; omitted values
//! take the defaults below.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Viewport and refresh timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Quiet period after the last interaction before the final
    /// high-quality image and spectrum request.
    pub idle_timeout_ms: u64,
    /// Upper bound on lens viewport requests per second.
    pub refresh_fps: f64,
    /// Side of the hover magnifier in source pixels.
    pub lens_size: usize,
    /// Smallest zoom rectangle side in source pixels.
    pub min_zoom_size: usize,
    /// Display scale multipliers by number of views (1, 2, 3, 4+).
    pub tile_scales: Vec<f64>,
    /// Interval between heartbeat requests.
    pub heartbeat_interval_ms: u64,
    /// Weight of a new sample in the round-trip latency average.
    pub latency_eta: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 250,
            refresh_fps: 30.0,
            lens_size: 64,
            min_zoom_size: 8,
            tile_scales: vec![0.8, 0.6, 0.5, 0.45],
            heartbeat_interval_ms: 30_000,
            latency_eta: 0.1,
        }
    }
}

impl ViewportConfig {
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Minimum spacing between lens refreshes.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refresh_fps)
    }

    /// Display scale for `count` simultaneous views.
    #[must_use]
    pub fn tile_scale(&self, count: usize) -> f64 {
        let idx = count.max(1) - 1;
        self.tile_scales
            .get(idx)
            .or_else(|| self.tile_scales.last())
            .copied()
            .unwrap_or(1.0)
    }
}

/// Video frame-rate and bitrate control.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub initial_fps: f64,
    pub min_fps: f64,
    pub max_fps: f64,
    /// Multiplier applied when a frame blows the latency budget.
    pub fps_decrease: f64,
    /// Multiplier applied otherwise.
    pub fps_increase: f64,
    /// Fraction of the frame interval latency may take.
    pub latency_budget: f64,
    /// Weight of a new bitrate sample in the moving average.
    pub bitrate_eta: f64,
    pub initial_bitrate_kbps: f64,
    pub min_bitrate_kbps: f64,
    pub max_bitrate_kbps: f64,
    /// Requested bitrate as a fraction of the measured one.
    pub target_bitrate_factor: f64,
    /// Quiet period before a key-frame refresh.
    pub key_frame_timeout_ms: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            initial_fps: 10.0,
            min_fps: 1.0,
            max_fps: 30.0,
            fps_decrease: 0.8,
            fps_increase: 1.2,
            latency_budget: 0.8,
            bitrate_eta: 0.1,
            initial_bitrate_kbps: 1000.0,
            min_bitrate_kbps: 100.0,
            max_bitrate_kbps: 10_000.0,
            target_bitrate_factor: 0.8,
            key_frame_timeout_ms: 250,
        }
    }
}

impl VideoConfig {
    #[must_use]
    pub fn key_frame_timeout(&self) -> Duration {
        Duration::from_millis(self.key_frame_timeout_ms)
    }
}

/// Cursor predictor noise levels (units of pixels and pixels/ms).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanConfig {
    /// Velocity process noise per ms.
    pub process_noise: f64,
    /// Position measurement noise.
    pub position_noise: f64,
    /// First-difference velocity measurement noise.
    pub velocity_noise: f64,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            process_noise: 0.01,
            position_noise: 1.0,
            velocity_noise: 0.1,
        }
    }
}

/// Contour defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourConfig {
    pub levels: usize,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self { levels: 5 }
    }
}

/// Complete viewer configuration.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub viewport: ViewportConfig,
    pub video: VideoConfig,
    pub kalman: KalmanConfig,
    pub contour: ContourConfig,
}

impl ViewerConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`ViewerConfig::validate`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    ///
    /// # Errors
    /// Returns an error for invalid JSON or values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check all values for consistency.
    ///
    /// # Errors
    /// Returns [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let v = &self.viewport;
        if v.idle_timeout_ms == 0 {
            return Err(invalid("viewport.idle_timeout_ms must be positive"));
        }
        if !(v.refresh_fps.is_finite() && v.refresh_fps > 0.0) {
            return Err(invalid("viewport.refresh_fps must be positive"));
        }
        if v.lens_size == 0 || v.min_zoom_size == 0 {
            return Err(invalid("viewport.lens_size and min_zoom_size must be positive"));
        }
        if v.tile_scales.is_empty() || v.tile_scales.iter().any(|&s| !(s > 0.0 && s <= 1.0)) {
            return Err(invalid("viewport.tile_scales must be non-empty and within (0, 1]"));
        }
        if v.heartbeat_interval_ms == 0 {
            return Err(invalid("viewport.heartbeat_interval_ms must be positive"));
        }
        if !(v.latency_eta > 0.0 && v.latency_eta <= 1.0) {
            return Err(invalid("viewport.latency_eta must be within (0, 1]"));
        }

        let vid = &self.video;
        if !(vid.min_fps > 0.0 && vid.min_fps <= vid.max_fps) {
            return Err(invalid("video.min_fps must be positive and <= max_fps"));
        }
        if vid.initial_fps < vid.min_fps || vid.initial_fps > vid.max_fps {
            return Err(invalid("video.initial_fps must lie within [min_fps, max_fps]"));
        }
        for (name, value) in [
            ("video.fps_decrease", vid.fps_decrease),
            ("video.latency_budget", vid.latency_budget),
            ("video.bitrate_eta", vid.bitrate_eta),
            ("video.target_bitrate_factor", vid.target_bitrate_factor),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(Error::Config(format!("{name} must be within (0, 1]")));
            }
        }
        if !(vid.fps_increase >= 1.0 && vid.fps_increase.is_finite()) {
            return Err(invalid("video.fps_increase must be >= 1"));
        }
        if !(vid.min_bitrate_kbps > 0.0 && vid.min_bitrate_kbps <= vid.max_bitrate_kbps) {
            return Err(invalid("video.min_bitrate_kbps must be positive and <= max_bitrate_kbps"));
        }
        if vid.key_frame_timeout_ms == 0 {
            return Err(invalid("video.key_frame_timeout_ms must be positive"));
        }

        let k = &self.kalman;
        if [k.process_noise, k.position_noise, k.velocity_noise]
            .iter()
            .any(|&n| !(n >= 0.0 && n.is_finite()))
        {
            return Err(invalid("kalman noise levels must be finite and non-negative"));
        }
        if k.position_noise == 0.0 && k.velocity_noise == 0.0 && k.process_noise == 0.0 {
            return Err(invalid("kalman noise levels cannot all be zero"));
        }

        if self.contour.levels == 0 {
            return Err(invalid("contour.levels must be positive"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> Error {
    Error::Config(msg.to_string())
}

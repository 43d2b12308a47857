//! Display updates produced by the session.
//!
//! Updates are sent over a channel to whatever draws the views; the session
//! itself never touches a canvas.

use cubeview_core::{FrameSurface, RgbaImage};

/// Messages sent from the session to the display.
#[derive(Debug, Clone)]
pub enum DisplayUpdate {
    /// A dataset header arrived; the slot can be drawn.
    DatasetLoaded { slot: usize },

    /// Server-side loading progress in `[0, 1]`.
    Progress {
        slot: usize,
        fraction: f64,
        message: String,
    },

    /// New full-resolution image.
    Image { slot: usize, surface: FrameSurface },

    /// New lens viewport under the cursor.
    Viewport { slot: usize, surface: FrameSurface },

    /// New video frame.
    VideoFrame { slot: usize, surface: FrameSurface },

    /// All channels of a composite round are in.
    Composite(RgbaImage),

    /// Spectrum of the requested region.
    Spectrum { slot: usize, spectrum: Vec<f32> },

    /// Whole-cube spectra were replaced.
    SpectraRefreshed { slot: usize },

    /// Statistics and histogram were replaced.
    HistogramRefreshed { slot: usize },

    /// CSV export of the current spectrum.
    Csv { slot: usize, csv: String },

    /// The server could not serve a request yet.
    Unavailable {
        slot: usize,
        kind: &'static str,
        message: String,
    },

    /// Smoothed round-trip latency in ms.
    Latency(f64),

    /// The connection is gone; nothing more will be sent.
    SessionExpired,
}

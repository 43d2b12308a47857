//! Colour table definitions and application kernels.
//!
//! Luma planes arrive already tone-mapped by the server. Colouring is a
//! 64-segment lookup with linear interpolation, followed by the alpha
//! plane copied into the fourth channel. An alpha of zero is always fully
//! transparent, whatever the table.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, FrameError, Result};
use crate::util::{f32_to_u8, usize_to_f64};

/// Number of interpolation segments in a lookup table.
pub const NO_COLOURS: usize = 64;

/// Available colour tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ColourTable {
    /// Black to white.
    Greyscale,
    /// White to black.
    Negative,
    /// Black to red.
    Red,
    /// Black to green.
    #[default]
    Green,
    /// Black to blue.
    Blue,
    /// Black, red, yellow, white.
    Hot,
    /// Violet through red.
    Rainbow,
    /// GMT haxby (bathymetry style).
    Haxby,
    /// Dave Green's cubehelix.
    Cubehelix,
    /// MATLAB-like parula (approximate).
    Parula,
    /// Matplotlib inferno (approximate).
    Inferno,
    /// Matplotlib magma (approximate).
    Magma,
    /// Matplotlib plasma (approximate).
    Plasma,
    /// Matplotlib viridis (approximate).
    Viridis,
}

type Stops = &'static [(f64, [f64; 3])];

const HOT: Stops = &[
    (0.0, [0.0, 0.0, 0.0]),
    (0.375, [1.0, 0.0, 0.0]),
    (0.75, [1.0, 1.0, 0.0]),
    (1.0, [1.0, 1.0, 1.0]),
];

const RAINBOW: Stops = &[
    (0.0, [0.47, 0.0, 0.53]),
    (0.2, [0.0, 0.0, 1.0]),
    (0.4, [0.0, 1.0, 1.0]),
    (0.6, [0.0, 1.0, 0.0]),
    (0.8, [1.0, 1.0, 0.0]),
    (1.0, [1.0, 0.0, 0.0]),
];

const HAXBY: Stops = &[
    (0.0, [0.145, 0.224, 0.686]),
    (0.125, [0.157, 0.498, 0.984]),
    (0.25, [0.196, 0.745, 1.0]),
    (0.375, [0.416, 0.922, 1.0]),
    (0.5, [0.541, 0.925, 0.682]),
    (0.625, [0.804, 1.0, 0.635]),
    (0.75, [1.0, 0.965, 0.584]),
    (0.875, [1.0, 0.741, 0.341]),
    (1.0, [1.0, 0.631, 0.267]),
];

const PARULA: Stops = &[
    (0.0, [0.208, 0.166, 0.529]),
    (0.25, [0.013, 0.423, 0.878]),
    (0.5, [0.078, 0.669, 0.739]),
    (0.75, [0.651, 0.749, 0.416]),
    (1.0, [0.976, 0.984, 0.055]),
];

const INFERNO: Stops = &[
    (0.0, [0.001, 0.0, 0.014]),
    (0.25, [0.341, 0.062, 0.429]),
    (0.5, [0.735, 0.216, 0.330]),
    (0.75, [0.978, 0.557, 0.035]),
    (1.0, [0.988, 1.0, 0.644]),
];

const MAGMA: Stops = &[
    (0.0, [0.001, 0.0, 0.014]),
    (0.25, [0.316, 0.071, 0.485]),
    (0.5, [0.716, 0.215, 0.475]),
    (0.75, [0.987, 0.535, 0.382]),
    (1.0, [0.987, 0.991, 0.750]),
];

const PLASMA: Stops = &[
    (0.0, [0.050, 0.030, 0.528]),
    (0.25, [0.494, 0.012, 0.658]),
    (0.5, [0.798, 0.280, 0.470]),
    (0.75, [0.973, 0.585, 0.252]),
    (1.0, [0.940, 0.975, 0.131]),
];

const VIRIDIS: Stops = &[
    (0.0, [0.267, 0.005, 0.329]),
    (0.25, [0.229, 0.322, 0.546]),
    (0.5, [0.128, 0.567, 0.551]),
    (0.75, [0.369, 0.789, 0.383]),
    (1.0, [0.993, 0.906, 0.144]),
];

fn interpolate_stops(stops: Stops, t: f64) -> [f64; 3] {
    let (mut lo, mut hi) = (stops[0], stops[stops.len() - 1]);
    for pair in stops.windows(2) {
        if t >= pair[0].0 && t <= pair[1].0 {
            lo = pair[0];
            hi = pair[1];
            break;
        }
    }
    let width = hi.0 - lo.0;
    let frac = if width > 0.0 { (t - lo.0) / width } else { 0.0 };
    [
        lo.1[0] + (hi.1[0] - lo.1[0]) * frac,
        lo.1[1] + (hi.1[1] - lo.1[1]) * frac,
        lo.1[2] + (hi.1[2] - lo.1[2]) * frac,
    ]
}

fn cubehelix(t: f64) -> [f64; 3] {
    const START: f64 = 0.5;
    const ROTATIONS: f64 = -1.5;
    const HUE: f64 = 1.0;

    let angle = 2.0 * std::f64::consts::PI * (START / 3.0 + 1.0 + ROTATIONS * t);
    let amp = HUE * t * (1.0 - t) / 2.0;
    let (sin, cos) = angle.sin_cos();
    [
        (t + amp * (-0.148_61 * cos + 1.782_77 * sin)).clamp(0.0, 1.0),
        (t + amp * (-0.292_27 * cos - 0.906_49 * sin)).clamp(0.0, 1.0),
        (t + amp * (1.972_94 * cos)).clamp(0.0, 1.0),
    ]
}

impl ColourTable {
    /// All tables, in menu order.
    pub const ALL: [ColourTable; 14] = [
        ColourTable::Greyscale,
        ColourTable::Negative,
        ColourTable::Red,
        ColourTable::Green,
        ColourTable::Blue,
        ColourTable::Hot,
        ColourTable::Rainbow,
        ColourTable::Haxby,
        ColourTable::Cubehelix,
        ColourTable::Parula,
        ColourTable::Inferno,
        ColourTable::Magma,
        ColourTable::Plasma,
        ColourTable::Viridis,
    ];

    /// Name used in URLs and menus.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ColourTable::Greyscale => "greyscale",
            ColourTable::Negative => "negative",
            ColourTable::Red => "red",
            ColourTable::Green => "green",
            ColourTable::Blue => "blue",
            ColourTable::Hot => "hot",
            ColourTable::Rainbow => "rainbow",
            ColourTable::Haxby => "haxby",
            ColourTable::Cubehelix => "cubehelix",
            ColourTable::Parula => "parula",
            ColourTable::Inferno => "inferno",
            ColourTable::Magma => "magma",
            ColourTable::Plasma => "plasma",
            ColourTable::Viridis => "viridis",
        }
    }

    /// Continuous colour at `t` in `[0, 1]`, as RGB fractions.
    #[must_use]
    pub fn sample(self, t: f64) -> [f64; 3] {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        match self {
            ColourTable::Greyscale => [t, t, t],
            ColourTable::Negative => [1.0 - t, 1.0 - t, 1.0 - t],
            ColourTable::Red => [t, 0.0, 0.0],
            ColourTable::Green => [0.0, t, 0.0],
            ColourTable::Blue => [0.0, 0.0, t],
            ColourTable::Hot => interpolate_stops(HOT, t),
            ColourTable::Rainbow => interpolate_stops(RAINBOW, t),
            ColourTable::Haxby => interpolate_stops(HAXBY, t),
            ColourTable::Cubehelix => cubehelix(t),
            ColourTable::Parula => interpolate_stops(PARULA, t),
            ColourTable::Inferno => interpolate_stops(INFERNO, t),
            ColourTable::Magma => interpolate_stops(MAGMA, t),
            ColourTable::Plasma => interpolate_stops(PLASMA, t),
            ColourTable::Viridis => interpolate_stops(VIRIDIS, t),
        }
    }

    /// Apply the table to a normalized value [0, 1] and return opaque RGBA
    /// bytes (used for the legend strip).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn apply(self, val: f32) -> [u8; 4] {
        let [r, g, b] = self.sample(f64::from(val));
        [
            f32_to_u8((r * 255.0) as f32),
            f32_to_u8((g * 255.0) as f32),
            f32_to_u8((b * 255.0) as f32),
            255,
        ]
    }

    /// Sampled lookup table for the per-pixel kernels.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn lut(self) -> ColourLut {
        let mut lut = ColourLut {
            r: [0.0; NO_COLOURS + 1],
            g: [0.0; NO_COLOURS + 1],
            b: [0.0; NO_COLOURS + 1],
        };
        for i in 0..=NO_COLOURS {
            let [r, g, b] = self.sample(usize_to_f64(i) / usize_to_f64(NO_COLOURS));
            lut.r[i] = r as f32;
            lut.g[i] = g as f32;
            lut.b[i] = b as f32;
        }
        lut
    }
}

impl fmt::Display for ColourTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColourTable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        let name = match name.as_str() {
            "grayscale" | "gray" | "grey" => "greyscale",
            other => other,
        };
        ColourTable::ALL
            .into_iter()
            .find(|table| table.as_str() == name)
            .ok_or_else(|| Error::UnknownColourTable(s.to_string()))
    }
}

/// A colour table sampled at `NO_COLOURS + 1` points.
#[derive(Debug, Clone)]
pub struct ColourLut {
    r: [f32; NO_COLOURS + 1],
    g: [f32; NO_COLOURS + 1],
    b: [f32; NO_COLOURS + 1],
}

impl ColourLut {
    /// Interpolated colour for an 8-bit luma value.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn rgb(&self, luma: u8) -> [u8; 3] {
        let interp_factor = NO_COLOURS as f32 / 256.0;
        let pos = f32::from(luma) * interp_factor;
        let x0 = pos.floor() as usize;
        let frac = pos - pos.floor();
        let lerp = |table: &[f32; NO_COLOURS + 1]| {
            f32_to_u8(255.0 * (table[x0] + (table[x0 + 1] - table[x0]) * frac))
        };
        [lerp(&self.r), lerp(&self.g), lerp(&self.b)]
    }
}

/// One of the three channels of an RGB composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeChannel {
    /// First dataset.
    Red,
    /// Second dataset.
    Green,
    /// Third dataset.
    Blue,
}

impl CompositeChannel {
    /// Channel owned by the dataset at `index` (0-based), if any.
    #[must_use]
    pub fn for_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(CompositeChannel::Red),
            1 => Some(CompositeChannel::Green),
            2 => Some(CompositeChannel::Blue),
            _ => None,
        }
    }

    /// Byte offset inside an RGBA pixel.
    #[must_use]
    pub fn offset(self) -> usize {
        match self {
            CompositeChannel::Red => 0,
            CompositeChannel::Green => 1,
            CompositeChannel::Blue => 2,
        }
    }
}

fn check_planes(
    canvas: &[u8],
    luma: &[u8],
    alpha: &[u8],
    width: usize,
    height: usize,
    stride: usize,
) -> std::result::Result<(), FrameError> {
    if stride < width {
        return Err(FrameError::InvalidStride { stride, width });
    }
    let pixels = width * height;
    if alpha.len() < pixels {
        return Err(FrameError::PlaneTooShort {
            required: pixels,
            actual: alpha.len(),
        });
    }
    if canvas.len() < pixels * 4 {
        return Err(FrameError::PlaneTooShort {
            required: pixels * 4,
            actual: canvas.len(),
        });
    }
    let required = if height == 0 {
        0
    } else {
        stride * (height - 1) + width
    };
    if luma.len() < required {
        return Err(FrameError::PlaneTooShort {
            required,
            actual: luma.len(),
        });
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_alpha(alpha: u8, opacity: f32) -> u8 {
    if alpha == 0 {
        0
    } else {
        f32_to_u8(f32::from(alpha) * opacity.clamp(0.0, 1.0))
    }
}

/// Colour a strided luma plane into a tightly packed RGBA canvas.
///
/// # Errors
/// Returns [`FrameError`] when any buffer is too short for the geometry.
#[allow(clippy::too_many_arguments)]
pub fn apply_colourmap(
    canvas: &mut [u8],
    luma: &[u8],
    alpha: &[u8],
    width: usize,
    height: usize,
    stride: usize,
    invert: bool,
    lut: &ColourLut,
    opacity: f32,
) -> std::result::Result<(), FrameError> {
    check_planes(canvas, luma, alpha, width, height, stride)?;

    let mut dst = 0;
    let mut src_alpha = 0;
    for j in 0..height {
        let row = &luma[j * stride..j * stride + width];
        for &pixel in row {
            let a = alpha[src_alpha];
            src_alpha += 1;
            if a == 0 {
                canvas[dst..dst + 4].copy_from_slice(&[0, 0, 0, 0]);
            } else {
                let pixel = if invert { 255 - pixel } else { pixel };
                let [r, g, b] = lut.rgb(pixel);
                canvas[dst..dst + 4].copy_from_slice(&[r, g, b, scale_alpha(a, opacity)]);
            }
            dst += 4;
        }
    }
    Ok(())
}

/// Greyscale fast path of [`apply_colourmap`].
///
/// # Errors
/// Returns [`FrameError`] when any buffer is too short for the geometry.
#[allow(clippy::too_many_arguments)]
pub fn apply_greyscale(
    canvas: &mut [u8],
    luma: &[u8],
    alpha: &[u8],
    width: usize,
    height: usize,
    stride: usize,
    invert: bool,
    opacity: f32,
) -> std::result::Result<(), FrameError> {
    check_planes(canvas, luma, alpha, width, height, stride)?;

    let mut dst = 0;
    let mut src_alpha = 0;
    for j in 0..height {
        for &pixel in &luma[j * stride..j * stride + width] {
            let a = alpha[src_alpha];
            src_alpha += 1;
            let v = if invert { 255 - pixel } else { pixel };
            let out = if a == 0 {
                [0, 0, 0, 0]
            } else {
                [v, v, v, scale_alpha(a, opacity)]
            };
            canvas[dst..dst + 4].copy_from_slice(&out);
            dst += 4;
        }
    }
    Ok(())
}

/// Write a luma plane into one channel of a shared RGBA canvas.
///
/// Only the owned channel is written; the alpha channel keeps the maximum
/// of all contributions so that a pixel is visible when any dataset has
/// data there.
///
/// # Errors
/// Returns [`FrameError`] when any buffer is too short for the geometry.
#[allow(clippy::too_many_arguments)]
pub fn apply_channel(
    canvas: &mut [u8],
    luma: &[u8],
    alpha: &[u8],
    width: usize,
    height: usize,
    stride: usize,
    invert: bool,
    channel: CompositeChannel,
) -> std::result::Result<(), FrameError> {
    check_planes(canvas, luma, alpha, width, height, stride)?;

    let offset = channel.offset();
    let mut dst = 0;
    let mut src_alpha = 0;
    for j in 0..height {
        for &pixel in &luma[j * stride..j * stride + width] {
            let a = alpha[src_alpha];
            src_alpha += 1;
            let v = if invert { 255 - pixel } else { pixel };
            canvas[dst + offset] = if a == 0 { 0 } else { v };
            canvas[dst + 3] = canvas[dst + 3].max(a);
            dst += 4;
        }
    }
    Ok(())
}

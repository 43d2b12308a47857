//! Error types for cubeview-core.

use thiserror::Error;

/// Result type alias for cubeview operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for cubeview operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Tone-mapping parameters that cannot produce a transfer curve.
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),

    /// Unknown flux curve name.
    #[error("unknown flux curve: {0}")]
    UnknownCurve(String),

    /// Unknown colour table name.
    #[error("unknown colour table: {0}")]
    UnknownColourTable(String),

    /// Unknown beam shape, intensity mode or other named option.
    #[error("unknown {kind}: {value}")]
    UnknownOption { kind: &'static str, value: String },

    /// Frame assembly error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Rejected user input.
    #[error("input error: {0}")]
    Input(#[from] InputError),
}

/// Errors raised while turning decoded planes into a drawable surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Logical dimensions of zero.
    #[error("frame has zero-sized dimensions {width}x{height}")]
    EmptyFrame { width: usize, height: usize },

    /// The decompressed alpha plane does not cover the frame.
    #[error("alpha plane length {actual} does not match {expected} ({width}x{height})")]
    AlphaLengthMismatch {
        expected: usize,
        actual: usize,
        width: usize,
        height: usize,
    },

    /// The pixel plane is shorter than `stride * rows`.
    #[error("pixel plane length {actual} is shorter than required {required}")]
    PlaneTooShort { required: usize, actual: usize },

    /// Stride narrower than the row width.
    #[error("stride {stride} is narrower than row width {width}")]
    InvalidStride { stride: usize, width: usize },
}

/// Errors for values typed in by the user (velocity, redshift, ...).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    /// Text that does not parse as a number.
    #[error("not a number: {0:?}")]
    NotANumber(String),

    /// A number outside the physically meaningful range.
    #[error("{quantity} {value} is outside ({min}, {max})")]
    OutOfRange {
        quantity: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

//! Protocol-level error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while decoding server messages or preparing requests.
#[derive(Error, Debug)]
pub enum Error {
    /// Binary message shorter than its fixed header.
    #[error("truncated message: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    /// Unknown binary message type tag.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u32),

    /// Unknown codec identifier in an image or viewport message.
    #[error("unknown codec identifier: {0:?}")]
    UnknownCodec(String),

    /// Text message that is neither JSON nor a heartbeat echo.
    #[error("malformed text message: {0}")]
    MalformedText(String),

    /// Header JSON that does not describe a usable dataset.
    #[error("invalid dataset header: {0}")]
    InvalidHeader(String),

    /// bincode decoding error.
    #[error("binary decode error: {0}")]
    Bincode(#[from] bincode::Error),

    /// JSON decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Codec or alpha decompression error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] cubeview_core::Error),
}

/// Failures reported by codec sessions and the alpha decompressor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The compressed alpha plane could not be decompressed.
    #[error("alpha decompression failed: {0}")]
    AlphaCorrupt(String),

    /// The decompressed alpha plane has the wrong size.
    #[error("alpha plane decompressed to {actual} bytes, expected {expected}")]
    AlphaLength { expected: usize, actual: usize },

    /// The decoder rejected a coded frame.
    #[error("decode failed: {0}")]
    DecodeFailed(String),

    /// The decoder consumed input but produced no picture.
    #[error("decoder produced no frame")]
    NoFrame,

    /// Decoded picture geometry is unusable.
    #[error("decoded frame error: {0}")]
    Frame(#[from] cubeview_core::FrameError),
}

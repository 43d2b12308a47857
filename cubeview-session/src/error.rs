//! Session error types.

use thiserror::Error;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the session layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// View slot index out of range.
    #[error("no view slot {0}")]
    NoSlot(usize),

    /// The slot has no dataset header yet.
    #[error("view slot {0} has no dataset loaded")]
    NotLoaded(usize),

    /// A composite channel does not match the size of the round.
    #[error("composite channel is {actual:?}, expected {expected:?}")]
    CompositeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// A contour level could not be traced.
    #[error("contour level {0} is not finite")]
    ContourLevel(f64),

    /// The transport refused a request.
    #[error("transport error: {0}")]
    Transport(String),

    /// The session expired; no further requests are sent.
    #[error("session expired")]
    SessionExpired,

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] cubeview_protocol::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] cubeview_core::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<cubeview_core::FrameError> for Error {
    fn from(err: cubeview_core::FrameError) -> Self {
        Error::Core(err.into())
    }
}

impl From<cubeview_core::InputError> for Error {
    fn from(err: cubeview_core::InputError) -> Self {
        Error::Core(err.into())
    }
}

impl From<cubeview_protocol::CodecError> for Error {
    fn from(err: cubeview_protocol::CodecError) -> Self {
        Error::Protocol(err.into())
    }
}

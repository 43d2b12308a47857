//! cubeview-protocol: wire messages, request strings and codec
//! capabilities for the cubeview client.
//!
//! # Key Components
//!
//! - [`Response`] - typed binary server messages, dispatched on the type tag
//! - [`TextMessage`] - JSON notifications and the heartbeat echo
//! - [`Request`] - request strings sent to the server
//! - [`DatasetHeader`] - dataset header JSON, converted into a core `Dataset`
//! - [`CodecSession`] / [`AlphaDecompressor`] - decoder capabilities
//!

pub mod codec;
pub mod error;
pub mod header;
pub mod message;
pub mod request;
pub mod text;

pub use codec::{decode_last, AlphaDecompressor, CodecFactory, CodecId, CodecSession, Lz4Alpha};
pub use error::{CodecError, Error, Result};
pub use header::DatasetHeader;
pub use message::{
    CsvMessage, FrameMessage, HistogramMessage, ImageMessage, MessageHeader, MessageType,
    Response, SpectraMessage, SpectrumMessage, ViewportMessage, HEADER_LEN,
};
pub use request::{ImageRequest, Request, SpectrumRequest, VideoRequest, VideoView};
pub use text::{JsonMessage, TextMessage, HEARTBEAT_PREFIX};

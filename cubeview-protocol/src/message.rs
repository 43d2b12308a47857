//! Binary server messages.
//!
//! Every binary message is a bincode struct (fixed-width little-endian
//! integers, `u64` length prefixes) whose first three fields are
//! `ts: f32`, `seq_id: u32` and `msg_type: u32`. The type tag therefore
//! always sits at byte offset 8 and can be read before choosing the
//! payload struct.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Size of the common `ts`, `seq_id`, `msg_type` prefix.
pub const HEADER_LEN: usize = 12;

/// Binary message type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    /// Spectrum for the region under the cursor.
    Spectrum = 0,
    /// Zoomed sub-region (one or more coded frames).
    Viewport = 1,
    /// Full image refresh.
    Image = 2,
    /// Mean and integrated spectra after a band change.
    FullSpectrumRefresh = 3,
    /// Histogram and statistics after a tone-mapping change.
    HistogramRefresh = 4,
    /// One coded video frame.
    Video = 5,
    /// Spectrum export.
    Csv = 6,
}

impl MessageType {
    /// Map a raw tag to a message type.
    ///
    /// # Errors
    /// Returns [`Error::UnknownMessageType`] for tags outside 0..=6.
    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            0 => Ok(MessageType::Spectrum),
            1 => Ok(MessageType::Viewport),
            2 => Ok(MessageType::Image),
            3 => Ok(MessageType::FullSpectrumRefresh),
            4 => Ok(MessageType::HistogramRefresh),
            5 => Ok(MessageType::Video),
            6 => Ok(MessageType::Csv),
            other => Err(Error::UnknownMessageType(other)),
        }
    }

    #[must_use]
    pub fn tag(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Spectrum => "spectrum",
            MessageType::Viewport => "viewport",
            MessageType::Image => "image",
            MessageType::FullSpectrumRefresh => "spectra",
            MessageType::HistogramRefresh => "histogram",
            MessageType::Video => "video",
            MessageType::Csv => "csv",
        };
        f.write_str(name)
    }
}

/// The fixed prefix shared by all binary messages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageHeader {
    /// Client timestamp (ms since session start) echoed by the server.
    pub ts: f32,
    pub seq_id: u32,
    pub msg_type: u32,
}

impl MessageHeader {
    /// Read the prefix without decoding the payload.
    ///
    /// # Errors
    /// Returns [`Error::Truncated`] if fewer than [`HEADER_LEN`] bytes are
    /// available.
    pub fn peek(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Truncated {
                needed: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        let word = |i: usize| [bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]];
        Ok(Self {
            ts: f32::from_le_bytes(word(0)),
            seq_id: u32::from_le_bytes(word(4)),
            msg_type: u32::from_le_bytes(word(8)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumMessage {
    pub ts: f32,
    pub seq_id: u32,
    pub msg_type: u32,
    /// Server processing time in ms.
    pub elapsed: f32,
    pub spectrum: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportMessage {
    pub ts: f32,
    pub seq_id: u32,
    pub msg_type: u32,
    /// Codec identifier (`"VP9"`, `"HEVC"`).
    pub identifier: String,
    pub width: u32,
    pub height: u32,
    /// Coded frames, decoded in order; the last one is displayed.
    pub image: Vec<Vec<u8>>,
    /// LZ4-compressed alpha plane.
    pub alpha: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMessage {
    pub ts: f32,
    pub seq_id: u32,
    pub msg_type: u32,
    /// Codec identifier (`"VP9"`, `"HEVC"`).
    pub identifier: String,
    pub width: u32,
    pub height: u32,
    /// One coded key frame.
    pub image: Vec<u8>,
    /// LZ4-compressed alpha plane.
    pub alpha: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectraMessage {
    pub ts: f32,
    pub seq_id: u32,
    pub msg_type: u32,
    pub mean_spectrum: Vec<f32>,
    pub integrated_spectrum: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramMessage {
    pub ts: f32,
    pub seq_id: u32,
    pub msg_type: u32,
    pub pmin: f32,
    pub pmax: f32,
    pub black: f32,
    pub white: f32,
    pub median: f32,
    pub sensitivity: f32,
    pub ratio_sensitivity: f32,
    pub hist: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMessage {
    pub ts: f32,
    pub seq_id: u32,
    pub msg_type: u32,
    /// Server processing time in ms.
    pub elapsed: f32,
    pub frame: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvMessage {
    pub ts: f32,
    pub seq_id: u32,
    pub msg_type: u32,
    pub csv: String,
}

/// A decoded binary server message.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Spectrum(SpectrumMessage),
    Viewport(ViewportMessage),
    Image(ImageMessage),
    FullSpectrumRefresh(SpectraMessage),
    HistogramRefresh(HistogramMessage),
    Video(FrameMessage),
    Csv(CsvMessage),
}

impl Response {
    /// Decode a binary message, dispatching on the tag at offset 8.
    ///
    /// # Errors
    /// Returns an error for truncated input, unknown tags or payloads that
    /// do not match the tagged struct.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = MessageHeader::peek(bytes)?;
        let response = match MessageType::from_tag(header.msg_type)? {
            MessageType::Spectrum => Response::Spectrum(bincode::deserialize(bytes)?),
            MessageType::Viewport => Response::Viewport(bincode::deserialize(bytes)?),
            MessageType::Image => Response::Image(bincode::deserialize(bytes)?),
            MessageType::FullSpectrumRefresh => {
                Response::FullSpectrumRefresh(bincode::deserialize(bytes)?)
            }
            MessageType::HistogramRefresh => {
                Response::HistogramRefresh(bincode::deserialize(bytes)?)
            }
            MessageType::Video => Response::Video(bincode::deserialize(bytes)?),
            MessageType::Csv => Response::Csv(bincode::deserialize(bytes)?),
        };
        Ok(response)
    }

    /// Encode with the server's layout (used for captures and tests).
    ///
    /// # Errors
    /// Propagates bincode serialisation failures.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            Response::Spectrum(m) => bincode::serialize(m)?,
            Response::Viewport(m) => bincode::serialize(m)?,
            Response::Image(m) => bincode::serialize(m)?,
            Response::FullSpectrumRefresh(m) => bincode::serialize(m)?,
            Response::HistogramRefresh(m) => bincode::serialize(m)?,
            Response::Video(m) => bincode::serialize(m)?,
            Response::Csv(m) => bincode::serialize(m)?,
        };
        Ok(bytes)
    }

    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Response::Spectrum(_) => MessageType::Spectrum,
            Response::Viewport(_) => MessageType::Viewport,
            Response::Image(_) => MessageType::Image,
            Response::FullSpectrumRefresh(_) => MessageType::FullSpectrumRefresh,
            Response::HistogramRefresh(_) => MessageType::HistogramRefresh,
            Response::Video(_) => MessageType::Video,
            Response::Csv(_) => MessageType::Csv,
        }
    }

    #[must_use]
    pub fn seq_id(&self) -> u32 {
        match self {
            Response::Spectrum(m) => m.seq_id,
            Response::Viewport(m) => m.seq_id,
            Response::Image(m) => m.seq_id,
            Response::FullSpectrumRefresh(m) => m.seq_id,
            Response::HistogramRefresh(m) => m.seq_id,
            Response::Video(m) => m.seq_id,
            Response::Csv(m) => m.seq_id,
        }
    }

    /// Client timestamp echoed by the server.
    #[must_use]
    pub fn timestamp(&self) -> f32 {
        match self {
            Response::Spectrum(m) => m.ts,
            Response::Viewport(m) => m.ts,
            Response::Image(m) => m.ts,
            Response::FullSpectrumRefresh(m) => m.ts,
            Response::HistogramRefresh(m) => m.ts,
            Response::Video(m) => m.ts,
            Response::Csv(m) => m.ts,
        }
    }

    /// Server-side processing time, when the message reports one.
    #[must_use]
    pub fn elapsed_ms(&self) -> Option<f32> {
        match self {
            Response::Spectrum(m) => Some(m.elapsed),
            Response::Video(m) => Some(m.elapsed),
            _ => None,
        }
    }
}

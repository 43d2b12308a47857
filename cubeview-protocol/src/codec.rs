//! Codec capabilities.
//!
//! The pixel codecs (VP9, HEVC) are external. The client only needs a
//! session object that turns coded frame bytes into an owned luma plane;
//! the returned buffer is moved into frame assembly and dropped when the
//! surface built from it is replaced.

use std::fmt;

use cubeview_core::OwnedFrameBuffer;

use crate::error::{CodecError, Error, Result};

/// Identifier of the codec a server image was encoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    Vp9,
    Hevc,
}

impl CodecId {
    /// Map the wire identifier.
    ///
    /// # Errors
    /// Returns [`Error::UnknownCodec`] for anything but `"VP9"` or `"HEVC"`.
    pub fn from_identifier(identifier: &str) -> Result<Self> {
        match identifier {
            "VP9" => Ok(CodecId::Vp9),
            "HEVC" => Ok(CodecId::Hevc),
            other => Err(Error::UnknownCodec(other.to_string())),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CodecId::Vp9 => "VP9",
            CodecId::Hevc => "HEVC",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live decoder instance.
///
/// Dropping the session releases the decoder.
pub trait CodecSession {
    /// Decode one coded frame.
    ///
    /// # Errors
    /// Returns [`CodecError`] when the bitstream is rejected or no picture
    /// comes out.
    fn decode(&mut self, frame: &[u8]) -> std::result::Result<OwnedFrameBuffer, CodecError>;
}

/// Creates decoder sessions.
pub trait CodecFactory {
    type Session: CodecSession;

    /// Open a decoder for `codec` with the expected picture size.
    ///
    /// # Errors
    /// Returns [`CodecError`] when the codec is unavailable.
    fn open(
        &mut self,
        codec: CodecId,
        width: u32,
        height: u32,
    ) -> std::result::Result<Self::Session, CodecError>;
}

/// Decompresses alpha planes.
pub trait AlphaDecompressor {
    /// Decompress `data`, which must expand to exactly `expected` bytes.
    ///
    /// # Errors
    /// Returns [`CodecError::AlphaCorrupt`] or [`CodecError::AlphaLength`].
    fn decompress(&self, data: &[u8], expected: usize) -> std::result::Result<Vec<u8>, CodecError>;
}

/// LZ4 block decompression, matching the server's `lz4_compress` output.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Alpha;

impl AlphaDecompressor for Lz4Alpha {
    fn decompress(&self, data: &[u8], expected: usize) -> std::result::Result<Vec<u8>, CodecError> {
        let plane = lz4_compress::decompress(data)
            .map_err(|e| CodecError::AlphaCorrupt(format!("{e:?}")))?;
        if plane.len() != expected {
            return Err(CodecError::AlphaLength {
                expected,
                actual: plane.len(),
            });
        }
        Ok(plane)
    }
}

/// Decode every frame in order and keep the last picture.
///
/// Viewport messages may carry several consecutive frames (the decoder
/// needs the earlier ones as references); only the final picture is
/// displayed.
///
/// # Errors
/// Returns the first decode error, or [`CodecError::NoFrame`] for an empty
/// list.
pub fn decode_last<S: CodecSession + ?Sized>(
    session: &mut S,
    frames: &[Vec<u8>],
) -> std::result::Result<OwnedFrameBuffer, CodecError> {
    let mut last = None;
    for frame in frames {
        last = Some(session.decode(frame)?);
    }
    last.ok_or(CodecError::NoFrame)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        calls: usize,
    }

    impl CodecSession for Counting {
        fn decode(&mut self, frame: &[u8]) -> std::result::Result<OwnedFrameBuffer, CodecError> {
            self.calls += 1;
            OwnedFrameBuffer::new(vec![frame.first().copied().unwrap_or(0); 4], 2, 2, 2)
                .map_err(CodecError::from)
        }
    }

    #[test]
    fn test_codec_identifiers() {
        assert_eq!(CodecId::from_identifier("VP9").unwrap(), CodecId::Vp9);
        assert_eq!(CodecId::from_identifier("HEVC").unwrap(), CodecId::Hevc);
        assert!(matches!(
            CodecId::from_identifier("AV1"),
            Err(Error::UnknownCodec(_))
        ));
    }

    #[test]
    fn test_lz4_alpha() {
        let plane: Vec<u8> = (0..64u8).map(|i| if i % 3 == 0 { 255 } else { 0 }).collect();
        let packed = lz4_compress::compress(&plane);
        assert_eq!(Lz4Alpha.decompress(&packed, 64).unwrap(), plane);
        assert!(matches!(
            Lz4Alpha.decompress(&packed, 65),
            Err(CodecError::AlphaLength {
                expected: 65,
                actual: 64
            })
        ));
    }

    #[test]
    fn test_decode_last() {
        let mut session = Counting { calls: 0 };
        let frames = vec![vec![1u8], vec![2u8], vec![3u8]];
        let out = decode_last(&mut session, &frames).unwrap();
        assert_eq!(session.calls, 3);
        assert_eq!(out.luma()[0], 3);
        assert!(matches!(
            decode_last(&mut session, &[]),
            Err(CodecError::NoFrame)
        ));
    }
}

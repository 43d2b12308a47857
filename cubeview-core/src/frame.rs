//! Frame assembly: decoded planes to drawable surfaces.
//!
//! A decoded luma plane plus the decompressed alpha plane become an
//! immutable [`FrameSurface`]. Planes are shared behind `Arc`, so a
//! colour-map or tone change re-renders the same bytes without running
//! assembly again.

use std::sync::Arc;

use crate::colourmap::{apply_colourmap, apply_greyscale, ColourTable};
use crate::error::FrameError;

/// Tight crop of the non-transparent pixels of a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl BoundingBox {
    /// Box covering a whole `width` x `height` plane.
    #[must_use]
    pub fn full(width: usize, height: usize) -> Self {
        Self {
            x: 0,
            y: 0,
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// The 1x1 box at the origin returned for fully transparent planes.
    #[must_use]
    pub fn degenerate() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 1,
            height: 1,
        }
    }

    /// Last column inside the box.
    #[must_use]
    pub fn right(&self) -> usize {
        self.x + self.width - 1
    }

    /// Last row inside the box.
    #[must_use]
    pub fn bottom(&self) -> usize {
        self.y + self.height - 1
    }

    #[must_use]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }

    /// Width over height.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// Compute the tight bounding box of all pixels with alpha > 0.
///
/// Rows are scanned top-down for the first opaque row and bottom-up for the
/// last, then columns are scanned only within that row band. A plane with
/// no opaque pixel yields [`BoundingBox::degenerate`]. Bytes past the end
/// of a short `alpha` slice count as transparent.
#[must_use]
pub fn true_image_dimensions(alpha: &[u8], width: usize, height: usize) -> BoundingBox {
    if width == 0 || height == 0 {
        return BoundingBox::degenerate();
    }

    let opaque = |x: usize, y: usize| alpha.get(y * width + x).is_some_and(|&a| a > 0);
    let row_opaque = |y: usize| (0..width).any(|x| opaque(x, y));

    let Some(y1) = (0..height).find(|&y| row_opaque(y)) else {
        return BoundingBox::degenerate();
    };
    let y2 = (y1..height).rev().find(|&y| row_opaque(y)).unwrap_or(y1);

    let col_opaque = |x: usize| (y1..=y2).any(|y| opaque(x, y));
    let x1 = (0..width).find(|&x| col_opaque(x)).unwrap_or(0);
    let x2 = (x1..width).rev().find(|&x| col_opaque(x)).unwrap_or(x1);

    BoundingBox {
        x: x1,
        y: y1,
        width: x2.abs_diff(x1) + 1,
        height: y2.abs_diff(y1) + 1,
    }
}

/// Transpose a strided `width` x `height` plane into a tight
/// `height` x `width` plane.
#[must_use]
pub fn transpose_plane(plane: &[u8], width: usize, height: usize, stride: usize) -> Vec<u8> {
    let mut out = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            if let Some(&v) = plane.get(y * stride + x) {
                out[x * height + y] = v;
            }
        }
    }
    out
}

/// A decoded pixel plane handed over by a codec session.
///
/// The buffer is owned; it is dropped when the surface built from it is
/// superseded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedFrameBuffer {
    luma: Vec<u8>,
    width: usize,
    height: usize,
    stride: usize,
}

impl OwnedFrameBuffer {
    /// Wrap a decoded luma plane.
    ///
    /// # Errors
    /// Returns [`FrameError`] if the stride is narrower than the width or
    /// the plane does not cover `height` rows.
    pub fn new(
        luma: Vec<u8>,
        width: usize,
        height: usize,
        stride: usize,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyFrame { width, height });
        }
        if stride < width {
            return Err(FrameError::InvalidStride { stride, width });
        }
        let required = stride * (height - 1) + width;
        if luma.len() < required {
            return Err(FrameError::PlaneTooShort {
                required,
                actual: luma.len(),
            });
        }
        Ok(Self {
            luma,
            width,
            height,
            stride,
        })
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[must_use]
    pub fn luma(&self) -> &[u8] {
        &self.luma
    }
}

/// Tightly packed RGBA pixels ready to be drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

/// Immutable renderable unit for one dataset at one zoom level.
#[derive(Debug, Clone)]
pub struct FrameSurface {
    luma: Arc<[u8]>,
    alpha: Arc<[u8]>,
    width: usize,
    height: usize,
    stride: usize,
    bbox: BoundingBox,
    transposed: bool,
}

impl FrameSurface {
    /// Build a surface from a decoded frame and its alpha plane.
    ///
    /// `width` x `height` are the logical image dimensions announced by the
    /// server; the decoded frame may be larger (codec padding). Portrait
    /// images (`width < height`) are transposed so that the stored planes
    /// are always at least as wide as they are tall.
    ///
    /// # Errors
    /// Returns [`FrameError`] when the alpha plane is not exactly
    /// `width * height` bytes or the decoded frame is smaller than the
    /// logical image.
    pub fn assemble(
        frame: OwnedFrameBuffer,
        alpha: Vec<u8>,
        width: usize,
        height: usize,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyFrame { width, height });
        }
        let expected = width * height;
        if alpha.len() != expected {
            return Err(FrameError::AlphaLengthMismatch {
                expected,
                actual: alpha.len(),
                width,
                height,
            });
        }
        if frame.width < width || frame.height < height {
            return Err(FrameError::PlaneTooShort {
                required: frame.stride * (height - 1) + width,
                actual: frame.luma.len(),
            });
        }

        let (luma, alpha, w, h, stride, transposed) = if width < height {
            let luma = transpose_plane(&frame.luma, width, height, frame.stride);
            let alpha = transpose_plane(&alpha, width, height, width);
            (luma, alpha, height, width, height, true)
        } else {
            (frame.luma, alpha, width, height, frame.stride, false)
        };

        let bbox = true_image_dimensions(&alpha, w, h);
        log::debug!("assembled {w}x{h} surface (transposed: {transposed}), bbox {bbox:?}");

        Ok(Self {
            luma: luma.into(),
            alpha: alpha.into(),
            width: w,
            height: h,
            stride,
            bbox,
            transposed,
        })
    }

    /// Stored width (after orientation correction).
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Stored height (after orientation correction).
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[must_use]
    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    /// Whether the planes were transposed from a portrait source.
    #[must_use]
    pub fn is_transposed(&self) -> bool {
        self.transposed
    }

    #[must_use]
    pub fn luma(&self) -> &[u8] {
        &self.luma
    }

    #[must_use]
    pub fn alpha(&self) -> &[u8] {
        &self.alpha
    }

    /// Luma at a stored-orientation pixel, `None` when transparent or out
    /// of range.
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        match self.alpha.get(y * self.width + x) {
            Some(&a) if a > 0 => self.luma.get(y * self.stride + x).copied(),
            _ => None,
        }
    }

    /// Colour the surface with a table.
    ///
    /// # Errors
    /// Only fails if the surface planes were corrupted, which assembly
    /// rules out.
    pub fn render(
        &self,
        table: ColourTable,
        invert: bool,
        opacity: f32,
    ) -> Result<RgbaImage, FrameError> {
        let mut pixels = vec![0u8; self.width * self.height * 4];
        if table == ColourTable::Greyscale {
            apply_greyscale(
                &mut pixels,
                &self.luma,
                &self.alpha,
                self.width,
                self.height,
                self.stride,
                invert,
                opacity,
            )?;
        } else {
            apply_colourmap(
                &mut pixels,
                &self.luma,
                &self.alpha,
                self.width,
                self.height,
                self.stride,
                invert,
                &table.lut(),
                opacity,
            )?;
        }
        Ok(RgbaImage {
            width: self.width,
            height: self.height,
            pixels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_scan() {
        // 4x3, opaque at (1,0) and (2,2)
        let mut alpha = vec![0u8; 12];
        alpha[1] = 255;
        alpha[2 * 4 + 2] = 10;
        let bbox = true_image_dimensions(&alpha, 4, 3);
        assert_eq!(
            bbox,
            BoundingBox {
                x: 1,
                y: 0,
                width: 2,
                height: 3
            }
        );
    }

    #[test]
    fn test_bbox_transparent_plane() {
        let alpha = vec![0u8; 20];
        assert_eq!(true_image_dimensions(&alpha, 5, 4), BoundingBox::degenerate());
    }

    #[test]
    fn test_transpose() {
        // 2 wide, 3 tall, stride 3
        let plane = [1u8, 2, 0, 3, 4, 0, 5, 6, 0];
        assert_eq!(transpose_plane(&plane, 2, 3, 3), vec![1, 3, 5, 2, 4, 6]);
    }

    #[test]
    fn test_assemble_rejects_alpha_mismatch() {
        let frame = OwnedFrameBuffer::new(vec![0; 16], 4, 4, 4).unwrap();
        let err = FrameSurface::assemble(frame, vec![255; 15], 4, 4).unwrap_err();
        assert!(matches!(
            err,
            FrameError::AlphaLengthMismatch {
                expected: 16,
                actual: 15,
                ..
            }
        ));
    }

    #[test]
    fn test_assemble_portrait() {
        // 2x3 portrait image, decoded with stride 4
        let luma = vec![1, 2, 0, 0, 3, 4, 0, 0, 5, 6, 0, 0];
        let frame = OwnedFrameBuffer::new(luma, 2, 3, 4).unwrap();
        let surface = FrameSurface::assemble(frame, vec![255; 6], 2, 3).unwrap();
        assert!(surface.is_transposed());
        assert_eq!((surface.width(), surface.height(), surface.stride()), (3, 2, 3));
        assert_eq!(surface.pixel(2, 0), Some(5));
        assert_eq!(surface.pixel(0, 1), Some(2));
        assert_eq!(surface.bounding_box(), BoundingBox::full(3, 2));
    }

    #[test]
    fn test_render_shares_planes() {
        let frame = OwnedFrameBuffer::new(vec![0, 128, 255, 64], 2, 2, 2).unwrap();
        let surface = FrameSurface::assemble(frame, vec![255, 255, 0, 255], 2, 2).unwrap();
        let copy = surface.clone();
        assert!(Arc::ptr_eq(&surface.luma, &copy.luma));

        let grey = surface.render(ColourTable::Greyscale, false, 1.0).unwrap();
        assert_eq!(&grey.pixels[4..8], &[128, 128, 128, 255]);
        assert_eq!(&grey.pixels[8..12], &[0, 0, 0, 0]);

        let hot = copy.render(ColourTable::Hot, false, 1.0).unwrap();
        assert_eq!(hot.pixels.len(), 16);
        assert_eq!(hot.pixels[11], 0);
    }

    #[test]
    fn test_owned_buffer_validation() {
        assert!(matches!(
            OwnedFrameBuffer::new(vec![0; 3], 2, 2, 2),
            Err(FrameError::PlaneTooShort { required: 4, actual: 3 })
        ));
        assert!(matches!(
            OwnedFrameBuffer::new(vec![], 0, 2, 2),
            Err(FrameError::EmptyFrame { .. })
        ));
    }
}

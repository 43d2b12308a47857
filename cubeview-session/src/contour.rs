//! Iso-luma contour lines over a frame surface.
//!
//! Marching squares over the luma plane; cells touching a transparent
//! pixel are skipped. Levels are traced in parallel.

use rayon::prelude::*;

use cubeview_core::util::usize_to_f64;
use cubeview_core::FrameSurface;

use crate::error::{Error, Result};

/// Line segment between two points in stored-orientation pixel space.
pub type Segment = [[f64; 2]; 2];

/// All segments of one contour level.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourLine {
    pub level: f64,
    pub segments: Vec<Segment>,
}

/// `count` evenly spaced levels strictly between `lo` and `hi`.
#[must_use]
pub fn contour_levels(lo: f64, hi: f64, count: usize) -> Vec<f64> {
    let step = (hi - lo) / usize_to_f64(count + 1);
    (1..=count).map(|i| lo + step * usize_to_f64(i)).collect()
}

/// Trace every level. A level that fails is logged and left out.
#[must_use]
pub fn contour_lines(surface: &FrameSurface, levels: &[f64]) -> Vec<ContourLine> {
    levels
        .par_iter()
        .filter_map(|&level| match trace_level(surface, level) {
            Ok(segments) => Some(ContourLine { level, segments }),
            Err(e) => {
                log::warn!("skipping contour: {e}");
                None
            }
        })
        .collect()
}

// Cell edges: top, right, bottom, left.
const TOP: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const LEFT: usize = 3;

/// Trace one level with marching squares.
///
/// # Errors
/// Returns [`Error::ContourLevel`] for a non-finite level.
pub fn trace_level(surface: &FrameSurface, level: f64) -> Result<Vec<Segment>> {
    if !level.is_finite() {
        return Err(Error::ContourLevel(level));
    }
    let (w, h, stride) = (surface.width(), surface.height(), surface.stride());
    let (luma, alpha) = (surface.luma(), surface.alpha());
    let mut segments = Vec::new();
    if w < 2 || h < 2 {
        return Ok(segments);
    }

    for y in 0..h - 1 {
        for x in 0..w - 1 {
            let corners = [(x, y), (x + 1, y), (x + 1, y + 1), (x, y + 1)];
            if corners.iter().any(|&(cx, cy)| alpha[cy * w + cx] == 0) {
                continue;
            }
            // tl, tr, br, bl
            let v = corners.map(|(cx, cy)| f64::from(luma[cy * stride + cx]));
            let case = v
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &vi)| if vi >= level { acc | (1 << i) } else { acc });

            let edge = |e: usize| -> [f64; 2] {
                let (a, b) = match e {
                    TOP => (0, 1),
                    RIGHT => (1, 2),
                    BOTTOM => (3, 2),
                    _ => (0, 3),
                };
                let t = if (v[b] - v[a]).abs() > f64::EPSILON {
                    ((level - v[a]) / (v[b] - v[a])).clamp(0.0, 1.0)
                } else {
                    0.5
                };
                let (ax, ay) = corners[a];
                let (bx, by) = corners[b];
                [
                    usize_to_f64(ax) + t * (usize_to_f64(bx) - usize_to_f64(ax)),
                    usize_to_f64(ay) + t * (usize_to_f64(by) - usize_to_f64(ay)),
                ]
            };
            let centre_above = v.iter().sum::<f64>() / 4.0 >= level;

            let pairs: &[(usize, usize)] = match case {
                1 | 14 => &[(LEFT, TOP)],
                2 | 13 => &[(TOP, RIGHT)],
                3 | 12 => &[(LEFT, RIGHT)],
                4 | 11 => &[(RIGHT, BOTTOM)],
                6 | 9 => &[(TOP, BOTTOM)],
                7 | 8 => &[(LEFT, BOTTOM)],
                5 if centre_above => &[(TOP, RIGHT), (BOTTOM, LEFT)],
                5 => &[(LEFT, TOP), (RIGHT, BOTTOM)],
                10 if centre_above => &[(LEFT, TOP), (RIGHT, BOTTOM)],
                10 => &[(TOP, RIGHT), (BOTTOM, LEFT)],
                _ => &[],
            };
            segments.extend(pairs.iter().map(|&(a, b)| [edge(a), edge(b)]));
        }
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubeview_core::OwnedFrameBuffer;

    fn bright_centre(alpha: u8) -> FrameSurface {
        #[rustfmt::skip]
        let luma = vec![
            0, 0,   0,   0,
            0, 200, 200, 0,
            0, 200, 200, 0,
            0, 0,   0,   0,
        ];
        let frame = OwnedFrameBuffer::new(luma, 4, 4, 4).unwrap();
        FrameSurface::assemble(frame, vec![alpha; 16], 4, 4).unwrap()
    }

    #[test]
    fn test_levels_are_interior() {
        let levels = contour_levels(0.0, 255.0, 4);
        assert_eq!(levels.len(), 4);
        assert!((levels[0] - 51.0).abs() < 1e-9);
        assert!(levels.iter().all(|&l| l > 0.0 && l < 255.0));
    }

    #[test]
    fn test_closed_ring_around_peak() {
        let segments = trace_level(&bright_centre(255), 100.0).unwrap();
        assert_eq!(segments.len(), 8);
        for [a, b] in &segments {
            for p in [a, b] {
                assert!(p[0] > 0.0 && p[0] < 3.0 && p[1] > 0.0 && p[1] < 3.0);
            }
        }
    }

    #[test]
    fn test_transparent_cells_are_skipped() {
        assert!(trace_level(&bright_centre(0), 100.0).unwrap().is_empty());
    }

    #[test]
    fn test_failed_level_is_dropped() {
        let lines = contour_lines(&bright_centre(255), &[f64::NAN, 100.0]);
        assert_eq!(lines.len(), 1);
        assert!((lines[0].level - 100.0).abs() < f64::EPSILON);
    }
}

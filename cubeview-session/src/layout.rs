//! Screen placement of one or more views.

use cubeview_core::util::usize_to_f64;
use cubeview_core::BoundingBox;

use crate::config::ViewportConfig;
use crate::viewport::Rect;

/// Columns and rows of the grid holding `count` views: a single row up to
/// three views, then the smallest near-square grid.
#[must_use]
pub fn grid_shape(count: usize) -> (usize, usize) {
    match count {
        0 => (0, 0),
        1..=3 => (count, 1),
        _ => {
            let mut cols = 1;
            while cols * cols < count {
                cols += 1;
            }
            (cols, count.div_ceil(cols))
        }
    }
}

/// Anchor rectangles for `count` views inside `area`.
///
/// Each grid cell is shrunk by the display scale for `count` views and
/// centred within the cell.
#[must_use]
pub fn tile_anchors(count: usize, area: &Rect, config: &ViewportConfig) -> Vec<Rect> {
    let (cols, rows) = grid_shape(count);
    if cols == 0 {
        return Vec::new();
    }
    let scale = config.tile_scale(count);
    let cell_w = area.width / usize_to_f64(cols);
    let cell_h = area.height / usize_to_f64(rows);
    let (w, h) = (cell_w * scale, cell_h * scale);

    (0..count)
        .map(|i| {
            let (col, row) = (i % cols, i / cols);
            Rect::new(
                area.x + usize_to_f64(col) * cell_w + (cell_w - w) / 2.0,
                area.y + usize_to_f64(row) * cell_h + (cell_h - h) / 2.0,
                w,
                h,
            )
        })
        .collect()
}

/// Largest rectangle with the aspect ratio of `bbox` that fits `anchor`,
/// centred inside it.
#[must_use]
pub fn fit_bounding_box(bbox: &BoundingBox, anchor: &Rect) -> Rect {
    let aspect = bbox.aspect();
    if !(aspect.is_finite() && aspect > 0.0) || anchor.width <= 0.0 || anchor.height <= 0.0 {
        return *anchor;
    }
    let (w, h) = if anchor.width / anchor.height > aspect {
        (anchor.height * aspect, anchor.height)
    } else {
        (anchor.width, anchor.width / aspect)
    };
    Rect::new(
        anchor.x + (anchor.width - w) / 2.0,
        anchor.y + (anchor.height - h) / 2.0,
        w,
        h,
    )
}

/// Source rectangle covered by a bounding box.
#[must_use]
pub fn bounding_box_rect(bbox: &BoundingBox) -> Rect {
    Rect::new(
        usize_to_f64(bbox.x),
        usize_to_f64(bbox.y),
        usize_to_f64(bbox.width),
        usize_to_f64(bbox.height),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_grid_shape() {
        assert_eq!(grid_shape(1), (1, 1));
        assert_eq!(grid_shape(3), (3, 1));
        assert_eq!(grid_shape(4), (2, 2));
        assert_eq!(grid_shape(5), (3, 2));
    }

    #[test]
    fn test_single_anchor_is_centred_and_scaled() {
        let area = Rect::new(0.0, 0.0, 1000.0, 500.0);
        let anchors = tile_anchors(1, &area, &ViewportConfig::default());
        assert_eq!(anchors.len(), 1);
        let a = anchors[0];
        assert_relative_eq!(a.width, 800.0);
        assert_relative_eq!(a.height, 400.0);
        assert_relative_eq!(a.x, 100.0);
        assert_relative_eq!(a.y, 50.0);
    }

    #[test]
    fn test_anchors_do_not_overlap() {
        let area = Rect::new(0.0, 0.0, 1200.0, 800.0);
        let anchors = tile_anchors(4, &area, &ViewportConfig::default());
        for (i, a) in anchors.iter().enumerate() {
            for b in &anchors[i + 1..] {
                let disjoint = a.x + a.width <= b.x
                    || b.x + b.width <= a.x
                    || a.y + a.height <= b.y
                    || b.y + b.height <= a.y;
                assert!(disjoint);
            }
        }
    }

    #[test]
    fn test_fit_keeps_aspect() {
        let bbox = BoundingBox {
            x: 10,
            y: 20,
            width: 200,
            height: 100,
        };
        let anchor = Rect::new(0.0, 0.0, 400.0, 400.0);
        let r = fit_bounding_box(&bbox, &anchor);
        assert_relative_eq!(r.width, 400.0);
        assert_relative_eq!(r.height, 200.0);
        assert_relative_eq!(r.y, 100.0);
    }
}

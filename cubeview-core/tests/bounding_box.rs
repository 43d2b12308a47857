use cubeview_core::{true_image_dimensions, BoundingBox, FrameSurface, OwnedFrameBuffer};

/// Small deterministic generator so the sweep is reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> usize {
        usize::try_from(self.next() % n).unwrap()
    }
}

fn brute_force(alpha: &[u8], width: usize, height: usize) -> Option<(usize, usize, usize, usize)> {
    let mut bounds: Option<(usize, usize, usize, usize)> = None;
    for y in 0..height {
        for x in 0..width {
            if alpha[y * width + x] > 0 {
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x1, y1, x2, y2)) => (x1.min(x), y1.min(y), x2.max(x), y2.max(y)),
                });
            }
        }
    }
    bounds
}

#[test]
fn test_bbox_matches_brute_force() {
    let mut rng = Lcg(42);
    for _ in 0..500 {
        let width = 1 + rng.below(40);
        let height = 1 + rng.below(40);
        let mut alpha = vec![0u8; width * height];
        let opaque = rng.below(6);
        for _ in 0..opaque {
            let idx = rng.below(u64::try_from(alpha.len()).unwrap());
            alpha[idx] = 1 + u8::try_from(rng.below(255)).unwrap();
        }

        let bbox = true_image_dimensions(&alpha, width, height);
        assert!(bbox.width >= 1 && bbox.height >= 1);

        match brute_force(&alpha, width, height) {
            None => assert_eq!(bbox, BoundingBox::degenerate()),
            Some((x1, y1, x2, y2)) => {
                assert_eq!((bbox.x, bbox.y, bbox.right(), bbox.bottom()), (x1, y1, x2, y2));
                assert!(bbox.right() < width && bbox.bottom() < height);
                for y in 0..height {
                    for x in 0..width {
                        if alpha[y * width + x] > 0 {
                            assert!(bbox.contains(x, y));
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn test_each_edge_is_attained() {
    // a diagonal cross leaves the corners of the box transparent
    let (width, height) = (9, 7);
    let mut alpha = vec![0u8; width * height];
    alpha[2 * width + 4] = 255; // top
    alpha[5 * width + 4] = 255; // bottom
    alpha[3 * width + 1] = 255; // left
    alpha[4 * width + 7] = 255; // right

    let bbox = true_image_dimensions(&alpha, width, height);
    assert_eq!(
        bbox,
        BoundingBox {
            x: 1,
            y: 2,
            width: 7,
            height: 4
        }
    );
}

#[test]
fn test_surface_bbox_after_transpose() {
    // portrait 3x5 with data only in the middle row band
    let (width, height) = (3, 5);
    let mut alpha = vec![0u8; width * height];
    alpha[width + 2] = 255;
    alpha[3 * width] = 255;
    let frame = OwnedFrameBuffer::new(vec![7; width * height], width, height, width).unwrap();
    let surface = FrameSurface::assemble(frame, alpha, width, height).unwrap();

    assert!(surface.is_transposed());
    let bbox = surface.bounding_box();
    // rows 1..=3 of the portrait image become columns 1..=3
    assert_eq!((bbox.x, bbox.width), (1, 3));
    assert_eq!((bbox.y, bbox.height), (0, 3));
    assert!(bbox.right() < surface.width() && bbox.bottom() < surface.height());
}

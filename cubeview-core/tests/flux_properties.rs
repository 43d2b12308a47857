#![allow(clippy::uninlined_format_args)]
use approx::assert_relative_eq;
use cubeview_core::{
    flux_to_pixel, pixel_to_flux, sensitivity_from_slider, Dataset, FluxCurve, FluxParams,
    PixelStats,
};

const SENSITIVITIES: [f64; 7] = [0.01, 0.05, 0.3, 1.0, 4.0, 25.0, 100.0];

fn windows() -> Vec<(f64, f64, f64)> {
    vec![
        (10.0, 200.0, 80.0),
        (-1.0e-3, 2.5e-3, 1.0e-4),
        (0.0, 1.0, 0.5),
        (-500.0, 12_000.0, 30.0),
    ]
}

#[test]
fn test_round_trip_all_curves() {
    for curve in FluxCurve::ALL {
        for (black, white, median) in windows() {
            for s in SENSITIVITIES {
                let params = FluxParams::new(black, white, median)
                    .with_base_sensitivity(1.0 / (white - black))
                    .with_noise(s);
                for i in 0..=1000 {
                    let p = f64::from(i) / 1000.0;
                    let flux = pixel_to_flux(p, curve, &params);
                    let back = flux_to_pixel(flux, curve, &params);
                    assert!(
                        (back - p).abs() < 1e-9,
                        "{} black={} white={} s={} p={} -> flux={} -> {}",
                        curve,
                        black,
                        white,
                        s,
                        p,
                        flux,
                        back
                    );
                }
            }
        }
    }
}

#[test]
fn test_monotone_curves() {
    for curve in FluxCurve::ALL {
        for (black, white, median) in windows() {
            for s in SENSITIVITIES {
                let params = FluxParams::new(black, white, median).with_noise(s);
                let span = white - black;
                // ratio is only required to be monotone from black upwards
                let start = if curve == FluxCurve::Ratio {
                    black
                } else {
                    black - span
                };
                let mut prev = f64::NEG_INFINITY;
                for i in 0..=3000 {
                    let v = start + (white + span - start) * f64::from(i) / 3000.0;
                    let p = flux_to_pixel(v, curve, &params);
                    assert!(
                        p >= prev - 1e-12,
                        "{} not monotone at {}: {} < {}",
                        curve,
                        v,
                        p,
                        prev
                    );
                    assert!((0.0..=1.0).contains(&p));
                    prev = p;
                }
            }
        }
    }
}

#[test]
fn test_slider_fifty_is_unit_sensitivity() {
    assert_relative_eq!(sensitivity_from_slider(50.0), 1.0, epsilon = 1e-12);
}

/// Server-side logistic tone mapping, written out independently.
fn server_logistic(x: f64, median: f64, sensitivity: f64) -> f64 {
    (1.0 / (1.0 + (-6.0 * (x - median) * sensitivity).exp())).clamp(0.0, 1.0)
}

#[test]
fn test_end_to_end_logistic_luma() {
    let (black, white, median) = (10.0, 200.0, 80.0);
    let base = 1.0 / (white - black);
    let mut dataset = Dataset::new("e2e", 800, 600, 1)
        .with_stats(PixelStats {
            min: 0.0,
            max: 250.0,
            median,
            black,
            white,
            sensitivity: base,
            ratio_sensitivity: base,
        })
        .with_curve(FluxCurve::Logistic);
    dataset.noise = sensitivity_from_slider(50.0);

    let mapper = dataset.tone_mapper().unwrap();
    let client_flux = mapper.flux_at_luma(128);

    // invert the server formula for level 128/255
    let sensitivity = dataset.noise * base;
    let level: f64 = 128.0 / 255.0;
    let server_flux = median - (1.0 / level - 1.0).ln() / (6.0 * sensitivity);

    assert_relative_eq!(client_flux, server_flux, max_relative = 1e-6);
    assert_relative_eq!(
        server_logistic(client_flux, median, sensitivity),
        level,
        max_relative = 1e-6
    );
    // the server quantises by truncation, so 128 must come back as 128
    let server_byte = (255.0 * server_logistic(client_flux + 1e-9, median, sensitivity)) as u8;
    assert_eq!(server_byte, 128);
}

#[test]
fn test_overlay_matches_inverse() {
    let params = FluxParams::new(10.0, 200.0, 80.0);
    let mapper = cubeview_core::ToneMapper::new(FluxCurve::Square, params).unwrap();
    let line = mapper.overlay_polyline(0.0, 250.0, 100);
    assert_eq!(line.len(), 101);
    for [flux, level] in line {
        if flux > 0.0 && flux < 250.0 {
            assert_relative_eq!(mapper.flux_to_pixel(flux), level, epsilon = 1e-9);
        }
    }
}

//! Cursor velocity estimation for latency compensation.
//!
//! A constant-velocity Kalman filter over `[px, py, vx, vy]`. The
//! measurement is the raw cursor position together with the first-difference
//! velocity `(cur - prev) / dt`, so the observation matrix is the identity.
//! Time is in milliseconds and positions in screen pixels.

use std::time::Instant;

use nalgebra::{Matrix4, Vector2, Vector4};

use crate::config::KalmanConfig;

/// Four-state Kalman filter with an identity measurement model.
#[derive(Debug, Clone)]
pub struct CursorKalman {
    x: Vector4<f64>,
    p: Matrix4<f64>,
    process_noise: f64,
    r: Matrix4<f64>,
}

impl CursorKalman {
    #[must_use]
    pub fn new(config: &KalmanConfig) -> Self {
        Self {
            x: Vector4::zeros(),
            p: Matrix4::zeros(),
            process_noise: config.process_noise,
            r: Matrix4::from_diagonal(&Vector4::new(
                config.position_noise,
                config.position_noise,
                config.velocity_noise,
                config.velocity_noise,
            )),
        }
    }

    /// Restart at `position` with zero velocity and zero covariance.
    pub fn reset(&mut self, position: Vector2<f64>) {
        self.x = Vector4::new(position.x, position.y, 0.0, 0.0);
        self.p = Matrix4::zeros();
    }

    #[must_use]
    pub fn state(&self) -> Vector4<f64> {
        self.x
    }

    #[must_use]
    pub fn covariance(&self) -> Matrix4<f64> {
        self.p
    }

    #[must_use]
    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.x[2], self.x[3])
    }

    /// One predict/correct step with measurement `z` after `dt_ms`.
    ///
    /// Steps with a non-positive `dt_ms` are ignored. If the innovation
    /// covariance is singular the prediction is kept uncorrected.
    pub fn step(&mut self, z: Vector4<f64>, dt_ms: f64) {
        if !(dt_ms > 0.0 && dt_ms.is_finite()) || !z.iter().all(|v| v.is_finite()) {
            return;
        }

        let a = Matrix4::new(
            1.0, 0.0, dt_ms, 0.0, //
            0.0, 1.0, 0.0, dt_ms, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        );
        let q = Matrix4::from_diagonal(&Vector4::new(
            0.0,
            0.0,
            self.process_noise * dt_ms,
            self.process_noise * dt_ms,
        ));

        // predict
        let x_pred = a * self.x;
        let p_pred = a * self.p * a.transpose() + q;

        // correct (H = I)
        let s = p_pred + self.r;
        let Some(s_inv) = s.try_inverse() else {
            log::debug!("singular innovation covariance, skipping correction");
            self.x = x_pred;
            self.p = p_pred;
            return;
        };
        let k = p_pred * s_inv;
        self.x = x_pred + k * (z - x_pred);
        self.p = (Matrix4::identity() - k) * p_pred;
    }
}

/// Predicts where the cursor will be once a request completes.
#[derive(Debug, Clone)]
pub struct CursorPredictor {
    filter: CursorKalman,
    last: Option<(Vector2<f64>, Instant)>,
}

impl CursorPredictor {
    #[must_use]
    pub fn new(config: &KalmanConfig) -> Self {
        Self {
            filter: CursorKalman::new(config),
            last: None,
        }
    }

    /// Start a new interaction (pointer entered the canvas).
    pub fn reset(&mut self, position: Vector2<f64>, now: Instant) {
        self.filter.reset(position);
        self.last = Some((position, now));
    }

    /// Feed a pointer sample taken at `now`.
    pub fn observe(&mut self, position: Vector2<f64>, now: Instant) {
        let Some((prev, prev_time)) = self.last else {
            self.reset(position, now);
            return;
        };
        let dt_ms = now.saturating_duration_since(prev_time).as_secs_f64() * 1000.0;
        if dt_ms <= 0.0 {
            return;
        }
        let velocity = (position - prev) / dt_ms;
        self.filter.step(
            Vector4::new(position.x, position.y, velocity.x, velocity.y),
            dt_ms,
        );
        self.last = Some((position, now));
    }

    /// Estimated velocity in pixels per millisecond.
    #[must_use]
    pub fn velocity(&self) -> Vector2<f64> {
        self.filter.velocity()
    }

    /// Last measured position extrapolated by `latency_ms`.
    #[must_use]
    pub fn predict(&self, latency_ms: f64) -> Option<Vector2<f64>> {
        let (measured, _) = self.last?;
        let latency = if latency_ms.is_finite() {
            latency_ms.max(0.0)
        } else {
            0.0
        };
        Some(measured + self.velocity() * latency)
    }

    #[must_use]
    pub fn filter(&self) -> &CursorKalman {
        &self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::time::Duration;

    #[test]
    fn test_reset_zeroes_velocity_and_covariance() {
        let mut f = CursorKalman::new(&KalmanConfig::default());
        f.step(Vector4::new(5.0, 5.0, 1.0, 1.0), 10.0);
        f.reset(Vector2::new(3.0, 4.0));
        assert_eq!(f.state(), Vector4::new(3.0, 4.0, 0.0, 0.0));
        assert_eq!(f.covariance(), Matrix4::zeros());
    }

    #[test]
    fn test_non_positive_dt_is_ignored() {
        let mut f = CursorKalman::new(&KalmanConfig::default());
        f.reset(Vector2::new(1.0, 1.0));
        f.step(Vector4::new(9.0, 9.0, 1.0, 1.0), 0.0);
        f.step(Vector4::new(9.0, 9.0, 1.0, 1.0), -3.0);
        assert_eq!(f.state(), Vector4::new(1.0, 1.0, 0.0, 0.0));
    }

    #[test]
    fn test_converges_on_constant_velocity() {
        let t0 = Instant::now();
        let mut p = CursorPredictor::new(&KalmanConfig::default());
        p.reset(Vector2::new(0.0, 0.0), t0);
        // 0.5 px/ms to the right, 0.25 px/ms down, sampled every 16 ms
        for i in 1..=200u32 {
            let t = f64::from(i) * 16.0;
            p.observe(
                Vector2::new(0.5 * t, 0.25 * t),
                t0 + Duration::from_millis(u64::from(i) * 16),
            );
        }
        let v = p.velocity();
        assert_relative_eq!(v.x, 0.5, epsilon = 1e-3);
        assert_relative_eq!(v.y, 0.25, epsilon = 1e-3);

        let predicted = p.predict(100.0).unwrap();
        assert_relative_eq!(predicted.x, 0.5 * 3200.0 + 50.0, epsilon = 0.5);
        assert_relative_eq!(predicted.y, 0.25 * 3200.0 + 25.0, epsilon = 0.5);
    }

    #[test]
    fn test_predict_before_samples() {
        let p = CursorPredictor::new(&KalmanConfig::default());
        assert!(p.predict(10.0).is_none());
    }

    #[test]
    fn test_singular_innovation_keeps_prediction() {
        let config = KalmanConfig {
            process_noise: 0.0,
            position_noise: 0.0,
            velocity_noise: 0.0,
        };
        let mut f = CursorKalman::new(&config);
        f.reset(Vector2::new(2.0, 2.0));
        f.step(Vector4::new(10.0, 10.0, 1.0, 1.0), 5.0);
        assert_eq!(f.state(), Vector4::new(2.0, 2.0, 0.0, 0.0));
    }
}

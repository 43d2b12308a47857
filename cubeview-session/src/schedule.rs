//! Scheduled tasks owned by the component that arms them.
//!
//! Time is always passed in explicitly, so the state machines stay
//! deterministic under test. Arming a [`Timer`] replaces any pending
//! deadline; there is never more than one outstanding task per timer.

use std::time::{Duration, Instant};

/// One-shot deadline.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `delay` after `now`, cancelling any pending deadline.
    pub fn arm(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` exactly once when the deadline has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Minimum spacing between repeated actions.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Whether the action may run at `now`.
    #[must_use]
    pub fn ready(&self, now: Instant) -> bool {
        self.last
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval)
    }

    /// Record a run at `now` if allowed; returns whether it was.
    pub fn try_fire(&mut self, now: Instant) -> bool {
        if self.ready(now) {
            self.last = Some(now);
            true
        } else {
            false
        }
    }

    /// Record a run unconditionally (forced refresh).
    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_fires_once() {
        let t0 = Instant::now();
        let mut timer = Timer::new();
        timer.arm(t0, Duration::from_millis(250));
        assert!(!timer.poll(t0 + Duration::from_millis(249)));
        assert!(timer.poll(t0 + Duration::from_millis(250)));
        assert!(!timer.poll(t0 + Duration::from_millis(900)));
    }

    #[test]
    fn test_rearm_replaces_deadline() {
        let t0 = Instant::now();
        let mut timer = Timer::new();
        timer.arm(t0, Duration::from_millis(100));
        timer.arm(t0 + Duration::from_millis(80), Duration::from_millis(100));
        assert!(!timer.poll(t0 + Duration::from_millis(120)));
        assert!(timer.poll(t0 + Duration::from_millis(180)));
    }

    #[test]
    fn test_cancel() {
        let t0 = Instant::now();
        let mut timer = Timer::new();
        timer.arm(t0, Duration::ZERO);
        timer.cancel();
        assert!(!timer.poll(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn test_throttle() {
        let t0 = Instant::now();
        let mut throttle = Throttle::new(Duration::from_millis(100));
        assert!(throttle.try_fire(t0));
        assert!(!throttle.try_fire(t0 + Duration::from_millis(50)));
        assert!(throttle.try_fire(t0 + Duration::from_millis(100)));
    }
}

//! Zoom/pan state and the hover-driven viewport refresh loop.
//!
//! The controller runs `Idle -> Hovering -> (Dragging | Zooming) -> Idle`.
//! While the pointer is over the image, each [`ViewportController::tick`]
//! may emit a low-latency lens request for the rectangle under the
//! (latency-compensated) cursor. A quiet period after the last
//! interaction emits one settled request.

use std::time::Instant;

use nalgebra::Vector2;

use crate::config::{KalmanConfig, ViewportConfig};
use crate::kalman::CursorPredictor;
use crate::schedule::{Throttle, Timer};
use cubeview_core::util::{f64_to_i64_saturating, usize_to_f64};

/// Axis-aligned rectangle, in source pixels or screen pixels depending on
/// context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn centre(&self) -> Vector2<f64> {
        Vector2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    #[must_use]
    pub fn contains(&self, p: Vector2<f64>) -> bool {
        p.x >= self.x && p.x < self.x + self.width && p.y >= self.y && p.y < self.y + self.height
    }
}

/// Map a screen point into source pixels.
///
/// `view` is the source rectangle drawn into the screen rectangle `anchor`:
/// `src = view.origin + (screen - anchor.origin) / anchor.size * (view.size - 1)`.
#[must_use]
pub fn screen_to_source(screen: Vector2<f64>, anchor: &Rect, view: &Rect) -> Vector2<f64> {
    let axis = |s: f64, a0: f64, a: f64, v0: f64, v: f64| {
        if a > 0.0 {
            v0 + (s - a0) / a * (v - 1.0).max(0.0)
        } else {
            v0
        }
    };
    Vector2::new(
        axis(screen.x, anchor.x, anchor.width, view.x, view.width),
        axis(screen.y, anchor.y, anchor.height, view.y, view.height),
    )
}

/// Inverse of [`screen_to_source`].
#[must_use]
pub fn source_to_screen(source: Vector2<f64>, anchor: &Rect, view: &Rect) -> Vector2<f64> {
    let axis = |s: f64, a0: f64, a: f64, v0: f64, v: f64| {
        let span = v - 1.0;
        if span > 0.0 {
            a0 + (s - v0) / span * a
        } else {
            a0
        }
    };
    Vector2::new(
        axis(source.x, anchor.x, anchor.width, view.x, view.width),
        axis(source.y, anchor.y, anchor.height, view.y, view.height),
    )
}

/// Integer pixel bounds `(x1, y1, x2, y2)`, inclusive.
pub type PixelBounds = (i64, i64, i64, i64);

/// Crop/zoom rectangle of one view slot.
///
/// The rectangle always lies inside `[0, canvas_width) x [0, canvas_height)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    canvas_width: f64,
    canvas_height: f64,
    rect: Rect,
    base_width: f64,
    base_height: f64,
    min_size: f64,
    scale: f64,
    last_requested: Option<PixelBounds>,
}

impl ViewState {
    /// Rectangle of `base_size` source pixels centred on the canvas.
    #[must_use]
    pub fn new(canvas_width: usize, canvas_height: usize, base_size: usize, min_size: usize) -> Self {
        let cw = usize_to_f64(canvas_width.max(1));
        let ch = usize_to_f64(canvas_height.max(1));
        let base_width = usize_to_f64(base_size.max(1)).min(cw);
        let base_height = usize_to_f64(base_size.max(1)).min(ch);
        let mut state = Self {
            canvas_width: cw,
            canvas_height: ch,
            rect: Rect::new(0.0, 0.0, base_width, base_height),
            base_width,
            base_height,
            min_size: usize_to_f64(min_size.max(1)),
            scale: 1.0,
            last_requested: None,
        };
        state.centre_on(Vector2::new(cw / 2.0, ch / 2.0));
        state
    }

    #[must_use]
    pub fn rect(&self) -> Rect {
        self.rect
    }

    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[must_use]
    pub fn canvas(&self) -> Rect {
        Rect::new(0.0, 0.0, self.canvas_width, self.canvas_height)
    }

    /// Move the rectangle so its centre is at `focus` (clamped).
    pub fn centre_on(&mut self, focus: Vector2<f64>) {
        if !(focus.x.is_finite() && focus.y.is_finite()) {
            return;
        }
        self.rect.x = focus.x - self.rect.width / 2.0;
        self.rect.y = focus.y - self.rect.height / 2.0;
        self.clamp();
    }

    /// Set the zoom factor `k`: the rectangle becomes `base / k`, recentred
    /// on `focus`.
    pub fn zoom(&mut self, k: f64, focus: Vector2<f64>) {
        if !(k.is_finite() && k > 0.0) {
            return;
        }
        let min_w = self.min_size.min(self.canvas_width);
        let min_h = self.min_size.min(self.canvas_height);
        self.rect.width = (self.base_width / k).clamp(min_w, self.canvas_width);
        self.rect.height = (self.base_height / k).clamp(min_h, self.canvas_height);
        self.scale = self.base_width / self.rect.width;
        let focus = if focus.x.is_finite() && focus.y.is_finite() {
            focus
        } else {
            self.rect.centre()
        };
        self.centre_on(focus);
    }

    /// Pan by a screen-space pointer delta, scaled by how many source
    /// pixels one screen pixel covers in `anchor`. Dragging right moves the
    /// view left, as when dragging the picture itself.
    pub fn pan(&mut self, dx: f64, dy: f64, anchor: &Rect) {
        let sx = if anchor.width > 0.0 {
            self.rect.width / anchor.width
        } else {
            0.0
        };
        let sy = if anchor.height > 0.0 {
            self.rect.height / anchor.height
        } else {
            0.0
        };
        let x = self.rect.x - dx * sx;
        let y = self.rect.y - dy * sy;
        if x.is_nan() || y.is_nan() {
            return;
        }
        self.rect.x = x;
        self.rect.y = y;
        self.clamp();
    }

    fn clamp(&mut self) {
        self.rect.width = self.rect.width.min(self.canvas_width);
        self.rect.height = self.rect.height.min(self.canvas_height);
        self.rect.x = self.rect.x.clamp(0.0, self.canvas_width - self.rect.width);
        self.rect.y = self.rect.y.clamp(0.0, self.canvas_height - self.rect.height);
    }

    /// Inclusive integer bounds of the rectangle.
    #[must_use]
    pub fn bounds(&self) -> PixelBounds {
        let max_x = f64_to_i64_saturating(self.canvas_width) - 1;
        let max_y = f64_to_i64_saturating(self.canvas_height) - 1;
        let x1 = f64_to_i64_saturating(self.rect.x.floor()).clamp(0, max_x);
        let y1 = f64_to_i64_saturating(self.rect.y.floor()).clamp(0, max_y);
        let x2 = (f64_to_i64_saturating((self.rect.x + self.rect.width).ceil()) - 1).clamp(x1, max_x);
        let y2 = (f64_to_i64_saturating((self.rect.y + self.rect.height).ceil()) - 1).clamp(y1, max_y);
        (x1, y1, x2, y2)
    }

    /// Whether the rectangle differs from the last requested one.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.last_requested != Some(self.bounds())
    }

    /// Record the current rectangle as requested and return its bounds.
    pub fn mark_requested(&mut self) -> PixelBounds {
        let bounds = self.bounds();
        self.last_requested = Some(bounds);
        bounds
    }
}

/// Interaction state of one view slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    Hovering,
    Dragging,
    Zooming,
}

/// Request intent produced by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportAction {
    /// Fast lens refresh (spectrum + small viewport image) for a region.
    Lens(PixelBounds),
    /// Settled refresh once interaction has stopped.
    Settle {
        bounds: PixelBounds,
        /// Pointer left the image: spectrum over the whole image.
        whole_image: bool,
    },
}

/// Per-slot viewport state machine.
#[derive(Debug, Clone)]
pub struct ViewportController {
    state: InteractionState,
    view: ViewState,
    /// Source rectangle currently drawn into `anchor`.
    display: Rect,
    /// Screen rectangle the image is drawn into.
    anchor: Rect,
    predictor: CursorPredictor,
    pointer: Option<Vector2<f64>>,
    lens_throttle: Throttle,
    idle_timer: Timer,
    idle_timeout: std::time::Duration,
    force: bool,
    /// The lens tracks the cursor; cleared by a pan or zoom until the
    /// pointer moves again.
    follow: bool,
}

impl ViewportController {
    #[must_use]
    pub fn new(
        canvas_width: usize,
        canvas_height: usize,
        viewport: &ViewportConfig,
        kalman: &KalmanConfig,
    ) -> Self {
        let view = ViewState::new(
            canvas_width,
            canvas_height,
            viewport.lens_size,
            viewport.min_zoom_size,
        );
        let display = view.canvas();
        Self {
            state: InteractionState::Idle,
            view,
            display,
            anchor: display,
            predictor: CursorPredictor::new(kalman),
            pointer: None,
            lens_throttle: Throttle::new(viewport.refresh_interval()),
            idle_timer: Timer::new(),
            idle_timeout: viewport.idle_timeout(),
            force: false,
            follow: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> InteractionState {
        self.state
    }

    #[must_use]
    pub fn view(&self) -> &ViewState {
        &self.view
    }

    #[must_use]
    pub fn predictor(&self) -> &CursorPredictor {
        &self.predictor
    }

    /// Screen rectangle the image is drawn into.
    pub fn set_anchor(&mut self, anchor: Rect) {
        self.anchor = anchor;
    }

    /// Source rectangle drawn into the anchor (normally the bounding box of
    /// the opaque pixels).
    pub fn set_display(&mut self, display: Rect) {
        self.display = display;
    }

    #[must_use]
    pub fn anchor(&self) -> Rect {
        self.anchor
    }

    /// Source pixel under a screen point.
    #[must_use]
    pub fn source_at(&self, screen: Vector2<f64>) -> Vector2<f64> {
        screen_to_source(screen, &self.anchor, &self.display)
    }

    pub fn pointer_enter(&mut self, screen: Vector2<f64>, now: Instant) {
        log::debug!("pointer enter at {screen:?}");
        self.state = InteractionState::Hovering;
        self.predictor.reset(screen, now);
        self.pointer = Some(screen);
        self.follow = true;
        self.idle_timer.cancel();
        self.lens_throttle.reset();
    }

    pub fn pointer_move(&mut self, screen: Vector2<f64>, now: Instant) {
        match self.state {
            InteractionState::Idle => {
                self.pointer_enter(screen, now);
                return;
            }
            InteractionState::Dragging => {
                if let Some(prev) = self.pointer {
                    let delta = screen - prev;
                    self.view.pan(delta.x, delta.y, &self.anchor);
                }
            }
            InteractionState::Hovering => self.follow = true,
            InteractionState::Zooming => {}
        }
        self.predictor.observe(screen, now);
        self.pointer = Some(screen);
        self.idle_timer.arm(now, self.idle_timeout);
    }

    pub fn pointer_down(&mut self, screen: Vector2<f64>, now: Instant) {
        if self.state == InteractionState::Idle {
            self.pointer_enter(screen, now);
        }
        self.state = InteractionState::Dragging;
        self.pointer = Some(screen);
        self.follow = false;
        self.idle_timer.cancel();
    }

    pub fn pointer_up(&mut self, now: Instant) {
        if self.state == InteractionState::Dragging {
            self.state = InteractionState::Hovering;
            self.force = true;
            self.idle_timer.arm(now, self.idle_timeout);
        }
    }

    /// Pinch/scroll zoom to factor `k` around the cursor.
    pub fn zoom(&mut self, k: f64) {
        if self.state == InteractionState::Idle {
            return;
        }
        self.state = InteractionState::Zooming;
        let focus = self
            .pointer
            .map_or_else(|| self.view.rect().centre(), |p| self.source_at(p));
        self.view.zoom(k, focus);
        self.follow = false;
        self.idle_timer.cancel();
    }

    pub fn zoom_end(&mut self, now: Instant) {
        if self.state == InteractionState::Zooming {
            self.state = InteractionState::Hovering;
            self.force = true;
            self.idle_timer.arm(now, self.idle_timeout);
        }
    }

    pub fn pointer_leave(&mut self, now: Instant) {
        log::debug!("pointer leave");
        self.state = InteractionState::Idle;
        self.pointer = None;
        self.force = false;
        self.idle_timer.arm(now, self.idle_timeout);
    }

    /// Advance the controller.
    ///
    /// `latency_ms` is the current round-trip estimate used to extrapolate
    /// the cursor; `streaming` suppresses the settled refresh while a video
    /// stream owns the slot.
    pub fn tick(&mut self, now: Instant, latency_ms: f64, streaming: bool) -> Vec<ViewportAction> {
        let mut actions = Vec::new();

        if self.state == InteractionState::Hovering && self.follow {
            if let Some(predicted) = self.predictor.predict(latency_ms) {
                let focus = self.source_at(predicted);
                self.view.centre_on(focus);
            }
        }

        if self.state != InteractionState::Idle {
            let due = self.force || (self.view.changed() && self.lens_throttle.ready(now));
            if due {
                self.lens_throttle.mark(now);
                self.force = false;
                actions.push(ViewportAction::Lens(self.view.mark_requested()));
            }
        }

        if self.idle_timer.poll(now) {
            let busy = matches!(
                self.state,
                InteractionState::Dragging | InteractionState::Zooming
            );
            if busy || streaming {
                log::debug!("idle refresh suppressed (state {:?}, streaming {streaming})", self.state);
            } else if self.state == InteractionState::Idle {
                actions.push(ViewportAction::Settle {
                    bounds: self.whole_image_bounds(),
                    whole_image: true,
                });
            } else {
                actions.push(ViewportAction::Settle {
                    bounds: self.view.bounds(),
                    whole_image: false,
                });
            }
        }

        actions
    }

    fn whole_image_bounds(&self) -> PixelBounds {
        let c = self.view.canvas();
        (
            0,
            0,
            f64_to_i64_saturating(c.width) - 1,
            f64_to_i64_saturating(c.height) - 1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn controller() -> ViewportController {
        ViewportController::new(
            800,
            600,
            &ViewportConfig::default(),
            &KalmanConfig::default(),
        )
    }

    #[test]
    fn test_transform_round_trip() {
        let anchor = Rect::new(100.0, 50.0, 400.0, 300.0);
        let view = Rect::new(0.0, 0.0, 800.0, 600.0);
        let src = screen_to_source(Vector2::new(300.0, 200.0), &anchor, &view);
        assert!((src.x - 399.5).abs() < 1e-9);
        assert!((src.y - 299.5).abs() < 1e-9);
        let back = source_to_screen(src, &anchor, &view);
        assert!((back.x - 300.0).abs() < 1e-9 && (back.y - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_transform_single_pixel_view() {
        let anchor = Rect::new(0.0, 0.0, 10.0, 10.0);
        let view = Rect::new(5.0, 7.0, 1.0, 1.0);
        let src = screen_to_source(Vector2::new(9.0, 9.0), &anchor, &view);
        assert_eq!(src, Vector2::new(5.0, 7.0));
        assert_eq!(source_to_screen(src, &anchor, &view), Vector2::new(0.0, 0.0));
    }

    #[test]
    fn test_zoom_clamps_to_canvas() {
        let mut v = ViewState::new(100, 50, 64, 8);
        v.zoom(0.001, Vector2::new(0.0, 0.0));
        let r = v.rect();
        assert!((r.width - 100.0).abs() < 1e-9 && (r.height - 50.0).abs() < 1e-9);
        v.zoom(1e9, Vector2::new(99.0, 49.0));
        let r = v.rect();
        assert!((r.width - 8.0).abs() < 1e-9);
        assert!(r.x + r.width <= 100.0 && r.y + r.height <= 50.0);
    }

    #[test]
    fn test_unchanged_rect_is_not_requested() {
        let t0 = Instant::now();
        let mut c = controller();
        c.pointer_enter(Vector2::new(400.0, 300.0), t0);
        let first = c.tick(t0, 0.0, false);
        assert_eq!(first.len(), 1);
        // same position, throttle satisfied: nothing new
        let again = c.tick(t0 + Duration::from_millis(100), 0.0, false);
        assert!(again.is_empty());
    }

    #[test]
    fn test_drag_end_forces_request() {
        let t0 = Instant::now();
        let mut c = controller();
        c.pointer_enter(Vector2::new(400.0, 300.0), t0);
        let _ = c.tick(t0, 0.0, false);
        c.pointer_down(Vector2::new(400.0, 300.0), t0);
        c.pointer_up(t0 + Duration::from_millis(1));
        let actions = c.tick(t0 + Duration::from_millis(2), 0.0, false);
        assert!(matches!(actions.as_slice(), [ViewportAction::Lens(_)]));
    }

    #[test]
    fn test_drag_end_requests_panned_rect() {
        let t0 = Instant::now();
        let mut c = controller();
        c.pointer_enter(Vector2::new(400.0, 300.0), t0);
        let _ = c.tick(t0, 0.0, false);
        c.pointer_down(Vector2::new(400.0, 300.0), t0);
        c.pointer_move(Vector2::new(300.0, 300.0), t0 + Duration::from_millis(5));
        let panned = c.view().rect();
        let bounds = c.view().bounds();
        c.pointer_up(t0 + Duration::from_millis(6));

        let actions = c.tick(t0 + Duration::from_millis(7), 0.0, false);
        assert_eq!(actions, vec![ViewportAction::Lens(bounds)]);
        assert_eq!(c.view().rect(), panned);
        // a still cursor keeps the panned rectangle
        assert!(c.tick(t0 + Duration::from_millis(100), 0.0, false).is_empty());
        assert_eq!(c.view().rect(), panned);

        // moving again resumes following the cursor
        c.pointer_move(Vector2::new(100.0, 100.0), t0 + Duration::from_millis(120));
        let actions = c.tick(t0 + Duration::from_millis(121), 0.0, false);
        assert_eq!(actions.len(), 1);
        assert_ne!(c.view().rect(), panned);
    }

    #[test]
    fn test_zoom_end_requests_zoomed_rect() {
        let t0 = Instant::now();
        let mut c = controller();
        c.pointer_enter(Vector2::new(200.0, 150.0), t0);
        let _ = c.tick(t0, 0.0, false);
        c.zoom(4.0);
        let zoomed = c.view().bounds();
        c.zoom_end(t0 + Duration::from_millis(1));
        let actions = c.tick(t0 + Duration::from_millis(2), 0.0, false);
        assert_eq!(actions, vec![ViewportAction::Lens(zoomed)]);
    }

    #[test]
    fn test_pan_stays_inside_canvas() {
        let anchor = Rect::new(0.0, 0.0, 400.0, 300.0);
        let deltas = [
            0.5,
            -3.0,
            250.0,
            -1.0e6,
            1.0e12,
            -1.0e300,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NAN,
            f64::MAX,
        ];
        for zoom in [0.5, 1.0, 3.0, 50.0] {
            let mut v = ViewState::new(800, 600, 64, 8);
            v.zoom(zoom, Vector2::new(400.0, 300.0));
            for (i, &dx) in deltas.iter().enumerate() {
                // alternate direction and mix the axes
                let dy = deltas[(i * 7 + 3) % deltas.len()];
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                v.pan(sign * dx, -sign * dy, &anchor);
                let r = v.rect();
                assert!(r.x.is_finite() && r.y.is_finite(), "zoom {zoom} step {i}: {r:?}");
                assert!(r.x >= 0.0 && r.y >= 0.0, "zoom {zoom} step {i}: {r:?}");
                assert!(r.x + r.width <= 800.0, "zoom {zoom} step {i}: {r:?}");
                assert!(r.y + r.height <= 600.0, "zoom {zoom} step {i}: {r:?}");
                let (x1, y1, x2, y2) = v.bounds();
                assert!(x1 >= 0 && y1 >= 0 && x2 <= 799 && y2 <= 599);
            }
        }
    }

    #[test]
    fn test_leave_settles_whole_image() {
        let t0 = Instant::now();
        let mut c = controller();
        c.pointer_enter(Vector2::new(10.0, 10.0), t0);
        c.pointer_leave(t0);
        assert!(c.tick(t0 + Duration::from_millis(100), 0.0, false).is_empty());
        let actions = c.tick(t0 + Duration::from_millis(250), 0.0, false);
        assert_eq!(
            actions,
            vec![ViewportAction::Settle {
                bounds: (0, 0, 799, 599),
                whole_image: true
            }]
        );
    }

    #[test]
    fn test_streaming_suppresses_settle() {
        let t0 = Instant::now();
        let mut c = controller();
        c.pointer_enter(Vector2::new(10.0, 10.0), t0);
        c.pointer_leave(t0);
        assert!(c.tick(t0 + Duration::from_millis(300), 0.0, true).is_empty());
    }
}

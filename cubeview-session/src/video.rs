//! Spectral video streaming with adaptive frame rate and bitrate.
//!
//! Frame rate follows an additive-increase/multiplicative-decrease style
//! rule: when the network or decode latency of a frame exceeds the budget
//! for the current rate, the rate drops by `fps_decrease`; otherwise it
//! grows by `fps_increase`, always within `[min_fps, max_fps]`. The
//! measured throughput is smoothed with an exponential moving average and
//! a fraction of it is requested as the encoder bitrate.

use std::time::{Duration, Instant};

use cubeview_core::util::{f64_to_u32_saturating, usize_to_f64};
use cubeview_core::{FrameSurface, SequenceCounter, StaleFilter};
use cubeview_protocol::{
    CodecError, CodecFactory, CodecId, CodecSession, FrameMessage, Request, VideoRequest, VideoView,
};

use crate::config::VideoConfig;
use crate::schedule::Timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Stopped,
    Streaming,
}

/// Geometry and transparency of the running stream.
#[derive(Debug, Clone)]
struct StreamGeometry {
    width: usize,
    height: usize,
    alpha: Vec<u8>,
}

/// Video stream control for one view slot.
pub struct VideoStreamController<S: CodecSession> {
    config: VideoConfig,
    state: StreamState,
    view: VideoView,
    fps: f64,
    bitrate_kbps: f64,
    frame: f64,
    ref_freq: f64,
    last_sent: Option<Instant>,
    key_timer: Timer,
    decoder: Option<S>,
    geometry: Option<StreamGeometry>,
    seq: SequenceCounter,
    stale: StaleFilter,
}

impl<S: CodecSession> VideoStreamController<S> {
    #[must_use]
    pub fn new(config: &VideoConfig) -> Self {
        Self {
            config: config.clone(),
            state: StreamState::Stopped,
            view: VideoView::Tile,
            fps: config.initial_fps,
            bitrate_kbps: config.initial_bitrate_kbps,
            frame: 0.0,
            ref_freq: 0.0,
            last_sent: None,
            key_timer: Timer::new(),
            decoder: None,
            geometry: None,
            seq: SequenceCounter::new(),
            stale: StaleFilter::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> StreamState {
        self.state
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.state == StreamState::Streaming
    }

    /// Current frame rate estimate.
    #[must_use]
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Smoothed measured throughput in kbit/s.
    #[must_use]
    pub fn bitrate_kbps(&self) -> f64 {
        self.bitrate_kbps
    }

    /// Bitrate requested from the encoder.
    #[must_use]
    pub fn target_bitrate_kbps(&self) -> f64 {
        (self.config.target_bitrate_factor * self.bitrate_kbps)
            .clamp(self.config.min_bitrate_kbps, self.config.max_bitrate_kbps)
    }

    /// Minimum spacing between frame requests at the current rate.
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }

    /// Begin streaming at spectral position `frame`.
    ///
    /// Returns the `[init_video]` request, or `None` when already streaming.
    pub fn start(
        &mut self,
        frame: f64,
        view: VideoView,
        ref_freq: f64,
        timestamp_ms: f64,
        now: Instant,
    ) -> Option<Request> {
        if self.is_streaming() {
            return None;
        }
        log::info!("starting {} video stream at {frame}", view.as_str());
        self.state = StreamState::Streaming;
        self.view = view;
        self.frame = frame;
        self.ref_freq = ref_freq;
        self.fps = self.config.initial_fps;
        self.stale.reset();
        self.last_sent = Some(now);
        Some(Request::InitVideo(self.video_request(false, timestamp_ms)))
    }

    /// Server acknowledged `[init_video]` with the stream geometry; open a
    /// decoder. `alpha` is the decompressed transparency plane.
    ///
    /// # Errors
    /// Returns [`CodecError`] if the decoder cannot be opened or `alpha`
    /// does not match the geometry.
    pub fn on_init<F>(
        &mut self,
        factory: &mut F,
        width: u32,
        height: u32,
        alpha: Vec<u8>,
    ) -> Result<(), CodecError>
    where
        F: CodecFactory<Session = S>,
    {
        if !self.is_streaming() {
            log::debug!("init_video reply after stop, ignoring");
            return Ok(());
        }
        let (w, h) = (width as usize, height as usize);
        if alpha.len() != w * h {
            return Err(CodecError::AlphaLength {
                expected: w * h,
                actual: alpha.len(),
            });
        }
        self.decoder = Some(factory.open(CodecId::Hevc, width, height)?);
        self.geometry = Some(StreamGeometry {
            width: w,
            height: h,
            alpha,
        });
        Ok(())
    }

    /// The user moved to spectral position `frame`.
    ///
    /// Returns a non-key `[video]` request when the frame interval allows;
    /// either way the key-frame timer is re-armed.
    pub fn seek(&mut self, frame: f64, timestamp_ms: f64, now: Instant) -> Option<Request> {
        if !self.reposition(frame, now) {
            return None;
        }
        self.request_frame(timestamp_ms, now)
    }

    /// Move to `frame` and re-arm the key-frame timer without requesting.
    ///
    /// Returns whether the frame interval allows a request at `now`.
    pub fn reposition(&mut self, frame: f64, now: Instant) -> bool {
        if !self.is_streaming() {
            return false;
        }
        self.frame = frame;
        self.key_timer.arm(now, self.config.key_frame_timeout());
        self.last_sent
            .map_or(true, |last| now.saturating_duration_since(last) >= self.frame_interval())
    }

    /// Non-key `[video]` request for the current position, regardless of
    /// the frame interval. Used to keep composite channels in step.
    pub fn request_frame(&mut self, timestamp_ms: f64, now: Instant) -> Option<Request> {
        if !self.is_streaming() {
            return None;
        }
        self.last_sent = Some(now);
        Some(Request::Video(self.video_request(false, timestamp_ms)))
    }

    /// Emits a key-frame request once the position has been still for the
    /// key-frame timeout.
    pub fn tick(&mut self, timestamp_ms: f64, now: Instant) -> Option<Request> {
        if !self.key_timer.poll(now) || !self.is_streaming() {
            return None;
        }
        self.last_sent = Some(now);
        Some(Request::Video(self.video_request(true, timestamp_ms)))
    }

    /// Stop streaming and release the decoder.
    pub fn stop(&mut self) -> Option<Request> {
        if !self.is_streaming() {
            return None;
        }
        log::info!("stopping video stream");
        self.state = StreamState::Stopped;
        self.decoder = None;
        self.geometry = None;
        self.key_timer.cancel();
        self.last_sent = None;
        Some(Request::EndVideo)
    }

    /// Decode a video frame and adapt the stream parameters.
    ///
    /// `now_ms` is on the same clock as the request timestamps; the
    /// network latency is the round trip minus the server's processing
    /// time. Returns `Ok(None)` for stale frames or frames arriving after
    /// the stream was stopped.
    ///
    /// # Errors
    /// Returns [`CodecError`] when decoding or assembly fails; the frame is
    /// dropped and the stream continues.
    pub fn on_frame(
        &mut self,
        msg: &FrameMessage,
        now_ms: f64,
    ) -> Result<Option<FrameSurface>, CodecError> {
        if !self.is_streaming() {
            return Ok(None);
        }
        if !self.stale.accept(msg.seq_id) {
            log::debug!("dropping stale video frame {}", msg.seq_id);
            return Ok(None);
        }
        let (Some(decoder), Some(geometry)) = (self.decoder.as_mut(), self.geometry.as_ref()) else {
            log::debug!("video frame before init_video reply, dropping");
            return Ok(None);
        };

        let started = Instant::now();
        let picture = decoder.decode(&msg.frame)?;
        let decode_ms = started.elapsed().as_secs_f64() * 1000.0;
        let surface =
            FrameSurface::assemble(picture, geometry.alpha.clone(), geometry.width, geometry.height)?;

        let network_ms = now_ms - f64::from(msg.ts) - f64::from(msg.elapsed);
        self.adapt(network_ms, decode_ms, msg.frame.len());
        Ok(Some(surface))
    }

    /// Update frame rate and bitrate from one frame's measurements.
    pub fn adapt(&mut self, network_ms: f64, decode_ms: f64, bytes: usize) {
        let worst = network_ms.max(decode_ms);
        let budget = self.config.latency_budget * 1000.0 / self.fps;
        self.fps = if worst > budget {
            (self.fps * self.config.fps_decrease).max(self.config.min_fps)
        } else {
            (self.fps * self.config.fps_increase).min(self.config.max_fps)
        };

        if network_ms.is_finite() && network_ms > 0.0 {
            // bits per ms is kbit/s
            let sample = usize_to_f64(bytes) * 8.0 / network_ms;
            let eta = self.config.bitrate_eta;
            self.bitrate_kbps = (1.0 - eta) * self.bitrate_kbps + eta * sample;
        }
        log::trace!(
            "video: net {network_ms:.1} ms, decode {decode_ms:.1} ms, fps {:.2}, bitrate {:.0} kbps",
            self.fps,
            self.bitrate_kbps
        );
    }

    fn video_request(&mut self, key: bool, timestamp_ms: f64) -> VideoRequest {
        VideoRequest {
            frame: self.frame,
            key,
            view: self.view,
            ref_freq: self.ref_freq,
            fps: f64_to_u32_saturating(self.fps).max(1),
            seq_id: self.seq.next(),
            bitrate: f64_to_u32_saturating(self.target_bitrate_kbps()),
            timestamp: timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cubeview_core::OwnedFrameBuffer;

    struct NullSession;

    impl CodecSession for NullSession {
        fn decode(&mut self, _frame: &[u8]) -> Result<OwnedFrameBuffer, CodecError> {
            Err(CodecError::NoFrame)
        }
    }

    fn controller() -> VideoStreamController<NullSession> {
        VideoStreamController::new(&VideoConfig::default())
    }

    #[test]
    fn test_start_and_stop() {
        let now = Instant::now();
        let mut c = controller();
        assert!(c.stop().is_none());
        let init = c.start(12.0, VideoView::Tile, 0.0, 1.0, now).unwrap();
        assert!(matches!(init, Request::InitVideo(ref r) if !r.key && r.fps == 10 && r.bitrate == 800));
        assert!(c.start(12.0, VideoView::Tile, 0.0, 1.0, now).is_none());
        assert_eq!(c.stop(), Some(Request::EndVideo));
        assert_eq!(c.state(), StreamState::Stopped);
    }

    #[test]
    fn test_fps_stays_in_bounds() {
        let mut c = controller();
        for _ in 0..100 {
            c.adapt(10_000.0, 0.0, 1000);
        }
        assert_relative_eq!(c.fps(), 1.0);
        for _ in 0..100 {
            c.adapt(0.5, 0.5, 1000);
        }
        assert_relative_eq!(c.fps(), 30.0);
    }

    #[test]
    fn test_fps_steps_by_exact_factors() {
        let config = VideoConfig::default();
        let mut c = controller();
        assert_relative_eq!(c.fps(), config.initial_fps);
        for step in 0..200 {
            let budget = config.latency_budget * 1000.0 / c.fps();
            // alternate above and below the budget, with runs of varying length
            let slow = (step / 3 + step) % 2 == 0;
            let latency = if slow { budget * 1.5 } else { budget * 0.5 };
            let before = c.fps();
            c.adapt(latency, 0.0, 1000);
            let expected = if slow {
                (before * config.fps_decrease).max(config.min_fps)
            } else {
                (before * config.fps_increase).min(config.max_fps)
            };
            assert_relative_eq!(c.fps(), expected, max_relative = 1e-12);
            assert!(c.fps() >= config.min_fps && c.fps() <= config.max_fps);
        }
    }

    #[test]
    fn test_request_frame_ignores_interval() {
        let t0 = Instant::now();
        let mut c = controller();
        assert!(c.request_frame(0.0, t0).is_none());
        c.start(0.0, VideoView::Composite, 0.0, 0.0, t0);
        assert!(!c.reposition(4.0, t0 + Duration::from_millis(10)));
        let req = c.request_frame(0.0, t0 + Duration::from_millis(10)).unwrap();
        let Request::Video(r) = &req else {
            panic!("expected a video request, got {req}");
        };
        assert!(!r.key);
        assert_relative_eq!(r.frame, 4.0);
    }

    #[test]
    fn test_decode_time_counts_against_budget() {
        let mut c = controller();
        // budget at 10 fps is 80 ms
        c.adapt(10.0, 90.0, 100);
        assert_relative_eq!(c.fps(), 8.0);
    }

    #[test]
    fn test_bitrate_moving_average() {
        let mut c = controller();
        // 2500 bytes in 10 ms = 2000 kbit/s
        c.adapt(10.0, 0.0, 2500);
        assert_relative_eq!(c.bitrate_kbps(), 0.9 * 1000.0 + 0.1 * 2000.0);
        assert_relative_eq!(c.target_bitrate_kbps(), 0.8 * 1100.0);
    }

    #[test]
    fn test_seek_respects_frame_interval_then_key_frame() {
        let t0 = Instant::now();
        let mut c = controller();
        c.start(0.0, VideoView::Tile, 0.0, 0.0, t0);
        // 10 fps: 100 ms between frames
        assert!(c.seek(1.0, 0.0, t0 + Duration::from_millis(50)).is_none());
        let req = c.seek(2.0, 0.0, t0 + Duration::from_millis(100)).unwrap();
        assert!(matches!(req, Request::Video(ref r) if !r.key && (r.frame - 2.0).abs() < f64::EPSILON));
        assert!(c.tick(0.0, t0 + Duration::from_millis(200)).is_none());
        let key = c.tick(0.0, t0 + Duration::from_millis(350)).unwrap();
        assert!(matches!(key, Request::Video(ref r) if r.key));
    }

    #[test]
    fn test_frames_after_stop_are_dropped() {
        let mut c = controller();
        let msg = FrameMessage {
            ts: 0.0,
            seq_id: 1,
            msg_type: 5,
            elapsed: 0.0,
            frame: vec![1, 2, 3],
        };
        assert!(c.on_frame(&msg, 10.0).unwrap().is_none());
    }
}

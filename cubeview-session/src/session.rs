//! The viewer session.
//!
//! [`Session`] owns every per-slot component (dataset model, viewport
//! controller, video stream, current surfaces) and is the single place
//! where server messages are dispatched and requests are sent. All entry
//! points take the current time so that the whole session can be driven
//! deterministically.

use std::ops::Range;
use std::sync::mpsc::Sender;
use std::time::Instant;

use nalgebra::Vector2;

use cubeview_core::{
    Beam, Dataset, FrameSurface, IntensityMode, PixelHistogram, PixelStats, SequenceCounter,
    SpectralBand, StaleFilter,
};
use cubeview_protocol::{
    decode_last, AlphaDecompressor, CodecFactory, CodecId, CodecSession, DatasetHeader, FrameMessage,
    HistogramMessage, ImageRequest, JsonMessage, Lz4Alpha, MessageType, Request, Response,
    SpectrumRequest, TextMessage, VideoView,
};

use crate::composite::CompositeLayer;
use crate::config::ViewerConfig;
use crate::contour::{contour_levels, contour_lines, ContourLine};
use crate::error::{Error, Result};
use crate::layout::{bounding_box_rect, tile_anchors};
use crate::message::DisplayUpdate;
use crate::schedule::Throttle;
use crate::transport::Transport;
use crate::video::VideoStreamController;
use crate::viewport::{Rect, ViewportAction, ViewportController};
use crate::widgets::{FluxEditor, FluxUpdate, ReferenceInput};

/// How the slots are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Single,
    /// Side by side, one tile per dataset.
    Tiled,
    /// Up to three datasets blended into one RGB image.
    Composite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Expired,
}

/// Number of binary message categories, one stale filter each.
const CATEGORIES: usize = 7;

/// State of one dataset view.
struct Slot<S: CodecSession> {
    id: String,
    dataset: Option<Dataset>,
    viewport: Option<ViewportController>,
    editor: Option<FluxEditor>,
    reference: Option<ReferenceInput>,
    video: VideoStreamController<S>,
    image: Option<FrameSurface>,
    lens: Option<FrameSurface>,
    /// Shared by `[spectrum]` requests, whose replies are a spectrum and
    /// optionally a viewport.
    request_seq: SequenceCounter,
    image_seq: SequenceCounter,
    filters: [StaleFilter; CATEGORIES],
}

/// Interactive session over one or more datasets.
pub struct Session<T: Transport, F: CodecFactory> {
    config: ViewerConfig,
    transport: T,
    codecs: F,
    updates: Sender<DisplayUpdate>,
    slots: Vec<Slot<F::Session>>,
    mode: ViewMode,
    composite: Option<CompositeLayer>,
    /// Composite mode: one id per round of image or video requests, shared
    /// by every channel.
    round_seq: SequenceCounter,
    invert: bool,
    epoch: Instant,
    latency: Option<f64>,
    heartbeat: Throttle,
    connection: ConnectionState,
}

impl<T: Transport, F: CodecFactory> Session<T, F> {
    /// Create a session for `dataset_ids`, one slot each.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for an invalid configuration, no datasets,
    /// or more than three datasets in composite mode.
    pub fn new(
        config: ViewerConfig,
        dataset_ids: Vec<String>,
        mode: ViewMode,
        transport: T,
        codecs: F,
        updates: Sender<DisplayUpdate>,
        now: Instant,
    ) -> Result<Self> {
        config.validate()?;
        if dataset_ids.is_empty() {
            return Err(Error::Config("at least one dataset is required".into()));
        }
        let composite = if mode == ViewMode::Composite {
            Some(CompositeLayer::new(dataset_ids.len())?)
        } else {
            None
        };
        let slots: Vec<_> = dataset_ids
            .into_iter()
            .map(|id| Slot {
                id,
                dataset: None,
                viewport: None,
                editor: None,
                reference: None,
                video: VideoStreamController::new(&config.video),
                image: None,
                lens: None,
                request_seq: SequenceCounter::new(),
                image_seq: SequenceCounter::new(),
                filters: Default::default(),
            })
            .collect();
        let mut heartbeat = Throttle::new(config.viewport.heartbeat_interval());
        heartbeat.mark(now);
        log::info!("session started with {} slot(s) in {mode:?} mode", slots.len());

        Ok(Self {
            config,
            transport,
            codecs,
            updates,
            slots,
            mode,
            composite,
            round_seq: SequenceCounter::new(),
            invert: false,
            epoch: now,
            latency: None,
            heartbeat,
            connection: ConnectionState::Open,
        })
    }

    #[must_use]
    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    #[must_use]
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Milliseconds since the session started; the request timestamp clock.
    #[must_use]
    pub fn timestamp_ms(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.epoch).as_secs_f64() * 1000.0
    }

    /// Smoothed round-trip latency, zero before the first sample.
    #[must_use]
    pub fn latency_ms(&self) -> f64 {
        self.latency.unwrap_or(0.0)
    }

    pub fn set_invert(&mut self, invert: bool) {
        self.invert = invert;
    }

    #[must_use]
    pub fn invert(&self) -> bool {
        self.invert
    }

    /// Dataset id of a slot.
    ///
    /// # Errors
    /// Returns [`Error::NoSlot`] for an index out of range.
    pub fn dataset_id(&self, slot: usize) -> Result<&str> {
        Ok(&self.slot(slot)?.id)
    }

    #[must_use]
    pub fn dataset(&self, slot: usize) -> Option<&Dataset> {
        self.slots.get(slot)?.dataset.as_ref()
    }

    #[must_use]
    pub fn image(&self, slot: usize) -> Option<&FrameSurface> {
        self.slots.get(slot)?.image.as_ref()
    }

    #[must_use]
    pub fn lens(&self, slot: usize) -> Option<&FrameSurface> {
        self.slots.get(slot)?.lens.as_ref()
    }

    #[must_use]
    pub fn viewport(&self, slot: usize) -> Option<&ViewportController> {
        self.slots.get(slot)?.viewport.as_ref()
    }

    #[must_use]
    pub fn video(&self, slot: usize) -> Option<&VideoStreamController<F::Session>> {
        self.slots.get(slot).map(|s| &s.video)
    }

    #[must_use]
    pub fn editor(&self, slot: usize) -> Option<&FluxEditor> {
        self.slots.get(slot)?.editor.as_ref()
    }

    pub fn editor_mut(&mut self, slot: usize) -> Option<&mut FluxEditor> {
        self.slots.get_mut(slot)?.editor.as_mut()
    }

    fn slot(&self, slot: usize) -> Result<&Slot<F::Session>> {
        self.slots.get(slot).ok_or(Error::NoSlot(slot))
    }

    fn slot_mut(&mut self, slot: usize) -> Result<&mut Slot<F::Session>> {
        self.slots.get_mut(slot).ok_or(Error::NoSlot(slot))
    }

    fn loaded(&self, slot: usize) -> Result<&Dataset> {
        self.slot(slot)?.dataset.as_ref().ok_or(Error::NotLoaded(slot))
    }

    /// Slots a request for `slot` goes to: every channel in composite mode.
    fn targets(&self, slot: usize) -> Result<Range<usize>> {
        self.slot(slot)?;
        Ok(if self.mode == ViewMode::Composite {
            0..self.slots.len()
        } else {
            slot..slot + 1
        })
    }

    fn all_loaded(&self, slots: Range<usize>) -> Result<()> {
        for slot in slots {
            self.loaded(slot)?;
        }
        Ok(())
    }

    fn viewport_mut(&mut self, slot: usize) -> Result<&mut ViewportController> {
        self.slot_mut(slot)?
            .viewport
            .as_mut()
            .ok_or(Error::NotLoaded(slot))
    }

    fn emit(&self, update: DisplayUpdate) {
        if self.updates.send(update).is_err() {
            log::debug!("display receiver dropped");
        }
    }

    /// Send a request unless the session has expired.
    fn send(&mut self, slot: usize, request: &Request) -> Result<()> {
        if self.connection == ConnectionState::Expired {
            log::trace!("session expired, not sending {}", request.kind());
            return Ok(());
        }
        log::debug!("slot {slot}: {request}");
        if let Err(e) = self.transport.send(slot, request) {
            self.expire();
            return Err(e);
        }
        Ok(())
    }

    fn expire(&mut self) {
        if self.connection == ConnectionState::Open {
            log::error!("connection lost, session expired");
            self.connection = ConnectionState::Expired;
            self.emit(DisplayUpdate::SessionExpired);
        }
    }

    /// The transport reported that a connection closed.
    pub fn on_transport_closed(&mut self) {
        self.expire();
    }

    fn observe_latency(&mut self, sample: f64) {
        if !(sample.is_finite() && sample >= 0.0) {
            return;
        }
        let eta = self.config.viewport.latency_eta;
        let latency = self
            .latency
            .map_or(sample, |old| (1.0 - eta) * old + eta * sample);
        self.latency = Some(latency);
        self.emit(DisplayUpdate::Latency(latency));
    }

    // ---- inbound ----

    /// Handle a text frame from the connection of `slot`.
    ///
    /// # Errors
    /// Returns an error for an unknown slot, unparseable text or an invalid
    /// dataset header.
    pub fn on_text(&mut self, slot: usize, text: &str, now: Instant) -> Result<()> {
        self.slot(slot)?;
        match TextMessage::parse(text)? {
            TextMessage::Heartbeat { ts } => {
                let sample = self.timestamp_ms(now) - ts;
                self.observe_latency(sample);
            }
            TextMessage::Json(JsonMessage::Header(header)) => self.load_header(slot, &header)?,
            TextMessage::Json(JsonMessage::Progress {
                message,
                total,
                running,
                ..
            }) => {
                let fraction = if total > 0 {
                    (f64::from(running) / f64::from(total)).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                self.emit(DisplayUpdate::Progress {
                    slot,
                    fraction,
                    message,
                });
            }
            TextMessage::Json(JsonMessage::InitVideo {
                width,
                height,
                alpha,
            }) => self.init_video(slot, width, height, &alpha)?,
            TextMessage::Json(JsonMessage::Spectrum { message }) => {
                self.unavailable(slot, "spectrum", message);
            }
            TextMessage::Json(JsonMessage::Image { message }) => {
                self.unavailable(slot, "image", message);
            }
            TextMessage::Json(JsonMessage::Video { message }) => {
                self.unavailable(slot, "video", message);
            }
        }
        Ok(())
    }

    fn unavailable(&self, slot: usize, kind: &'static str, message: String) {
        log::info!("slot {slot}: {kind} unavailable: {message}");
        self.emit(DisplayUpdate::Unavailable {
            slot,
            kind,
            message,
        });
    }

    fn load_header(&mut self, slot: usize, header: &DatasetHeader) -> Result<()> {
        let dataset = header.to_dataset()?;
        let viewport = &self.config.viewport;
        let kalman = &self.config.kalman;
        let entry = self.slots.get_mut(slot).ok_or(Error::NoSlot(slot))?;
        if dataset.id != entry.id {
            log::warn!("slot {slot}: header for {} on connection for {}", dataset.id, entry.id);
        }
        if !dataset.is_calibrated() {
            log::info!("slot {slot}: {} statistics not ready yet", dataset.id);
        }
        log::info!(
            "slot {slot}: loaded {} ({}x{}x{})",
            dataset.id,
            dataset.width,
            dataset.height,
            dataset.depth
        );
        entry.viewport = Some(ViewportController::new(
            dataset.width,
            dataset.height,
            viewport,
            kalman,
        ));
        entry.editor = Some(FluxEditor::new(&dataset));
        entry.reference = Some(ReferenceInput::new(dataset.calibration.restfrq));
        entry.filters = Default::default();
        entry.image = None;
        entry.lens = None;
        entry.dataset = Some(dataset);
        self.emit(DisplayUpdate::DatasetLoaded { slot });
        Ok(())
    }

    fn init_video(&mut self, slot: usize, width: u32, height: u32, alpha: &[u8]) -> Result<()> {
        let expected = width as usize * height as usize;
        let entry = self.slots.get_mut(slot).ok_or(Error::NoSlot(slot))?;
        let result = Lz4Alpha
            .decompress(alpha, expected)
            .and_then(|alpha| entry.video.on_init(&mut self.codecs, width, height, alpha));
        if let Err(e) = result {
            log::warn!("slot {slot}: cannot start video decoder: {e}");
            if let Some(request) = entry.video.stop() {
                self.send(slot, &request)?;
            }
        }
        Ok(())
    }

    /// Handle a binary frame from the connection of `slot`.
    ///
    /// Responses older than the newest applied one of the same category
    /// are dropped. Decode failures are logged and the frame is dropped.
    ///
    /// # Errors
    /// Returns an error for an unknown slot or a malformed message.
    pub fn on_binary(&mut self, slot: usize, bytes: &[u8], now: Instant) -> Result<()> {
        self.slot(slot)?;
        let response = Response::decode(bytes)?;
        let now_ms = self.timestamp_ms(now);
        if let Some(elapsed) = response.elapsed_ms() {
            self.observe_latency(now_ms - f64::from(response.timestamp()) - f64::from(elapsed));
        }

        if let Response::Video(frame) = &response {
            self.on_video_frame(slot, frame, now_ms);
            return Ok(());
        }

        let kind = response.message_type();
        let seq_id = response.seq_id();
        let filter = &mut self.slot_mut(slot)?.filters[category(kind)];
        if !filter.admit(seq_id).is_accepted() {
            log::debug!("slot {slot}: dropping stale {kind} {seq_id}");
            return Ok(());
        }

        match response {
            Response::Spectrum(m) => self.emit(DisplayUpdate::Spectrum {
                slot,
                spectrum: m.spectrum,
            }),
            Response::Viewport(m) => {
                match self.decode_surface(&m.identifier, m.width, m.height, &m.image, &m.alpha) {
                    Ok(surface) => {
                        self.slot_mut(slot)?.lens = Some(surface.clone());
                        self.emit(DisplayUpdate::Viewport { slot, surface });
                    }
                    Err(e) => log::warn!("slot {slot}: dropping viewport {seq_id}: {e}"),
                }
            }
            Response::Image(m) => {
                let frames = std::slice::from_ref(&m.image);
                match self.decode_surface(&m.identifier, m.width, m.height, frames, &m.alpha) {
                    Ok(surface) => self.show_image(slot, seq_id, surface)?,
                    Err(e) => log::warn!("slot {slot}: dropping image {seq_id}: {e}"),
                }
            }
            Response::FullSpectrumRefresh(m) => {
                let dataset = self.slot_mut(slot)?.dataset.as_mut().ok_or(Error::NotLoaded(slot))?;
                dataset.mean_spectrum = m.mean_spectrum;
                dataset.integrated_spectrum = m.integrated_spectrum;
                self.emit(DisplayUpdate::SpectraRefreshed { slot });
            }
            Response::HistogramRefresh(m) => self.refresh_histogram(slot, &m)?,
            Response::Csv(m) => self.emit(DisplayUpdate::Csv { slot, csv: m.csv }),
            // handled before the stale filter
            Response::Video(_) => {}
        }
        Ok(())
    }

    fn decode_surface(
        &mut self,
        identifier: &str,
        width: u32,
        height: u32,
        frames: &[Vec<u8>],
        alpha: &[u8],
    ) -> Result<FrameSurface> {
        let codec = CodecId::from_identifier(identifier)?;
        let mut decoder = self.codecs.open(codec, width, height)?;
        let picture = decode_last(&mut decoder, frames)?;
        let (w, h) = (width as usize, height as usize);
        let alpha = Lz4Alpha.decompress(alpha, w * h)?;
        Ok(FrameSurface::assemble(picture, alpha, w, h)?)
    }

    fn show_image(&mut self, slot: usize, seq_id: u32, surface: FrameSurface) -> Result<()> {
        let display = display_rect(&surface);
        let entry = self.slot_mut(slot)?;
        if let Some(viewport) = entry.viewport.as_mut() {
            viewport.set_display(display);
        }
        entry.image = Some(surface.clone());

        let invert = self.invert;
        if let Some(layer) = self.composite.as_mut() {
            match layer.submit(slot, seq_id, &surface, invert) {
                Ok(Some(image)) => self.emit(DisplayUpdate::Composite(image)),
                Ok(None) => {}
                Err(e) => log::warn!("slot {slot}: composite channel rejected: {e}"),
            }
        }
        self.emit(DisplayUpdate::Image { slot, surface });
        Ok(())
    }

    fn refresh_histogram(&mut self, slot: usize, m: &HistogramMessage) -> Result<()> {
        let entry = self.slot_mut(slot)?;
        let dataset = entry.dataset.as_mut().ok_or(Error::NotLoaded(slot))?;
        let (pmin, pmax) = (f64::from(m.pmin), f64::from(m.pmax));
        dataset.stats = PixelStats {
            min: pmin,
            max: pmax,
            median: f64::from(m.median),
            black: f64::from(m.black),
            white: f64::from(m.white),
            sensitivity: f64::from(m.sensitivity),
            ratio_sensitivity: f64::from(m.ratio_sensitivity),
        };
        dataset.histogram = PixelHistogram::from_bins(&m.hist, pmin, pmax);
        if dataset.is_calibrated() {
            entry.editor = Some(FluxEditor::new(dataset));
        } else {
            log::debug!("slot {slot}: histogram {} not calibrated, allowing a retry", m.seq_id);
            entry.filters[category(MessageType::HistogramRefresh)].reopen();
        }
        self.emit(DisplayUpdate::HistogramRefreshed { slot });
        Ok(())
    }

    fn on_video_frame(&mut self, slot: usize, frame: &FrameMessage, now_ms: f64) {
        let Some(entry) = self.slots.get_mut(slot) else {
            return;
        };
        let surface = match entry.video.on_frame(frame, now_ms) {
            Ok(Some(surface)) => surface,
            Ok(None) => return,
            Err(e) => {
                log::warn!("slot {slot}: dropping video frame {}: {e}", frame.seq_id);
                return;
            }
        };
        let invert = self.invert;
        if let Some(layer) = self.composite.as_mut() {
            match layer.submit(slot, frame.seq_id, &surface, invert) {
                Ok(Some(image)) => self.emit(DisplayUpdate::Composite(image)),
                Ok(None) => {}
                Err(e) => log::warn!("slot {slot}: composite video channel rejected: {e}"),
            }
        }
        self.emit(DisplayUpdate::VideoFrame { slot, surface });
    }

    // ---- pointer input ----

    /// Screen rectangle the image of `slot` is drawn into.
    ///
    /// # Errors
    /// Returns an error for an unknown or not yet loaded slot.
    pub fn set_anchor(&mut self, slot: usize, anchor: Rect) -> Result<()> {
        self.viewport_mut(slot)?.set_anchor(anchor);
        Ok(())
    }

    /// Anchor rectangles of all views for the current mode.
    #[must_use]
    pub fn anchors(&self, area: &Rect) -> Vec<Rect> {
        let count = match self.mode {
            ViewMode::Tiled => self.slots.len(),
            ViewMode::Single | ViewMode::Composite => 1,
        };
        tile_anchors(count, area, &self.config.viewport)
    }

    /// # Errors
    /// Returns an error for an unknown or not yet loaded slot.
    pub fn pointer_enter(&mut self, slot: usize, screen: Vector2<f64>, now: Instant) -> Result<()> {
        self.viewport_mut(slot)?.pointer_enter(screen, now);
        Ok(())
    }

    /// # Errors
    /// Returns an error for an unknown or not yet loaded slot.
    pub fn pointer_move(&mut self, slot: usize, screen: Vector2<f64>, now: Instant) -> Result<()> {
        self.viewport_mut(slot)?.pointer_move(screen, now);
        Ok(())
    }

    /// # Errors
    /// Returns an error for an unknown or not yet loaded slot.
    pub fn pointer_down(&mut self, slot: usize, screen: Vector2<f64>, now: Instant) -> Result<()> {
        self.viewport_mut(slot)?.pointer_down(screen, now);
        Ok(())
    }

    /// # Errors
    /// Returns an error for an unknown or not yet loaded slot.
    pub fn pointer_up(&mut self, slot: usize, now: Instant) -> Result<()> {
        self.viewport_mut(slot)?.pointer_up(now);
        Ok(())
    }

    /// # Errors
    /// Returns an error for an unknown or not yet loaded slot.
    pub fn pointer_leave(&mut self, slot: usize, now: Instant) -> Result<()> {
        self.viewport_mut(slot)?.pointer_leave(now);
        Ok(())
    }

    /// # Errors
    /// Returns an error for an unknown or not yet loaded slot.
    pub fn zoom(&mut self, slot: usize, k: f64) -> Result<()> {
        self.viewport_mut(slot)?.zoom(k);
        Ok(())
    }

    /// # Errors
    /// Returns an error for an unknown or not yet loaded slot.
    pub fn zoom_end(&mut self, slot: usize, now: Instant) -> Result<()> {
        self.viewport_mut(slot)?.zoom_end(now);
        Ok(())
    }

    // ---- dataset settings ----

    /// Apply a tone-mapping change and request a new image. In composite
    /// mode every channel is refreshed under one round id.
    ///
    /// # Errors
    /// Rejected levels leave the dataset unchanged and send nothing.
    pub fn apply_flux(&mut self, slot: usize, update: FluxUpdate, now: Instant) -> Result<()> {
        self.all_loaded(self.targets(slot)?)?;
        let dataset = self
            .slot_mut(slot)?
            .dataset
            .as_mut()
            .ok_or(Error::NotLoaded(slot))?;
        update.apply(dataset)?;
        self.request_image(slot, false, now)
    }

    /// Select a spectral band (in spectral axis units) and refresh the
    /// image, spectra and histogram. In composite mode every channel is
    /// refreshed under one round id.
    ///
    /// # Errors
    /// Returns an error for an unknown or not yet loaded slot.
    pub fn set_band(&mut self, slot: usize, start: f64, end: f64, now: Instant) -> Result<()> {
        self.all_loaded(self.targets(slot)?)?;
        let dataset = self
            .slot_mut(slot)?
            .dataset
            .as_mut()
            .ok_or(Error::NotLoaded(slot))?;
        dataset.band = Some(SpectralBand {
            start: start.min(end),
            end: start.max(end),
        });
        self.request_image(slot, true, now)
    }

    /// Apply typed velocity or redshift input.
    ///
    /// # Errors
    /// Invalid input is returned and the reference frequency is kept.
    pub fn set_reference(&mut self, slot: usize, text: &str) -> Result<()> {
        let entry = self.slot_mut(slot)?;
        let reference = entry.reference.as_mut().ok_or(Error::NotLoaded(slot))?;
        let freq = reference.submit(text)?;
        if let Some(dataset) = entry.dataset.as_mut() {
            dataset.ref_freq = freq;
        }
        Ok(())
    }

    /// Reference-axis widget of a slot.
    pub fn reference_mut(&mut self, slot: usize) -> Option<&mut ReferenceInput> {
        self.slots.get_mut(slot)?.reference.as_mut()
    }

    /// # Errors
    /// Returns an error for an unknown or not yet loaded slot.
    pub fn set_intensity(&mut self, slot: usize, intensity: IntensityMode) -> Result<()> {
        let dataset = self.slot_mut(slot)?.dataset.as_mut().ok_or(Error::NotLoaded(slot))?;
        dataset.intensity = intensity;
        Ok(())
    }

    /// # Errors
    /// Returns an error for an unknown or not yet loaded slot.
    pub fn set_beam(&mut self, slot: usize, beam: Beam) -> Result<()> {
        let dataset = self.slot_mut(slot)?.dataset.as_mut().ok_or(Error::NotLoaded(slot))?;
        dataset.beam = beam;
        Ok(())
    }

    fn request_image(&mut self, slot: usize, hist: bool, now: Instant) -> Result<()> {
        let timestamp = self.timestamp_ms(now);
        let targets = self.targets(slot)?;
        self.all_loaded(targets.clone())?;
        let seq_id = if self.mode == ViewMode::Composite {
            self.round_seq.next()
        } else {
            self.slot_mut(slot)?.image_seq.next()
        };
        for target in targets {
            // only the edited channel needs a new histogram
            let request = self.image_request(target, hist && target == slot, seq_id, timestamp)?;
            self.send(target, &request)?;
        }
        Ok(())
    }

    fn image_request(
        &self,
        slot: usize,
        hist: bool,
        seq_id: u32,
        timestamp: f64,
    ) -> Result<Request> {
        let dataset = self.loaded(slot)?;
        let band = dataset.band();
        Ok(Request::Image(ImageRequest {
            black: dataset.stats.black,
            white: dataset.stats.white,
            median: dataset.stats.median,
            noise: dataset.noise,
            flux: dataset.curve,
            frame_start: band.start,
            frame_end: band.end,
            ref_freq: dataset.ref_freq,
            hist,
            timestamp,
            seq_id,
        }))
    }

    /// Iso-luma contours of the current image.
    ///
    /// # Errors
    /// Returns [`Error::NotLoaded`] when no image has arrived yet.
    pub fn contours(&self, slot: usize) -> Result<Vec<ContourLine>> {
        let surface = self.slot(slot)?.image.as_ref().ok_or(Error::NotLoaded(slot))?;
        let levels = contour_levels(0.0, 255.0, self.config.contour.levels);
        Ok(contour_lines(surface, &levels))
    }

    // ---- video ----

    /// Start streaming frames of `slot` from spectral position `frame`.
    /// In composite mode every channel streams, one round id per request.
    ///
    /// # Errors
    /// Returns an error for an unknown or not yet loaded slot, or when the
    /// request cannot be sent.
    pub fn start_video(&mut self, slot: usize, frame: f64, now: Instant) -> Result<()> {
        let timestamp = self.timestamp_ms(now);
        let targets = self.targets(slot)?;
        self.all_loaded(targets.clone())?;
        let view = if self.mode == ViewMode::Composite {
            VideoView::Composite
        } else {
            VideoView::Tile
        };
        let mut requests = Vec::with_capacity(targets.len());
        for target in targets {
            let ref_freq = self.loaded(target)?.ref_freq;
            let entry = &mut self.slots[target];
            if let Some(request) = entry.video.start(frame, view, ref_freq, timestamp, now) {
                requests.push((target, request));
            }
        }
        self.send_video(requests)
    }

    /// Move the stream to spectral position `frame`.
    ///
    /// In composite mode the interval of `slot` decides for all channels,
    /// so every channel is asked for the same round.
    ///
    /// # Errors
    /// Returns an error for an unknown slot or when the request cannot be
    /// sent.
    pub fn seek_video(&mut self, slot: usize, frame: f64, now: Instant) -> Result<()> {
        let timestamp = self.timestamp_ms(now);
        let targets = self.targets(slot)?;
        if targets.len() == 1 {
            let request = self.slots[slot].video.seek(frame, timestamp, now);
            return self.send_video(request.map(|r| (slot, r)).into_iter().collect());
        }
        let mut due = false;
        for target in targets.clone() {
            let ready = self.slots[target].video.reposition(frame, now);
            if target == slot {
                due = ready;
            }
        }
        if !due {
            return Ok(());
        }
        let requests = targets
            .filter_map(|target| {
                let request = self.slots[target].video.request_frame(timestamp, now)?;
                Some((target, request))
            })
            .collect();
        self.send_video(requests)
    }

    /// Stop the stream of `slot`, or of every channel in composite mode.
    ///
    /// # Errors
    /// Returns an error for an unknown slot or when the request cannot be
    /// sent.
    pub fn stop_video(&mut self, slot: usize) -> Result<()> {
        for target in self.targets(slot)? {
            if let Some(request) = self.slots[target].video.stop() {
                self.send(target, &request)?;
            }
        }
        Ok(())
    }

    /// Send video requests, stamping them with one round id in composite
    /// mode.
    fn send_video(&mut self, mut requests: Vec<(usize, Request)>) -> Result<()> {
        if requests.is_empty() {
            return Ok(());
        }
        if self.mode == ViewMode::Composite {
            let round = self.round_seq.next();
            for (_, request) in &mut requests {
                request.set_seq_id(round);
            }
        }
        for (slot, request) in &requests {
            self.send(*slot, request)?;
        }
        Ok(())
    }

    // ---- scheduling ----

    /// Run every scheduled task that is due at `now`: viewport refreshes,
    /// key-frame requests and heartbeats.
    ///
    /// # Errors
    /// Returns the first transport error; the session is then expired.
    pub fn tick(&mut self, now: Instant) -> Result<()> {
        if self.connection == ConnectionState::Expired {
            return Ok(());
        }
        let timestamp = self.timestamp_ms(now);
        let latency = self.latency_ms();

        let mut video = Vec::new();
        for slot in 0..self.slots.len() {
            let entry = &mut self.slots[slot];
            let streaming = entry.video.is_streaming();
            let actions = entry
                .viewport
                .as_mut()
                .map(|viewport| viewport.tick(now, latency, streaming))
                .unwrap_or_default();
            for action in actions {
                let request = self.spectrum_request(slot, action, timestamp)?;
                self.send(slot, &request)?;
            }
            if let Some(request) = self.slots[slot].video.tick(timestamp, now) {
                video.push((slot, request));
            }
        }
        self.send_video(video)?;

        if self.heartbeat.try_fire(now) {
            for slot in 0..self.slots.len() {
                self.send(slot, &Request::Heartbeat { ts: timestamp })?;
            }
        }
        Ok(())
    }

    fn spectrum_request(
        &mut self,
        slot: usize,
        action: ViewportAction,
        timestamp: f64,
    ) -> Result<Request> {
        let ((x1, y1, x2, y2), image) = match action {
            ViewportAction::Lens(bounds) => (bounds, true),
            ViewportAction::Settle {
                bounds,
                whole_image,
            } => (bounds, !whole_image),
        };
        let entry = self.slot_mut(slot)?;
        let seq_id = entry.request_seq.next();
        let dataset = entry.dataset.as_ref().ok_or(Error::NotLoaded(slot))?;
        let band = dataset.band();
        Ok(Request::Spectrum(SpectrumRequest {
            x1,
            y1,
            x2,
            y2,
            image,
            beam: dataset.beam,
            intensity: dataset.intensity,
            frame_start: band.start,
            frame_end: band.end,
            ref_freq: dataset.ref_freq,
            seq_id,
            timestamp,
        }))
    }
}

/// Stale-filter index of a response category.
fn category(kind: MessageType) -> usize {
    match kind {
        MessageType::Spectrum => 0,
        MessageType::Viewport => 1,
        MessageType::Image => 2,
        MessageType::FullSpectrumRefresh => 3,
        MessageType::HistogramRefresh => 4,
        MessageType::Video => 5,
        MessageType::Csv => 6,
    }
}

/// Source rectangle of the opaque pixels, in the dataset's own orientation.
fn display_rect(surface: &FrameSurface) -> Rect {
    let rect = bounding_box_rect(&surface.bounding_box());
    if surface.is_transposed() {
        Rect::new(rect.y, rect.x, rect.height, rect.width)
    } else {
        rect
    }
}

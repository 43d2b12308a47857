//! RGB compositing of up to three datasets.
//!
//! Each dataset owns one colour channel of a shared RGBA canvas. Channel
//! surfaces for a request round may arrive in any order; the canvas is
//! flushed exactly once, when every channel of the round has been written.

use cubeview_core::colourmap::apply_channel;
use cubeview_core::{CompositeChannel, FrameSurface, RgbaImage};

use crate::error::{Error, Result};

/// Maximum number of composited datasets.
pub const MAX_CHANNELS: usize = 3;

/// Shared RGBA canvas for one composite view.
#[derive(Debug, Clone)]
pub struct CompositeLayer {
    channels: usize,
    width: usize,
    height: usize,
    canvas: Vec<u8>,
    round: Option<u32>,
    received: [bool; MAX_CHANNELS],
    flushed: bool,
}

impl CompositeLayer {
    /// A layer compositing `channels` datasets.
    ///
    /// # Errors
    /// Returns [`Error::Config`] unless `1 <= channels <= 3`.
    pub fn new(channels: usize) -> Result<Self> {
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(Error::Config(format!(
                "composite needs 1 to {MAX_CHANNELS} datasets, got {channels}"
            )));
        }
        Ok(Self {
            channels,
            width: 0,
            height: 0,
            canvas: Vec::new(),
            round: None,
            received: [false; MAX_CHANNELS],
            flushed: false,
        })
    }

    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Sequence id of the round being assembled.
    #[must_use]
    pub fn round(&self) -> Option<u32> {
        self.round
    }

    /// Number of channels written in the current round.
    #[must_use]
    pub fn received(&self) -> usize {
        self.received.iter().filter(|&&r| r).count()
    }

    fn begin_round(&mut self, seq_id: u32, width: usize, height: usize) {
        self.round = Some(seq_id);
        self.received = [false; MAX_CHANNELS];
        self.flushed = false;
        self.width = width;
        self.height = height;
        self.canvas.clear();
        self.canvas.resize(width * height * 4, 0);
    }

    /// Write channel `index` of round `seq_id`.
    ///
    /// A newer round discards the partial canvas; surfaces from an older
    /// round and repeated channels are ignored. Returns the finished image
    /// when this submission completes the round.
    ///
    /// # Errors
    /// Returns [`Error::NoSlot`] for a channel index beyond the layer,
    /// [`Error::CompositeMismatch`] when the surface size differs from the
    /// round's, and a core error if the surface planes are inconsistent.
    pub fn submit(
        &mut self,
        index: usize,
        seq_id: u32,
        surface: &FrameSurface,
        invert: bool,
    ) -> Result<Option<RgbaImage>> {
        let channel = match CompositeChannel::for_index(index) {
            Some(channel) if index < self.channels => channel,
            _ => return Err(Error::NoSlot(index)),
        };

        match self.round {
            Some(round) if seq_id < round => {
                log::debug!("composite: dropping channel {index} of old round {seq_id} (current {round})");
                return Ok(None);
            }
            Some(round) if seq_id == round => {}
            _ => self.begin_round(seq_id, surface.width(), surface.height()),
        }

        if self.received[index] {
            log::debug!("composite: channel {index} already written for round {seq_id}");
            return Ok(None);
        }
        if (surface.width(), surface.height()) != (self.width, self.height) {
            return Err(Error::CompositeMismatch {
                expected: (self.width, self.height),
                actual: (surface.width(), surface.height()),
            });
        }

        apply_channel(
            &mut self.canvas,
            surface.luma(),
            surface.alpha(),
            self.width,
            self.height,
            surface.stride(),
            invert,
            channel,
        )?;
        self.received[index] = true;

        if self.received() == self.channels && !self.flushed {
            self.flushed = true;
            return Ok(Some(RgbaImage {
                width: self.width,
                height: self.height,
                pixels: self.canvas.clone(),
            }));
        }
        Ok(None)
    }
}

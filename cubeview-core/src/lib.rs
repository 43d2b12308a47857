//! cubeview-core: tone mapping, colour mapping and frame geometry for
//! progressively streamed FITS cubes.
//!
//! Everything here is pure and synchronous. Networking, codecs and the
//! interactive state machines live in `cubeview-protocol` and
//! `cubeview-session`.
//!

pub mod colourmap;
pub mod dataset;
pub mod error;
pub mod flux;
pub mod frame;
pub mod histogram;
pub mod sequence;
pub mod util;

pub use colourmap::{
    apply_channel, apply_colourmap, apply_greyscale, ColourLut, ColourTable, CompositeChannel,
};
pub use dataset::{
    frequency_from_redshift, frequency_from_velocity, redshift_from_frequency,
    velocity_from_frequency, Beam, Calibration, Dataset, IntensityMode, PixelStats, SpectralBand,
    SPEED_OF_LIGHT,
};
pub use error::{Error, FrameError, InputError, Result};
pub use flux::{
    flux_to_pixel, pixel_to_flux, sensitivity_from_slider, slider_from_sensitivity, FluxCurve,
    FluxParams, ToneMapper,
};
pub use frame::{
    true_image_dimensions, BoundingBox, FrameSurface, OwnedFrameBuffer, RgbaImage,
};
pub use histogram::PixelHistogram;
pub use sequence::{Admission, SequenceCounter, StaleFilter};

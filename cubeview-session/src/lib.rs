//! cubeview-session: interactive state for the cube viewer.
//!
//! Drives the viewport refresh loop, cursor prediction, video streaming and
//! RGB compositing for one or more datasets, on top of the wire types in
//! `cubeview-protocol` and the pixel pipeline in `cubeview-core`.
//!
//! The session is single-threaded and event driven: the embedding code
//! forwards pointer events, server frames and periodic ticks, and receives
//! [`DisplayUpdate`]s over a channel.

pub mod composite;
pub mod config;
pub mod contour;
pub mod error;
pub mod kalman;
pub mod layout;
pub mod message;
pub mod schedule;
pub mod session;
pub mod transport;
pub mod video;
pub mod viewport;
pub mod widgets;

pub use composite::{CompositeLayer, MAX_CHANNELS};
pub use config::{ContourConfig, KalmanConfig, VideoConfig, ViewerConfig, ViewportConfig};
pub use contour::{contour_levels, contour_lines, ContourLine};
pub use error::{Error, Result};
pub use kalman::{CursorKalman, CursorPredictor};
pub use layout::{fit_bounding_box, grid_shape, tile_anchors};
pub use message::DisplayUpdate;
pub use schedule::{Throttle, Timer};
pub use session::{ConnectionState, Session, ViewMode};
pub use transport::{ChannelTransport, Transport};
pub use video::{StreamState, VideoStreamController};
pub use viewport::{
    screen_to_source, source_to_screen, InteractionState, Rect, ViewState, ViewportAction,
    ViewportController,
};
pub use widgets::{FluxEditor, FluxUpdate, Handle, ReferenceInput, ReferenceUnit};

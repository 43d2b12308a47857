//! Client requests.
//!
//! Requests are text frames of the form `[kind] key=value&key=value`. The
//! server replaces `&` with spaces and scans the fields positionally, so
//! the field order produced by [`fmt::Display`] is part of the protocol.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use cubeview_core::{Beam, FluxCurve, IntensityMode};

use crate::error::{Error, Result};
use crate::text::HEARTBEAT_PREFIX;

/// Which canvas a video stream feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoView {
    #[default]
    Tile,
    Composite,
}

impl VideoView {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            VideoView::Tile => "tile",
            VideoView::Composite => "composite",
        }
    }
}

/// `[spectrum]`: spectrum (and optionally a viewport) for a region.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumRequest {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
    /// Also return a viewport image of the region.
    pub image: bool,
    pub beam: Beam,
    pub intensity: IntensityMode,
    pub frame_start: f64,
    pub frame_end: f64,
    pub ref_freq: f64,
    pub seq_id: u32,
    pub timestamp: f64,
}

/// `[image]`: re-render the full image with new tone mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub black: f64,
    pub white: f64,
    pub median: f64,
    /// Sensitivity multiplier from the slider.
    pub noise: f64,
    pub flux: FluxCurve,
    pub frame_start: f64,
    pub frame_end: f64,
    pub ref_freq: f64,
    /// Ask for a histogram refresh as well.
    pub hist: bool,
    pub timestamp: f64,
    pub seq_id: u32,
}

/// `[init_video]` and `[video]` share their fields; `key` is only sent
/// with `[video]`.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    /// Spectral value (frequency or frame number) of the wanted frame.
    pub frame: f64,
    pub key: bool,
    pub view: VideoView,
    pub ref_freq: f64,
    pub fps: u32,
    pub seq_id: u32,
    /// Target bitrate in kbit/s.
    pub bitrate: u32,
    pub timestamp: f64,
}

/// Any request the client sends.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Spectrum(SpectrumRequest),
    Image(ImageRequest),
    InitVideo(VideoRequest),
    Video(VideoRequest),
    EndVideo,
    Heartbeat { ts: f64 },
}

impl Request {
    /// Short name of the request kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Spectrum(_) => "spectrum",
            Request::Image(_) => "image",
            Request::InitVideo(_) => "init_video",
            Request::Video(_) => "video",
            Request::EndVideo => "end_video",
            Request::Heartbeat { .. } => "heartbeat",
        }
    }

    /// Sequence id carried by the request, if any.
    #[must_use]
    pub fn seq_id(&self) -> Option<u32> {
        match self {
            Request::Spectrum(r) => Some(r.seq_id),
            Request::Image(r) => Some(r.seq_id),
            Request::InitVideo(r) | Request::Video(r) => Some(r.seq_id),
            Request::EndVideo | Request::Heartbeat { .. } => None,
        }
    }

    /// Replace the sequence id; requests without one are left unchanged.
    pub fn set_seq_id(&mut self, seq_id: u32) {
        match self {
            Request::Spectrum(r) => r.seq_id = seq_id,
            Request::Image(r) => r.seq_id = seq_id,
            Request::InitVideo(r) | Request::Video(r) => r.seq_id = seq_id,
            Request::EndVideo | Request::Heartbeat { .. } => {}
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Spectrum(r) => write!(
                f,
                "[spectrum] x1={}&y1={}&x2={}&y2={}&image={}&beam={}&intensity={}&frame_start={}&frame_end={}&ref_freq={}&seq_id={}&timestamp={}",
                r.x1,
                r.y1,
                r.x2,
                r.y2,
                r.image,
                r.beam,
                r.intensity,
                r.frame_start,
                r.frame_end,
                r.ref_freq,
                r.seq_id,
                r.timestamp
            ),
            Request::Image(r) => write!(
                f,
                "[image] black={}&white={}&median={}&noise={}&flux={}&frame_start={}&frame_end={}&ref_freq={}&hist={}&timestamp={}&seq_id={}",
                r.black,
                r.white,
                r.median,
                r.noise,
                r.flux,
                r.frame_start,
                r.frame_end,
                r.ref_freq,
                r.hist,
                r.timestamp,
                r.seq_id
            ),
            Request::InitVideo(r) => write!(
                f,
                "[init_video] frame={}&view={}&ref_freq={}&fps={}&seq_id={}&bitrate={}&timestamp={}",
                r.frame,
                r.view.as_str(),
                r.ref_freq,
                r.fps,
                r.seq_id,
                r.bitrate,
                r.timestamp
            ),
            Request::Video(r) => write!(
                f,
                "[video] frame={}&key={}&view={}&ref_freq={}&fps={}&seq_id={}&bitrate={}&timestamp={}",
                r.frame,
                r.key,
                r.view.as_str(),
                r.ref_freq,
                r.fps,
                r.seq_id,
                r.bitrate,
                r.timestamp
            ),
            Request::EndVideo => f.write_str("[end_video]"),
            Request::Heartbeat { ts } => write!(f, "{HEARTBEAT_PREFIX} {ts}"),
        }
    }
}

struct Fields<'a> {
    text: &'a str,
    map: HashMap<&'a str, &'a str>,
}

impl<'a> Fields<'a> {
    fn new(text: &'a str, body: &'a str) -> Self {
        let map = body
            .split('&')
            .filter_map(|kv| kv.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim()))
            .collect();
        Self { text, map }
    }

    fn get<T: FromStr>(&self, key: &str) -> Result<T> {
        self.map
            .get(key)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| Error::MalformedText(format!("{key} missing or invalid in {}", self.text)))
    }
}

impl FromStr for Request {
    type Err = Error;

    /// Parse a request string, the inverse of `Display` (used by mock
    /// servers and the capture tooling).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (kind, body) = s
            .strip_prefix('[')
            .and_then(|rest| rest.split_once(']'))
            .ok_or_else(|| Error::MalformedText(s.to_string()))?;
        let body = body.trim();

        match kind {
            "end_video" => Ok(Request::EndVideo),
            "heartbeat" => body
                .parse()
                .map(|ts| Request::Heartbeat { ts })
                .map_err(|_| Error::MalformedText(s.to_string())),
            "spectrum" => {
                let f = Fields::new(s, body);
                let beam: String = f.get("beam")?;
                let intensity: String = f.get("intensity")?;
                Ok(Request::Spectrum(SpectrumRequest {
                    x1: f.get("x1")?,
                    y1: f.get("y1")?,
                    x2: f.get("x2")?,
                    y2: f.get("y2")?,
                    image: f.get("image")?,
                    beam: beam.parse()?,
                    intensity: intensity.parse()?,
                    frame_start: f.get("frame_start")?,
                    frame_end: f.get("frame_end")?,
                    ref_freq: f.get("ref_freq")?,
                    seq_id: f.get("seq_id")?,
                    timestamp: f.get("timestamp")?,
                }))
            }
            "image" => {
                let f = Fields::new(s, body);
                let flux: String = f.get("flux")?;
                Ok(Request::Image(ImageRequest {
                    black: f.get("black")?,
                    white: f.get("white")?,
                    median: f.get("median")?,
                    noise: f.get("noise")?,
                    flux: flux.parse()?,
                    frame_start: f.get("frame_start")?,
                    frame_end: f.get("frame_end")?,
                    ref_freq: f.get("ref_freq")?,
                    hist: f.get("hist")?,
                    timestamp: f.get("timestamp")?,
                    seq_id: f.get("seq_id")?,
                }))
            }
            "init_video" | "video" => {
                let f = Fields::new(s, body);
                let view: String = f.get("view")?;
                let view = match view.as_str() {
                    "tile" => VideoView::Tile,
                    "composite" => VideoView::Composite,
                    _ => return Err(Error::MalformedText(s.to_string())),
                };
                let request = VideoRequest {
                    frame: f.get("frame")?,
                    key: if kind == "video" { f.get("key")? } else { true },
                    view,
                    ref_freq: f.get("ref_freq")?,
                    fps: f.get("fps")?,
                    seq_id: f.get("seq_id")?,
                    bitrate: f.get("bitrate")?,
                    timestamp: f.get("timestamp")?,
                };
                Ok(if kind == "video" {
                    Request::Video(request)
                } else {
                    Request::InitVideo(request)
                })
            }
            _ => Err(Error::MalformedText(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum() -> SpectrumRequest {
        SpectrumRequest {
            x1: 10,
            y1: 20,
            x2: 73,
            y2: 83,
            image: true,
            beam: Beam::Circle,
            intensity: IntensityMode::Integrated,
            frame_start: 1.0e11,
            frame_end: 1.05e11,
            ref_freq: 1.0e11,
            seq_id: 9,
            timestamp: 1234.5,
        }
    }

    #[test]
    fn test_spectrum_format() {
        let text = Request::Spectrum(spectrum()).to_string();
        assert_eq!(
            text,
            "[spectrum] x1=10&y1=20&x2=73&y2=83&image=true&beam=circle&intensity=integrated&frame_start=100000000000&frame_end=105000000000&ref_freq=100000000000&seq_id=9&timestamp=1234.5"
        );
        assert_eq!(text.parse::<Request>().unwrap(), Request::Spectrum(spectrum()));
    }

    #[test]
    fn test_video_format() {
        let req = VideoRequest {
            frame: 3.0,
            key: false,
            view: VideoView::Tile,
            ref_freq: 0.0,
            fps: 10,
            seq_id: 4,
            bitrate: 800,
            timestamp: 10.0,
        };
        assert_eq!(
            Request::Video(req.clone()).to_string(),
            "[video] frame=3&key=false&view=tile&ref_freq=0&fps=10&seq_id=4&bitrate=800&timestamp=10"
        );
        assert!(Request::InitVideo(req)
            .to_string()
            .starts_with("[init_video] frame=3&view=tile"));
    }

    #[test]
    fn test_set_seq_id() {
        let mut req = Request::Spectrum(spectrum());
        req.set_seq_id(42);
        assert_eq!(req.seq_id(), Some(42));
        assert!(req.to_string().contains("&seq_id=42&"));

        let mut end = Request::EndVideo;
        end.set_seq_id(7);
        assert_eq!(end, Request::EndVideo);
    }

    #[test]
    fn test_image_parses_back() {
        let req = ImageRequest {
            black: 10.0,
            white: 200.0,
            median: 80.0,
            noise: 1.0,
            flux: FluxCurve::Ratio,
            frame_start: 1.0,
            frame_end: 1.0,
            ref_freq: 0.0,
            hist: true,
            timestamp: 5.0,
            seq_id: 2,
        };
        let text = Request::Image(req.clone()).to_string();
        assert!(text.contains("flux=ratio"));
        assert_eq!(text.parse::<Request>().unwrap(), Request::Image(req));
    }

    #[test]
    fn test_control_requests() {
        assert_eq!(Request::EndVideo.to_string(), "[end_video]");
        assert_eq!(Request::Heartbeat { ts: 42.0 }.to_string(), "[heartbeat] 42");
        assert_eq!(
            "[heartbeat] 42".parse::<Request>().unwrap(),
            Request::Heartbeat { ts: 42.0 }
        );
        assert!("[spectrum] x1=1".parse::<Request>().is_err());
        assert!("nonsense".parse::<Request>().is_err());
    }
}

//! Text (JSON) server messages and the heartbeat echo.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::header::DatasetHeader;

/// Prefix of heartbeat requests, echoed verbatim by the server.
pub const HEARTBEAT_PREFIX: &str = "[heartbeat]";

/// JSON messages tagged by their `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    /// Dataset header and statistics.
    Header(Box<DatasetHeader>),
    /// Server-side loading progress.
    Progress {
        #[serde(default)]
        message: String,
        #[serde(default)]
        total: i32,
        #[serde(default)]
        running: i32,
        /// Seconds since loading started.
        #[serde(default)]
        elapsed: f64,
    },
    /// Video stream geometry sent in reply to `[init_video]`.
    InitVideo {
        width: u32,
        height: u32,
        /// LZ4-compressed alpha plane at video resolution.
        #[serde(default)]
        alpha: Vec<u8>,
    },
    /// Spectrum request could not be served (dataset busy).
    Spectrum {
        #[serde(default)]
        message: String,
    },
    /// Image request could not be served.
    Image {
        #[serde(default)]
        message: String,
    },
    /// Video request could not be served.
    Video {
        #[serde(default)]
        message: String,
    },
}

/// A decoded text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum TextMessage {
    Json(JsonMessage),
    /// Echo of a `[heartbeat] <ts>` request; `ts` is the client timestamp.
    Heartbeat { ts: f64 },
}

impl TextMessage {
    /// Parse a text frame.
    ///
    /// # Errors
    /// Returns [`Error::MalformedText`] for a heartbeat without a numeric
    /// timestamp and [`Error::Json`] for anything else that is not one of
    /// the known JSON messages.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if let Some(rest) = trimmed.strip_prefix(HEARTBEAT_PREFIX) {
            let ts = rest
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::MalformedText(trimmed.to_string()))?;
            return Ok(TextMessage::Heartbeat { ts });
        }
        Ok(TextMessage::Json(serde_json::from_str(trimmed)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_echo() {
        assert_eq!(
            TextMessage::parse("[heartbeat] 1534.25").unwrap(),
            TextMessage::Heartbeat { ts: 1534.25 }
        );
        assert!(matches!(
            TextMessage::parse("[heartbeat] soon"),
            Err(Error::MalformedText(_))
        ));
    }

    #[test]
    fn test_progress() {
        let msg = TextMessage::parse(
            r#"{"type":"progress","message":"processing FITS","total":100,"running":42}"#,
        )
        .unwrap();
        match msg {
            TextMessage::Json(JsonMessage::Progress { total, running, .. }) => {
                assert_eq!((total, running), (100, 42));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unavailable_and_init_video() {
        let msg = TextMessage::parse(r#"{"type":"image","message":"unavailable"}"#).unwrap();
        assert_eq!(
            msg,
            TextMessage::Json(JsonMessage::Image {
                message: "unavailable".into()
            })
        );
        let msg =
            TextMessage::parse(r#"{"type":"init_video","width":64,"height":32,"alpha":[1,2]}"#)
                .unwrap();
        assert!(matches!(
            msg,
            TextMessage::Json(JsonMessage::InitVideo {
                width: 64,
                height: 32,
                ..
            })
        ));
    }

    #[test]
    fn test_header_message() {
        let msg = TextMessage::parse(
            r#"{"type":"header","dataset_id":"X","width":4,"height":2,"depth":1}"#,
        )
        .unwrap();
        let TextMessage::Json(JsonMessage::Header(header)) = msg else {
            panic!("expected header");
        };
        assert_eq!(header.dataset_id, "X");
        assert_eq!(header.width, 4);
    }

    #[test]
    fn test_garbage() {
        assert!(matches!(TextMessage::parse("hello"), Err(Error::Json(_))));
        assert!(TextMessage::parse(r#"{"type":"nope"}"#).is_err());
    }
}
